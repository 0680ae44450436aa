//! Port definitions (interfaces)
//!
//! Ports define the boundaries between the session core and external systems.
//! Each port is a trait that can be implemented by adapters in the infrastructure layer.

mod clock;
mod exchange;
mod identity;
mod storage;

pub use clock::Clock;
pub use exchange::{ExchangeReply, ExchangeRequest, ExchangeTransport};
pub use identity::{IdentityError, IdentityProvider};
pub use storage::{StorageBackend, StorageError};
