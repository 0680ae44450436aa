//! Storefront Application - Session lifecycle and ports
//!
//! This crate defines the application layer with:
//! - Port traits (clock, storage tiers, identity provider, exchange transport)
//! - The session token cache, exchange, renewal and coordinator
//! - Application-level error handling

pub mod error;
pub mod ports;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use ports::{
    Clock, ExchangeReply, ExchangeRequest, ExchangeTransport, IdentityError, IdentityProvider,
    StorageBackend, StorageError,
};
pub use session::{
    EventBus, ExchangeClient, RenewalScheduler, SessionCoordinator, SessionListener, TickOutcome,
    TokenCache,
};
