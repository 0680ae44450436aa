//! Storefront Infrastructure - Adapters and implementations
//!
//! This crate provides concrete implementations of the ports
//! defined in the application layer.

pub mod adapters;
pub mod exchange;
pub mod identity;
pub mod storage;

pub use adapters::SystemClock;
pub use exchange::{ReqwestExchangeTransport, TOKEN_ENDPOINT_PATH, TransportSetupError};
pub use identity::StaticIdentityProvider;
pub use storage::{FileStorage, MemoryStorage};
