//! Session token lifecycle.
//!
//! This module provides:
//! - Token cache over a chain of durable storage tiers
//! - Session event broadcasting with idempotent listeners
//! - The backend token exchange
//! - Background renewal and the coordinating entry point, sharing one
//!   in-flight exchange

mod coordinator;
mod event_bus;
mod exchange_client;
mod flight;
mod renewal;
mod token_cache;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::SessionCoordinator;
pub use event_bus::{EventBus, SessionListener};
pub use exchange_client::ExchangeClient;
pub use renewal::{RenewalScheduler, TickOutcome};
pub use token_cache::TokenCache;
