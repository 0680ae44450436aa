//! Host wall clock.
//!
//! Expiry checks compare against the UTC time the operating system reports,
//! so they follow the host if its clock is stepped. Token `exp` claims are
//! issued against the backend's clock, and a skewed host simply sees tokens
//! expire early or late by the same amount.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use storefront_application::ports::Clock;

/// [`Clock`] backed by [`Utc::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// The host clock as a shareable port, ready to hand to the cache,
    /// exchange client and coordinator.
    #[must_use]
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
