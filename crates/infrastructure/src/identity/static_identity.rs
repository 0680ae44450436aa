//! Identity provider fed by the embedding UI.
//!
//! The storefront's sign-in widget owns the identity session; whenever it
//! obtains a new assertion it hands it over here, and signing out upstream
//! withdraws it.

use async_trait::async_trait;
use parking_lot::RwLock;
use storefront_application::ports::{IdentityError, IdentityProvider};
use tracing::debug;

/// Identity provider holding the latest assertion handed over by the UI.
#[derive(Default)]
pub struct StaticIdentityProvider {
    assertion: RwLock<Option<String>>,
}

impl StaticIdentityProvider {
    /// Creates a provider with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider already holding `assertion`.
    #[must_use]
    pub fn signed_in(assertion: impl Into<String>) -> Self {
        Self {
            assertion: RwLock::new(Some(assertion.into())),
        }
    }

    /// Replaces the current assertion.
    pub fn set_assertion(&self, assertion: impl Into<String>) {
        *self.assertion.write() = Some(assertion.into());
        debug!("identity assertion updated");
    }

    /// Withdraws the assertion after an upstream sign-out.
    pub fn sign_out(&self) {
        *self.assertion.write() = None;
        debug!("identity assertion withdrawn");
    }

    /// Returns true if an assertion is available.
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.assertion.read().is_some()
    }
}

impl std::fmt::Debug for StaticIdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticIdentityProvider")
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn assertion(&self) -> Result<String, IdentityError> {
        self.assertion
            .read()
            .clone()
            .filter(|assertion| !assertion.is_empty())
            .ok_or(IdentityError::SignedOut)
    }
}
