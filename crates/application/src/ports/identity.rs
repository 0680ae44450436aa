//! Identity provider port
//!
//! The identity provider issues the opaque assertion that the commerce
//! backend accepts in exchange for an API token.

use async_trait::async_trait;

/// Errors returned by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// Nobody is signed in; the user has to authenticate again.
    #[error("no signed-in identity")]
    SignedOut,

    /// The provider could not be reached.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Source of identity assertions.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns a current identity assertion.
    ///
    /// Implementations refresh the assertion themselves when it is stale.
    ///
    /// # Errors
    /// Returns `IdentityError::SignedOut` when no identity is available.
    async fn assertion(&self) -> Result<String, IdentityError>;
}
