//! Application error types

use storefront_domain::ExchangeError;
use thiserror::Error;

use crate::ports::IdentityError;

/// Errors surfaced to callers asking for a session token.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The exchange round trip failed.
    #[error(transparent)]
    Exchange(ExchangeError),

    /// The identity provider could not be reached.
    #[error("identity provider unavailable: {0}")]
    IdentityUnavailable(String),

    /// No identity is signed in upstream.
    #[error("no signed-in identity; re-authentication required")]
    SignedOut,

    /// Too many acquisition attempts failed in a row.
    #[error("gave up after {attempts} failed acquisition attempts")]
    AttemptsExhausted {
        /// Number of failed attempts.
        attempts: u32,
    },

    /// The session was cleared while a token was being acquired.
    #[error("session was cleared while a token was being acquired")]
    LoggedOut,
}

impl SessionError {
    /// Returns true if trying again later may succeed without user action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Exchange(ExchangeError::Unavailable { .. }) | Self::IdentityUnavailable(_)
        )
    }

    /// Returns true if the UI should send the user back to sign in.
    #[must_use]
    pub const fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::Exchange(ExchangeError::Rejected { .. })
                | Self::SignedOut
                | Self::AttemptsExhausted { .. }
        )
    }
}

impl From<ExchangeError> for SessionError {
    fn from(error: ExchangeError) -> Self {
        match error {
            ExchangeError::Superseded => Self::LoggedOut,
            other => Self::Exchange(other),
        }
    }
}

impl From<IdentityError> for SessionError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::SignedOut => Self::SignedOut,
            IdentityError::Unavailable(message) => Self::IdentityUnavailable(message),
        }
    }
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superseded_maps_to_logged_out() {
        assert_eq!(
            SessionError::from(ExchangeError::Superseded),
            SessionError::LoggedOut
        );
    }

    #[test]
    fn test_error_classification() {
        let unavailable = SessionError::from(ExchangeError::Unavailable {
            message: "connection refused".to_string(),
        });
        assert!(unavailable.is_retryable());
        assert!(!unavailable.requires_reauthentication());

        let rejected = SessionError::from(ExchangeError::Rejected {
            status: 401,
            message: "invalid assertion".to_string(),
        });
        assert!(!rejected.is_retryable());
        assert!(rejected.requires_reauthentication());

        assert!(SessionError::from(IdentityError::Unavailable("down".to_string())).is_retryable());
        assert!(SessionError::from(IdentityError::SignedOut).requires_reauthentication());
    }
}
