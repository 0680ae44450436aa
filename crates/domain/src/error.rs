//! Domain error types

use thiserror::Error;

/// Errors raised while trading an identity assertion for an API token.
///
/// The variants tell the caller what to do next: retry, re-authenticate
/// upstream, or give up on this attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// The backend could not be reached, or answered with a server error.
    #[error("exchange endpoint unavailable: {message}")]
    Unavailable {
        /// Error description.
        message: String,
    },

    /// The backend declined the identity assertion.
    #[error("exchange rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status returned by the backend.
        status: u16,
        /// Error description from the response body.
        message: String,
    },

    /// The backend answered successfully but the body had an unexpected shape.
    #[error("malformed exchange response: {message}")]
    Malformed {
        /// Error description.
        message: String,
    },

    /// The session was cleared while the exchange was in flight.
    #[error("exchange result discarded: session was cleared while it was in flight")]
    Superseded,
}

impl ExchangeError {
    /// Returns true if the same assertion may be exchanged again later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Reasons a token's claims segment could not be read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimsError {
    /// The token does not have exactly three dot-delimited segments.
    #[error("expected 3 token segments, found {found}")]
    SegmentCount {
        /// Number of segments found.
        found: usize,
    },

    /// The claims segment is not valid base64url.
    #[error("claims segment is not valid base64url")]
    Encoding,

    /// The decoded claims segment is not a JSON object.
    #[error("claims segment is not a JSON object: {0}")]
    Json(String),

    /// A required claim is absent or has the wrong type.
    #[error("missing or invalid claim: {0}")]
    MissingClaim(&'static str),
}

/// Result type alias for claim decoding.
pub type ClaimsResult<T> = Result<T, ClaimsError>;
