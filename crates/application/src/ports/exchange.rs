//! Exchange transport port
//!
//! Carries one `POST <backend>/auth/token` round trip. Interpreting the
//! status and body is left to the `ExchangeClient`.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use storefront_domain::ExchangeError;

/// JSON body of an exchange request.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ExchangeRequest {
    /// The identity assertion.
    pub token: String,
    /// Ask the backend for a long-lived session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_me: Option<bool>,
}

impl ExchangeRequest {
    /// Builds a request; `remember_me` is only sent when set.
    #[must_use]
    pub fn new(assertion: impl Into<String>, remember_me: bool) -> Self {
        Self {
            token: assertion.into(),
            remember_me: remember_me.then_some(true),
        }
    }
}

impl fmt::Debug for ExchangeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeRequest")
            .field("token", &"<redacted>")
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

/// Raw response from the exchange endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReply {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl ExchangeReply {
    /// Creates a reply.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Port for posting exchange requests to the commerce backend.
#[async_trait]
pub trait ExchangeTransport: Send + Sync {
    /// Sends the request and returns whatever the backend answered.
    ///
    /// # Errors
    /// Returns `ExchangeError::Unavailable` when no response was received.
    async fn post(&self, request: &ExchangeRequest) -> Result<ExchangeReply, ExchangeError>;
}
