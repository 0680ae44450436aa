//! Exchange transport implementation using reqwest.
//!
//! Posts the identity assertion as JSON to `<backend>/auth/token` and hands
//! the raw status and body back to the application layer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use storefront_application::ports::{ExchangeReply, ExchangeRequest, ExchangeTransport};
use storefront_domain::ExchangeError;
use tracing::debug;
use url::Url;

/// Path of the exchange endpoint, relative to the backend base URL.
pub const TOKEN_ENDPOINT_PATH: &str = "auth/token";

/// Errors raised while setting up the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportSetupError {
    /// The backend URL cannot be extended with the endpoint path.
    #[error("invalid backend URL '{url}': {source}")]
    InvalidEndpoint {
        /// The configured backend URL.
        url: String,
        /// Underlying parse error.
        source: url::ParseError,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// `ExchangeTransport` backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestExchangeTransport {
    client: Client,
    endpoint: Url,
}

impl ReqwestExchangeTransport {
    /// Creates a transport for the backend at `base_url`.
    ///
    /// Default configuration:
    /// - Request timeout: `timeout`
    /// - User-Agent: `storefront/<version>`
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL or the client cannot be built.
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, TransportSetupError> {
        let client = Client::builder()
            .user_agent(concat!("storefront/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Self::with_client(client, base_url)
    }

    /// Creates a transport using a preconfigured client.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL cannot be built.
    pub fn with_client(client: Client, base_url: &Url) -> Result<Self, TransportSetupError> {
        let endpoint =
            token_endpoint(base_url).map_err(|source| TransportSetupError::InvalidEndpoint {
                url: base_url.to_string(),
                source,
            })?;
        Ok(Self { client, endpoint })
    }

    /// The URL requests are posted to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Resolves the exchange endpoint below `base`, keeping any path prefix.
fn token_endpoint(base: &Url) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(TOKEN_ENDPOINT_PATH)
}

/// Maps reqwest errors to a transport-level exchange failure.
fn map_error(error: &reqwest::Error) -> ExchangeError {
    let message = if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    };
    ExchangeError::Unavailable { message }
}

#[async_trait]
impl ExchangeTransport for ReqwestExchangeTransport {
    async fn post(&self, request: &ExchangeRequest) -> Result<ExchangeReply, ExchangeError> {
        debug!(endpoint = %self.endpoint, "posting token exchange");
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| map_error(&e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| map_error(&e))?;
        debug!(status, bytes = body.len(), "token exchange answered");
        Ok(ExchangeReply::new(status, body))
    }
}
