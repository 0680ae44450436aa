//! Identity assertion to API token exchange.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use storefront_domain::{
    ClearReason, ExchangeError, SessionEvent, Token, decode_claims, expiry_after,
    is_structurally_valid_at,
};
use tracing::{info, warn};

use super::event_bus::EventBus;
use super::token_cache::TokenCache;
use crate::ports::{Clock, ExchangeRequest, ExchangeTransport};

/// Success body of the exchange endpoint.
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    #[serde(default)]
    access_token: Option<String>,
    /// Kept loose so a float or a string never sinks an otherwise usable
    /// token; see [`expiry_hint`].
    #[serde(default)]
    expires_in: Option<Value>,
}

/// Failure body of the exchange endpoint.
#[derive(Debug, Deserialize)]
struct ExchangeErrorBody {
    error: String,
}

/// Trades identity assertions for API tokens and stores the result.
pub struct ExchangeClient {
    transport: Arc<dyn ExchangeTransport>,
    cache: Arc<TokenCache>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    default_ttl_secs: i64,
    remember_me: bool,
}

impl ExchangeClient {
    /// Create a new exchange client.
    #[must_use]
    pub fn new(
        transport: Arc<dyn ExchangeTransport>,
        cache: Arc<TokenCache>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            cache,
            bus,
            clock,
            default_ttl_secs: 3600,
            remember_me: false,
        }
    }

    /// Lifetime assumed when neither the token nor the response carries one.
    #[must_use]
    pub const fn with_default_ttl(mut self, seconds: i64) -> Self {
        self.default_ttl_secs = seconds;
        self
    }

    /// Ask the backend for a long-lived session.
    #[must_use]
    pub const fn with_remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }

    /// Exchanges `assertion` and caches the resulting token.
    ///
    /// # Errors
    ///
    /// See [`ExchangeClient::exchange_within`].
    pub async fn exchange(&self, assertion: &str) -> Result<Token, ExchangeError> {
        self.exchange_within(self.cache.epoch(), assertion).await
    }

    /// Exchanges `assertion` on behalf of the session that was current at
    /// `epoch`.
    ///
    /// On success the token is cached and `session:ready` is broadcast. If
    /// the cache was cleared after `epoch` was read, the token is dropped.
    ///
    /// # Errors
    ///
    /// - `Unavailable` when the backend is unreachable or answers 5xx.
    /// - `Rejected` on 4xx. Any cached token is cleared and
    ///   `session:cleared` is broadcast.
    /// - `Malformed` when a 2xx body carries no usable token. The cache is
    ///   left untouched.
    /// - `Superseded` when the session was cleared during the round trip.
    pub async fn exchange_within(&self, epoch: u64, assertion: &str) -> Result<Token, ExchangeError> {
        let request = ExchangeRequest::new(assertion, self.remember_me);
        let reply = self.transport.post(&request).await.inspect_err(|e| {
            warn!(error = %e, "token exchange failed before a response arrived");
        })?;

        match reply.status {
            200..=299 => {}
            status @ 400..=499 => {
                let message = error_message(&reply.body);
                warn!(status, message = %message, "token exchange rejected");
                self.reject(epoch);
                return Err(ExchangeError::Rejected { status, message });
            }
            status => {
                let message = error_message(&reply.body);
                warn!(status, message = %message, "token exchange endpoint failed");
                return Err(ExchangeError::Unavailable {
                    message: format!("backend answered {status}: {message}"),
                });
            }
        }

        let (value, expires_at) = self.parse_success(&reply.body)?;
        let Some(token) = self.cache.commit(epoch, &value, expires_at) else {
            info!("session cleared during token exchange; result discarded");
            return Err(ExchangeError::Superseded);
        };

        info!(
            token = %token.preview(),
            source = ?token.source(),
            remaining_secs = token.seconds_until_expiry(self.clock.now()),
            "token exchange succeeded"
        );
        self.bus.publish(SessionEvent::Ready { from_cache: false });
        Ok(token)
    }

    fn parse_success(&self, body: &str) -> Result<(String, DateTime<Utc>), ExchangeError> {
        let response: ExchangeResponse =
            serde_json::from_str(body).map_err(|e| ExchangeError::Malformed {
                message: format!("response is not valid JSON: {e}"),
            })?;

        let value = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ExchangeError::Malformed {
                message: "response has no access_token".to_string(),
            })?;

        let now = self.clock.now();
        if !is_structurally_valid_at(&value, now) {
            return Err(ExchangeError::Malformed {
                message: "access_token is not a well-formed, unexpired token".to_string(),
            });
        }

        let hint = expiry_hint(response.expires_in.as_ref());
        Ok((value.clone(), self.resolve_expiry(&value, hint, now)))
    }

    /// The token's own `exp` claim wins over `expires_in`; it is immune to
    /// clock skew between us and the issuer.
    fn resolve_expiry(
        &self,
        value: &str,
        expires_in: Option<i64>,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        decode_claims(value)
            .ok()
            .and_then(|claims| claims.expires_at())
            .or_else(|| expires_in.and_then(|ttl| expiry_after(now, ttl)))
            .or_else(|| expiry_after(now, self.default_ttl_secs))
            .unwrap_or(now)
    }

    fn reject(&self, epoch: u64) {
        if self.cache.epoch() != epoch {
            return;
        }
        self.cache.clear();
        self.bus.publish(SessionEvent::Cleared {
            reason: ClearReason::ExchangeFailed,
        });
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("default_ttl_secs", &self.default_ttl_secs)
            .field("remember_me", &self.remember_me)
            .finish_non_exhaustive()
    }
}

/// Seconds from an `expires_in` value. Anything other than a positive,
/// finite number is treated as absent.
#[allow(clippy::cast_possible_truncation)]
fn expiry_hint(raw: Option<&Value>) -> Option<i64> {
    let raw = raw?;
    let seconds = raw.as_i64().or_else(|| {
        raw.as_f64()
            .filter(|secs| secs.is_finite())
            .map(|secs| secs.trunc() as i64)
    })?;
    (seconds > 0).then_some(seconds)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ExchangeErrorBody>(body).map_or_else(
        |_| {
            if body.trim().is_empty() {
                "no error details".to_string()
            } else {
                body.trim().to_string()
            }
        },
        |parsed| parsed.error,
    )
}
