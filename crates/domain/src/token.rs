//! Bearer token value object.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::validator;

/// Where a token handed to a caller came from.
///
/// Used for logging and for the `fromCache` flag of the ready event; never
/// for deciding behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenSource {
    /// Served from the token cache.
    CacheHit,
    /// Obtained by a fresh exchange round trip.
    FreshExchange,
}

/// An API access token with its expiry instant.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: DateTime<Utc>,
    source: TokenSource,
}

impl Token {
    /// Creates a token. No validation happens here; see [`Token::is_valid_at`].
    #[must_use]
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>, source: TokenSource) -> Self {
        Self {
            value: value.into(),
            expires_at,
            source,
        }
    }

    /// Creates a token that expires `ttl_seconds` after `now`.
    ///
    /// Returns `None` when that instant is not representable.
    #[must_use]
    pub fn with_ttl(
        value: impl Into<String>,
        now: DateTime<Utc>,
        ttl_seconds: i64,
        source: TokenSource,
    ) -> Option<Self> {
        expiry_after(now, ttl_seconds).map(|expires_at| Self::new(value, expires_at, source))
    }

    /// The raw bearer credential.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When this token stops being usable.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Where this token came from.
    #[must_use]
    pub const fn source(&self) -> TokenSource {
        self.source
    }

    /// Returns the same token tagged with a different provenance.
    #[must_use]
    pub fn with_source(mut self, source: TokenSource) -> Self {
        self.source = source;
        self
    }

    /// A token is valid iff `now < expires_at` and its value passes
    /// structural validation.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at && validator::is_structurally_valid_at(&self.value, now)
    }

    /// Whole seconds until expiry, floored at zero.
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Returns the Authorization header value.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.value)
    }

    /// First few characters of the value, safe to log.
    #[must_use]
    pub fn preview(&self) -> String {
        match self.value.get(..8) {
            Some(head) if self.value.len() > 12 => format!("{head}..."),
            _ => "***".to_string(),
        }
    }
}

// Keeps the full credential out of logs and panic messages.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &self.preview())
            .field("expires_at", &self.expires_at)
            .field("source", &self.source)
            .finish()
    }
}

/// `now` plus `ttl_seconds`, or `None` when the sum falls outside the
/// range chrono can represent.
#[must_use]
pub fn expiry_after(now: DateTime<Utc>, ttl_seconds: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(ttl_seconds).and_then(|ttl| now.checked_add_signed(ttl))
}
