//! Structural validation of bearer tokens.
//!
//! A token is three dot-delimited segments. The middle one is a base64url
//! encoded JSON object that must carry a subject (`sub`) and an expiry
//! (`exp`, Unix seconds). Signatures are not checked here; the backend that
//! issued the token is the authority on that.
//!
//! [`is_structurally_valid_at`] is the only gate between "a string" and a
//! trusted [`Token`](crate::Token). It never fails loudly: anything that does
//! not pass is simply not a token.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::{ClaimsError, ClaimsResult};

/// The claims this crate relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims {
    /// Subject identifier, rendered as a string.
    pub subject: String,
    /// Expiry as (possibly fractional) Unix seconds.
    pub expires_at_secs: f64,
}

impl TokenClaims {
    /// Expiry claim as an instant, truncated to millisecond precision.
    ///
    /// Returns `None` if the claim is outside chrono's representable range.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expiry_millis()).single()
    }

    /// Returns true if the expiry claim lies strictly after `now`.
    #[must_use]
    pub fn expires_after(&self, now: DateTime<Utc>) -> bool {
        self.expiry_millis() > now.timestamp_millis()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn expiry_millis(&self) -> i64 {
        (self.expires_at_secs * 1000.0) as i64
    }
}

/// Decodes the claims segment of `candidate` without checking expiry.
///
/// # Errors
///
/// Returns a [`ClaimsError`] describing the first structural problem found.
pub fn decode_claims(candidate: &str) -> ClaimsResult<TokenClaims> {
    let segments: Vec<&str> = candidate.split('.').collect();
    if segments.len() != 3 {
        return Err(ClaimsError::SegmentCount {
            found: segments.len(),
        });
    }

    let bytes = decode_segment(segments[1])?;
    let map: Map<String, Value> =
        serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Json(e.to_string()))?;

    let subject = match map.get("sub") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(ClaimsError::MissingClaim("sub")),
    };

    let expires_at_secs = map
        .get("exp")
        .and_then(Value::as_f64)
        .ok_or(ClaimsError::MissingClaim("exp"))?;

    Ok(TokenClaims {
        subject,
        expires_at_secs,
    })
}

/// Returns true if `candidate` is a well-formed token that has not expired
/// at `now`.
#[must_use]
pub fn is_structurally_valid_at(candidate: &str, now: DateTime<Utc>) -> bool {
    decode_claims(candidate).is_ok_and(|claims| claims.expires_after(now))
}

/// [`is_structurally_valid_at`] against the wall clock.
#[must_use]
pub fn is_structurally_valid(candidate: &str) -> bool {
    is_structurally_valid_at(candidate, Utc::now())
}

/// Decodes a base64url segment by mapping it onto the standard alphabet and
/// restoring padding.
fn decode_segment(segment: &str) -> ClaimsResult<Vec<u8>> {
    let mut translated: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    while translated.len() % 4 != 0 {
        translated.push('=');
    }

    STANDARD
        .decode(translated.as_bytes())
        .map_err(|_| ClaimsError::Encoding)
}
