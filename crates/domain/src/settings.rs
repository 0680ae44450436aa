//! Session Settings Domain Model
//!
//! Tunables for token caching, renewal and acquisition retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default prefix for durable storage keys.
pub const DEFAULT_NAMESPACE: &str = "storefront";

/// Session lifecycle settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Prefix for durable storage keys (`<namespace>_token`, ...).
    pub namespace: String,
    /// How often the renewal scheduler checks the cached token.
    pub check_interval_secs: u64,
    /// Renew once fewer than this many seconds remain.
    pub renewal_threshold_secs: u64,
    /// Lifetime assumed when the backend gives no expiry hint at all.
    pub default_ttl_secs: i64,
    /// Failed acquisition attempts tolerated before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further failure.
    pub retry_base_delay_ms: u64,
    /// Upper bound for the retry delay.
    pub retry_max_delay_ms: u64,
    /// Sent to the exchange endpoint as `remember_me`.
    pub remember_me: bool,
    /// Buffered events per subscriber before slow ones start lagging.
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            check_interval_secs: 60,
            renewal_threshold_secs: 900,
            default_ttl_secs: 3600,
            max_attempts: 3,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            remember_me: false,
            event_capacity: 64,
        }
    }
}

impl SessionSettings {
    /// Scheduler tick interval. Never zero.
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    /// Renewal threshold as a duration.
    #[must_use]
    pub const fn renewal_threshold(&self) -> Duration {
        Duration::from_secs(self.renewal_threshold_secs)
    }

    /// Delay to wait after the `failures`-th consecutive failure.
    ///
    /// Grows exponentially from `retry_base_delay_ms` and is capped at
    /// `retry_max_delay_ms`.
    #[must_use]
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let millis = self
            .retry_base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.namespace, "storefront");
        assert_eq!(settings.renewal_threshold(), Duration::from_secs(900));
        assert_eq!(settings.max_attempts, 3);
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        let settings = SessionSettings::default();
        assert_eq!(settings.retry_delay(1), Duration::from_millis(500));
        assert_eq!(settings.retry_delay(2), Duration::from_millis(1000));
        assert_eq!(settings.retry_delay(3), Duration::from_millis(2000));
        assert_eq!(settings.retry_delay(10), Duration::from_millis(8000));
    }

    #[test]
    fn test_check_interval_never_zero() {
        let settings = SessionSettings {
            check_interval_secs: 0,
            ..SessionSettings::default()
        };
        assert_eq!(settings.check_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_settings_deserialize_with_defaults() {
        let settings: SessionSettings =
            serde_json::from_str(r#"{"namespace":"shop","remember_me":true}"#).unwrap_or_default();
        assert_eq!(settings.namespace, "shop");
        assert!(settings.remember_me);
        assert_eq!(settings.check_interval_secs, 60);
    }
}
