//! Tiered token cache.
//!
//! One token lives in an in-memory slot. Writes are mirrored, best effort, to
//! an ordered list of durable [`StorageBackend`] tiers; reads consult the
//! slot first and hydrate from the tiers at most once per cache lifetime.
//! Nothing that fails validation ever leaves this module.
//!
//! Every [`TokenCache::clear`] advances a session epoch. Writers that started
//! work before a clear use [`TokenCache::commit`] so their late results are
//! dropped instead of resurrecting a logged-out session.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use storefront_domain::{Token, TokenSource, decode_claims, expiry_after};
use tracing::{debug, info, warn};

use crate::ports::{Clock, StorageBackend};

/// Process-wide cache for the single session token.
pub struct TokenCache {
    namespace: String,
    tiers: Vec<Arc<dyn StorageBackend>>,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    slot: Option<Token>,
    hydrated: bool,
    epoch: u64,
}

impl TokenCache {
    /// Creates an empty cache with no durable tiers.
    #[must_use]
    pub fn new(namespace: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            namespace: namespace.into(),
            tiers: Vec::new(),
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Appends a durable tier. Tiers are read in the order they are added.
    #[must_use]
    pub fn with_tier(mut self, tier: Arc<dyn StorageBackend>) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Storage key of the raw token.
    #[must_use]
    pub fn token_key(&self) -> String {
        format!("{}_token", self.namespace)
    }

    /// Storage key of the Unix-millisecond expiry.
    #[must_use]
    pub fn expiry_key(&self) -> String {
        format!("{}_token_exp", self.namespace)
    }

    /// Storage key of the reload counter written by older builds.
    #[must_use]
    pub fn reload_tracker_key(&self) -> String {
        format!("{}_reload_tracker", self.namespace)
    }

    /// Returns the cached token if it is still valid.
    ///
    /// Never renews. An expired or malformed entry is dropped from memory and
    /// reported as absent.
    pub fn get(&self) -> Option<Token> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.hydrate_once(&mut state, now);

        if state.slot.as_ref().is_some_and(|token| token.is_valid_at(now)) {
            return state
                .slot
                .clone()
                .map(|token| token.with_source(TokenSource::CacheHit));
        }

        if let Some(stale) = state.slot.take() {
            debug!(token = %stale.preview(), "dropping cached token that is no longer valid");
        }
        None
    }

    /// Caches `value` for `ttl_seconds` from now.
    ///
    /// A TTL too large to represent is capped at the token's own `exp`
    /// claim; one too negative expires the entry immediately. Without a
    /// readable claim an unrepresentable TTL stores nothing.
    pub fn set(&self, value: &str, ttl_seconds: i64) {
        let now = self.clock.now();
        let expires_at = expiry_after(now, ttl_seconds).or_else(|| {
            if ttl_seconds < 0 {
                return Some(now);
            }
            decode_claims(value).ok().and_then(|claims| claims.expires_at())
        });
        match expires_at {
            Some(expires_at) => self.set_expiring_at(value, expires_at),
            None => warn!(ttl_seconds, "ignoring token with an unrepresentable lifetime"),
        }
    }

    /// Caches `value` until the exact instant `expires_at`.
    pub fn set_expiring_at(&self, value: &str, expires_at: DateTime<Utc>) {
        let mut state = self.state.lock();
        self.store_locked(&mut state, value, expires_at);
    }

    /// Caches `value` only if no clear happened since `epoch` was read.
    ///
    /// Returns the stored token, or `None` when the write was discarded.
    pub fn commit(&self, epoch: u64, value: &str, expires_at: DateTime<Utc>) -> Option<Token> {
        let mut state = self.state.lock();
        if state.epoch != epoch {
            debug!(
                expected = epoch,
                current = state.epoch,
                "discarding token from a cleared session"
            );
            return None;
        }
        Some(self.store_locked(&mut state, value, expires_at))
    }

    /// Empties memory and every durable tier. Idempotent.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.slot = None;
        // Nothing is left to hydrate from.
        state.hydrated = true;

        let keys = [self.token_key(), self.expiry_key(), self.reload_tracker_key()];
        for tier in &self.tiers {
            for key in &keys {
                if let Err(e) = tier.remove(key) {
                    warn!(
                        tier = tier.name(),
                        key = %key,
                        error = %e,
                        "failed to clear durable token entry"
                    );
                }
            }
        }
        debug!(epoch = state.epoch, "token cache cleared");
    }

    /// Seconds until the cached token expires, floored at zero.
    ///
    /// `None` when nothing is cached.
    pub fn remaining_seconds(&self) -> Option<i64> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.hydrate_once(&mut state, now);
        state
            .slot
            .as_ref()
            .map(|token| token.seconds_until_expiry(now))
    }

    /// Current session epoch. Changes on every clear.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    fn store_locked(&self, state: &mut CacheState, value: &str, expires_at: DateTime<Utc>) -> Token {
        let token = Token::new(value, expires_at, TokenSource::FreshExchange);
        state.slot = Some(token.clone());
        state.hydrated = true;

        let token_key = self.token_key();
        let expiry_key = self.expiry_key();
        let expiry = expires_at.timestamp_millis().to_string();
        for tier in &self.tiers {
            let mirrored = tier
                .write(&token_key, value)
                .and_then(|()| tier.write(&expiry_key, &expiry));
            if let Err(e) = mirrored {
                warn!(tier = tier.name(), error = %e, "failed to mirror token to durable storage");
            }
        }
        token
    }

    fn hydrate_once(&self, state: &mut CacheState, now: DateTime<Utc>) {
        if state.hydrated || state.slot.is_some() {
            return;
        }
        state.hydrated = true;

        for tier in &self.tiers {
            if let Some(token) = self.read_tier(tier.as_ref(), now) {
                info!(
                    tier = tier.name(),
                    remaining_secs = token.seconds_until_expiry(now),
                    "restored session token from durable storage"
                );
                state.slot = Some(token);
                return;
            }
        }
    }

    fn read_tier(&self, tier: &dyn StorageBackend, now: DateTime<Utc>) -> Option<Token> {
        let value = match tier.read(&self.token_key()) {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(e) => {
                warn!(tier = tier.name(), error = %e, "failed to read durable token");
                return None;
            }
        };

        let stored_expiry = match tier.read(&self.expiry_key()) {
            Ok(raw) => raw
                .and_then(|millis| millis.trim().parse::<i64>().ok())
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
            Err(e) => {
                warn!(tier = tier.name(), error = %e, "failed to read durable token expiry");
                None
            }
        };
        let expires_at = stored_expiry
            .or_else(|| decode_claims(&value).ok().and_then(|claims| claims.expires_at()))?;

        let token = Token::new(value, expires_at, TokenSource::CacheHit);
        if token.is_valid_at(now) {
            Some(token)
        } else {
            debug!(tier = tier.name(), "ignoring expired or malformed durable token");
            None
        }
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("namespace", &self.namespace)
            .field("tiers", &self.tiers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::session::test_support::{ManualClock, MapTier, mint};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn cache_with(clock: &Arc<ManualClock>, tier: &Arc<MapTier>) -> TokenCache {
        TokenCache::new("shop", clock.clone()).with_tier(tier.clone())
    }

    #[test]
    fn test_set_then_get_returns_token() {
        let clock = ManualClock::new();
        let tier = MapTier::new();
        let cache = cache_with(&clock, &tier);
        let value = mint("shopper", clock.now() + Duration::hours(2));

        cache.set(&value, 3600);

        let token = cache.get().unwrap();
        assert_eq!(token.value(), value);
        assert_eq!(token.source(), TokenSource::CacheHit);
        assert_eq!(cache.remaining_seconds(), Some(3600));
    }

    #[test]
    fn test_non_positive_ttl_is_absent() {
        let clock = ManualClock::new();
        let cache = TokenCache::new("shop", clock.clone());
        let value = mint("shopper", clock.now() + Duration::hours(2));

        cache.set(&value, 0);
        assert!(cache.get().is_none());

        cache.set(&value, -30);
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_extreme_ttl_is_capped_at_claimed_expiry() {
        let clock = ManualClock::new();
        let tier = MapTier::new();
        let cache = cache_with(&clock, &tier);
        let value = mint("shopper", clock.now() + Duration::hours(2));

        cache.set(&value, 10_000_000_000_000_000);
        assert_eq!(cache.get().unwrap().value(), value);
        assert_eq!(cache.remaining_seconds(), Some(7200));

        cache.set(&value, i64::MAX);
        assert_eq!(cache.remaining_seconds(), Some(7200));

        cache.set(&value, i64::MIN);
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_extreme_ttl_without_claim_stores_nothing() {
        let clock = ManualClock::new();
        let tier = MapTier::new();
        let cache = cache_with(&clock, &tier);

        cache.set("opaque-session-value", i64::MAX);

        assert_eq!(cache.remaining_seconds(), None);
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn test_structurally_invalid_value_is_absent() {
        let clock = ManualClock::new();
        let cache = TokenCache::new("shop", clock.clone());

        cache.set("validtoken.with.3parts", 3600);
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let clock = ManualClock::new();
        let cache = TokenCache::new("shop", clock.clone());
        let value = mint("shopper", clock.now() + Duration::hours(2));

        cache.set(&value, 60);
        clock.advance(59);
        assert!(cache.get().is_some());
        clock.advance(1);
        assert!(cache.get().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let clock = ManualClock::new();
        let tier = MapTier::new();
        let cache = cache_with(&clock, &tier);
        cache.set(&mint("shopper", clock.now() + Duration::hours(2)), 3600);
        tier.put("shop_reload_tracker", "2");

        cache.clear();
        assert!(cache.get().is_none());
        assert_eq!(tier.len(), 0);

        cache.clear();
        assert!(cache.get().is_none());
        assert_eq!(cache.remaining_seconds(), None);
    }

    #[test]
    fn test_durable_layout() {
        let clock = ManualClock::new();
        let tier = MapTier::new();
        let cache = cache_with(&clock, &tier);
        let value = mint("shopper", clock.now() + Duration::hours(2));

        cache.set(&value, 3600);

        assert_eq!(tier.get("shop_token"), Some(value));
        let expected_ms = (clock.now() + Duration::seconds(3600)).timestamp_millis();
        assert_eq!(tier.get("shop_token_exp"), Some(expected_ms.to_string()));
    }

    #[test]
    fn test_reload_round_trip() {
        let clock = ManualClock::new();
        let tier = MapTier::new();
        let value = mint("shopper", clock.now() + Duration::hours(2));
        cache_with(&clock, &tier).set(&value, 3600);

        // A fresh cache over the same durable tier simulates a page reload.
        let reloaded = cache_with(&clock, &tier);
        clock.advance(100);
        let token = reloaded.get().unwrap();
        assert_eq!(token.value(), value);
        assert_eq!(reloaded.remaining_seconds(), Some(3500));
    }

    #[test]
    fn test_hydration_probes_storage_once() {
        let clock = ManualClock::new();
        let tier = MapTier::new();
        let cache = cache_with(&clock, &tier);

        assert!(cache.get().is_none());
        let reads = tier.reads();
        assert!(reads > 0);

        // Written behind the cache's back; must not be picked up.
        tier.put("shop_token", &mint("shopper", clock.now() + Duration::hours(2)));
        assert!(cache.get().is_none());
        assert!(cache.get().is_none());
        assert_eq!(tier.reads(), reads);
    }

    #[test]
    fn test_hydration_skips_expired_and_broken_entries() {
        let clock = ManualClock::new();
        let broken = MapTier::new();
        broken.put("shop_token", "garbage");
        broken.put("shop_token_exp", "not-a-number");

        let expired = MapTier::new();
        expired.put("shop_token", &mint("shopper", clock.now() - Duration::hours(1)));
        expired.put(
            "shop_token_exp",
            &(clock.now() - Duration::hours(1)).timestamp_millis().to_string(),
        );

        let good = MapTier::new();
        let value = mint("shopper", clock.now() + Duration::hours(1));
        good.put("shop_token", &value);

        let cache = TokenCache::new("shop", clock.clone())
            .with_tier(broken)
            .with_tier(expired)
            .with_tier(good);

        // The last tier has no expiry key; the claim is used instead.
        let token = cache.get().unwrap();
        assert_eq!(token.value(), value);
        assert_eq!(cache.remaining_seconds(), Some(3600));
    }

    #[test]
    fn test_durable_write_failure_keeps_memory_copy() {
        let clock = ManualClock::new();
        let tier = MapTier::failing();
        let cache = cache_with(&clock, &tier);
        let value = mint("shopper", clock.now() + Duration::hours(2));

        cache.set(&value, 3600);

        assert_eq!(cache.get().unwrap().value(), value);
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn test_commit_after_clear_is_discarded() {
        let clock = ManualClock::new();
        let tier = MapTier::new();
        let cache = cache_with(&clock, &tier);
        let value = mint("shopper", clock.now() + Duration::hours(2));

        let epoch = cache.epoch();
        cache.clear();

        assert!(cache.commit(epoch, &value, clock.now() + Duration::hours(1)).is_none());
        assert!(cache.get().is_none());
        assert_eq!(tier.get("shop_token"), None);

        let current = cache.epoch();
        let token = cache
            .commit(current, &value, clock.now() + Duration::hours(1))
            .unwrap();
        assert_eq!(token.source(), TokenSource::FreshExchange);
        assert!(cache.get().is_some());
    }
}
