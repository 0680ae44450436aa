//! Background token renewal.
//!
//! While armed, a tokio interval checks the cached token and, once it gets
//! within the renewal threshold, fetches a fresh identity assertion and runs
//! one exchange. The renewal registers in the session's flight slot, so it
//! never overlaps a foreground acquisition, and a caller who finds the token
//! expired mid-renewal joins it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use storefront_domain::{SessionSettings, Token};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::exchange_client::ExchangeClient;
use super::flight::{Claim, FlightKind, FlightSlot, Landing};
use super::token_cache::TokenCache;
use crate::error::{SessionError, SessionResult};
use crate::ports::{Clock, IdentityProvider};

/// What a single scheduler tick decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing is cached; first acquisition is the coordinator's job.
    NoToken,
    /// The token is outside the renewal threshold.
    Fresh,
    /// A renewal or a foreground acquisition is still running.
    InFlight,
    /// Waiting out the back-off after a failed renewal.
    BackingOff,
    /// Too many consecutive failures; renewal is suspended.
    Suspended,
    /// A renewal was started.
    Renewing,
}

/// Periodically renews the cached token before it expires.
pub struct RenewalScheduler {
    inner: Arc<RenewalInner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

struct RenewalInner {
    cache: Arc<TokenCache>,
    exchange: Arc<ExchangeClient>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    threshold_secs: AtomicU64,
    flights: Arc<FlightSlot>,
    failures: Mutex<FailureState>,
}

#[derive(Debug, Default)]
struct FailureState {
    consecutive: u32,
    not_before: Option<DateTime<Utc>>,
}

impl RenewalScheduler {
    /// Create an idle scheduler with a flight slot of its own.
    #[must_use]
    pub fn new(
        cache: Arc<TokenCache>,
        exchange: Arc<ExchangeClient>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self::with_flights(
            cache,
            exchange,
            identity,
            clock,
            settings,
            Arc::new(FlightSlot::default()),
        )
    }

    pub(crate) fn with_flights(
        cache: Arc<TokenCache>,
        exchange: Arc<ExchangeClient>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
        flights: Arc<FlightSlot>,
    ) -> Self {
        let threshold_secs = AtomicU64::new(settings.renewal_threshold_secs);
        Self {
            inner: Arc::new(RenewalInner {
                cache,
                exchange,
                identity,
                clock,
                settings,
                threshold_secs,
                flights,
                failures: Mutex::new(FailureState::default()),
            }),
            timer: Mutex::new(None),
        }
    }

    /// Starts ticking every `check_interval`, renewing once fewer than
    /// `renewal_threshold` remain.
    ///
    /// Returns `false` without changes if the scheduler is already armed.
    /// Must be called from within a tokio runtime.
    pub fn arm(&self, check_interval: Duration, renewal_threshold: Duration) -> bool {
        let mut timer = self.timer.lock();
        if timer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        self.inner
            .threshold_secs
            .store(renewal_threshold.as_secs(), Ordering::Relaxed);

        let inner = Arc::clone(&self.inner);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let outcome = inner.tick();
                debug!(?outcome, "renewal tick");
            }
        }));

        info!(
            interval_secs = check_interval.as_secs(),
            threshold_secs = renewal_threshold.as_secs(),
            "renewal scheduler armed"
        );
        true
    }

    /// Stops the timer. Idempotent.
    ///
    /// A renewal already in flight is not aborted; its result is discarded
    /// by the cache if the session was cleared meanwhile.
    pub fn disarm(&self) -> bool {
        let Some(handle) = self.timer.lock().take() else {
            return false;
        };
        handle.abort();
        self.reset_failures();
        info!("renewal scheduler disarmed");
        true
    }

    /// Returns true while the timer is running.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Returns true while a renewal exchange is running.
    #[must_use]
    pub fn is_renewing(&self) -> bool {
        self.inner.flights.kind() == Some(FlightKind::Renewal)
    }

    /// Runs one check immediately, outside the timer.
    pub fn tick(&self) -> TickOutcome {
        self.inner.tick()
    }

    /// Forgets earlier failures so renewal resumes at full speed.
    pub fn reset_failures(&self) {
        *self.inner.failures.lock() = FailureState::default();
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for RenewalScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenewalScheduler")
            .field("armed", &self.is_armed())
            .field("renewing", &self.is_renewing())
            .finish_non_exhaustive()
    }
}

impl RenewalInner {
    fn tick(self: &Arc<Self>) -> TickOutcome {
        if self.cache.get().is_none() {
            return TickOutcome::NoToken;
        }

        let remaining = self.cache.remaining_seconds().unwrap_or(0);
        let threshold =
            i64::try_from(self.threshold_secs.load(Ordering::Relaxed)).unwrap_or(i64::MAX);
        if remaining > threshold {
            return TickOutcome::Fresh;
        }

        {
            let failures = self.failures.lock();
            if failures.consecutive >= self.settings.max_attempts {
                return TickOutcome::Suspended;
            }
            if failures
                .not_before
                .is_some_and(|not_before| self.clock.now() < not_before)
            {
                return TickOutcome::BackingOff;
            }
        }

        let vacancy = match self.flights.claim() {
            Claim::Busy(_) => return TickOutcome::InFlight,
            Claim::Vacant(vacancy) => vacancy,
        };

        let epoch = self.cache.epoch();
        let future = Arc::clone(self).renew(epoch).boxed().shared();
        let flight = vacancy.fill(FlightKind::Renewal, future);
        debug!(
            flight = flight.id(),
            remaining_secs = remaining,
            epoch,
            "renewing session token"
        );

        // Drives the renewal even when nobody joins it.
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _landing = Landing {
                slot: &inner.flights,
                id: flight.id(),
            };
            let _renewed = flight.future().await;
        });
        TickOutcome::Renewing
    }

    async fn renew(self: Arc<Self>, epoch: u64) -> SessionResult<Token> {
        let result = match self.identity.assertion().await {
            Ok(assertion) => self
                .exchange
                .exchange_within(epoch, &assertion)
                .await
                .map_err(SessionError::from),
            Err(e) => Err(SessionError::from(e)),
        };

        let mut failures = self.failures.lock();
        match &result {
            Ok(token) => {
                *failures = FailureState::default();
                info!(
                    token = %token.preview(),
                    remaining_secs = token.seconds_until_expiry(self.clock.now()),
                    "session token renewed"
                );
            }
            Err(SessionError::LoggedOut) => {
                debug!("renewal result discarded after logout");
            }
            Err(e) if e.is_retryable() => {
                failures.consecutive += 1;
                let delay = self.settings.retry_delay(failures.consecutive);
                failures.not_before = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|delay| self.clock.now().checked_add_signed(delay));
                warn!(
                    attempt = failures.consecutive,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "session token renewal failed"
                );
            }
            Err(e) => {
                // Retrying would send the same doomed request; wait for a
                // fresh acquisition to reset the counter.
                failures.consecutive = self.settings.max_attempts;
                warn!(error = %e, "session token renewal failed permanently");
            }
        }
        drop(failures);
        result
    }
}
