//! Session coordinator
//!
//! The single entry point UI code talks to. It serves cached tokens, makes
//! sure concurrent callers share one exchange, retries transient failures
//! with a bounded in-memory attempt counter, and drives the renewal
//! scheduler. The coordinator owns the session's flight slot; the scheduler
//! only borrows it, so a renewal and an acquisition never overlap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use futures::FutureExt;
use storefront_domain::{
    ClearReason, ExchangeError, SessionEvent, SessionSettings, SessionStatus, Token,
};
use tracing::{debug, info, warn};

use super::event_bus::{EventBus, SessionListener};
use super::exchange_client::ExchangeClient;
use super::flight::{Claim, Flight, FlightKind, FlightSlot};
use super::renewal::RenewalScheduler;
use super::token_cache::TokenCache;
use crate::error::{SessionError, SessionResult};
use crate::ports::{Clock, IdentityProvider};

/// Coordinates token acquisition, renewal and logout for one session.
pub struct SessionCoordinator {
    acquirer: Arc<Acquirer>,
    scheduler: RenewalScheduler,
    flights: Arc<FlightSlot>,
    auto_renew: AtomicBool,
}

enum Joined {
    Cached(Token),
    Flight(Flight),
}

struct Acquirer {
    cache: Arc<TokenCache>,
    exchange: Arc<ExchangeClient>,
    identity: Arc<dyn IdentityProvider>,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    failures: AtomicU32,
}

impl SessionCoordinator {
    /// Wires a coordinator over an existing cache, exchange client and bus.
    ///
    /// `exchange` must write to `cache` and publish on `bus`.
    #[must_use]
    pub fn new(
        cache: Arc<TokenCache>,
        exchange: Arc<ExchangeClient>,
        identity: Arc<dyn IdentityProvider>,
        bus: EventBus,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        let flights = Arc::new(FlightSlot::default());
        let scheduler = RenewalScheduler::with_flights(
            Arc::clone(&cache),
            Arc::clone(&exchange),
            Arc::clone(&identity),
            Arc::clone(&clock),
            settings.clone(),
            Arc::clone(&flights),
        );
        Self {
            acquirer: Arc::new(Acquirer {
                cache,
                exchange,
                identity,
                bus,
                clock,
                settings,
                failures: AtomicU32::new(0),
            }),
            scheduler,
            flights,
            auto_renew: AtomicBool::new(false),
        }
    }

    /// Returns a valid session token, exchanging a fresh identity assertion
    /// if nothing valid is cached.
    ///
    /// Concurrent callers share a single exchange and receive the same
    /// result. A background renewal still running once the cached token has
    /// expired is joined rather than raced; if it fails, the caller falls
    /// back to a regular acquisition. Broadcasts `session:ready` (cached) or
    /// `session:pending` followed by the exchange outcome.
    ///
    /// # Errors
    ///
    /// - `AttemptsExhausted` once `max_attempts` consecutive transient
    ///   failures have piled up; call [`Self::reset_attempts`] to try again.
    /// - `Exchange(Rejected)`, `Exchange(Malformed)` or `SignedOut` without
    ///   retrying.
    /// - `LoggedOut` if [`Self::logout`] ran while the exchange was pending.
    pub async fn ensure_token(&self) -> SessionResult<Token> {
        loop {
            let joined = match self.acquirer.cache.get() {
                Some(token) => Joined::Cached(token),
                None => self.join_or_start()?,
            };
            let flight = match joined {
                Joined::Cached(token) => {
                    self.acquirer.bus.publish(SessionEvent::Ready { from_cache: true });
                    return Ok(token);
                }
                Joined::Flight(flight) => flight,
            };

            let result = flight.future().await;
            self.flights.land(flight.id());

            match result {
                Ok(token) => {
                    self.acquirer.failures.store(0, Ordering::Release);
                    self.scheduler.reset_failures();
                    if self.auto_renew.load(Ordering::Acquire) {
                        self.arm_scheduler();
                    }
                    return Ok(token);
                }
                Err(error)
                    if flight.kind() == FlightKind::Renewal
                        && error != SessionError::LoggedOut =>
                {
                    debug!(%error, "joined renewal failed; acquiring directly");
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn join_or_start(&self) -> SessionResult<Joined> {
        let vacancy = match self.flights.claim() {
            Claim::Busy(flight) => {
                debug!(
                    flight = flight.id(),
                    kind = ?flight.kind(),
                    "joining in-flight token exchange"
                );
                return Ok(Joined::Flight(flight));
            }
            Claim::Vacant(vacancy) => vacancy,
        };

        // Another flight may have finished between the first check and the lock.
        if let Some(token) = self.acquirer.cache.get() {
            return Ok(Joined::Cached(token));
        }

        let attempts = self.acquirer.failures.load(Ordering::Acquire);
        if attempts >= self.acquirer.settings.max_attempts {
            debug!(attempts, "token acquisition suspended after repeated failures");
            return Err(SessionError::AttemptsExhausted { attempts });
        }

        let epoch = self.acquirer.cache.epoch();
        let future = Arc::clone(&self.acquirer).acquire(epoch).boxed().shared();
        let flight = vacancy.fill(FlightKind::Acquisition, future);
        self.acquirer.bus.publish(SessionEvent::Pending {});
        debug!(flight = flight.id(), epoch, "token acquisition started");
        Ok(Joined::Flight(flight))
    }

    /// Clears the session: cache, durable tiers, scheduler and attempt
    /// counter. Broadcasts `session:cleared {reason: logout}`.
    ///
    /// Safe to call when already logged out. An exchange still in flight
    /// completes with `LoggedOut` and its token is discarded.
    pub fn logout(&self) {
        self.acquirer.cache.clear();
        self.scheduler.disarm();
        self.acquirer.failures.store(0, Ordering::Release);
        self.flights.abandon();
        self.acquirer.bus.publish(SessionEvent::Cleared {
            reason: ClearReason::Logout,
        });
        info!("session logged out");
    }

    /// Enables background renewal. Must be called from within a tokio
    /// runtime.
    ///
    /// The scheduler stays armed until [`Self::logout`] and is re-armed by
    /// the next successful acquisition after that.
    pub fn start(&self) {
        self.auto_renew.store(true, Ordering::Release);
        self.arm_scheduler();
    }

    fn arm_scheduler(&self) {
        let settings = &self.acquirer.settings;
        self.scheduler
            .arm(settings.check_interval(), settings.renewal_threshold());
    }

    /// The cached token, without suspending or touching the network.
    #[must_use]
    pub fn current(&self) -> Option<Token> {
        self.acquirer.cache.get()
    }

    /// Snapshot of the session for display.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if let Some(token) = self.acquirer.cache.get() {
            let seconds_remaining = token.seconds_until_expiry(self.acquirer.clock.now());
            let threshold =
                i64::try_from(self.acquirer.settings.renewal_threshold_secs).unwrap_or(i64::MAX);
            return if seconds_remaining <= threshold {
                SessionStatus::Expiring { seconds_remaining }
            } else {
                SessionStatus::Active { seconds_remaining }
            };
        }
        if self.flights.kind().is_some() {
            SessionStatus::Pending
        } else {
            SessionStatus::Absent
        }
    }

    /// Waits until a session is ready, without starting an exchange itself.
    ///
    /// Returns `None` if the session is cleared first.
    pub async fn wait_for_session(&self) -> Option<Token> {
        // Subscribe before checking so a ready event in between is not lost.
        let mut listener = self.acquirer.bus.subscribe();
        if let Some(token) = self.current() {
            return Some(token);
        }
        if listener.until_ready().await {
            self.current()
        } else {
            None
        }
    }

    /// Forgets earlier failures after `AttemptsExhausted`.
    pub fn reset_attempts(&self) {
        self.acquirer.failures.store(0, Ordering::Release);
        self.scheduler.reset_failures();
    }

    /// Failed acquisition attempts since the last success or logout.
    #[must_use]
    pub fn failed_attempts(&self) -> u32 {
        self.acquirer.failures.load(Ordering::Acquire)
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> SessionListener {
        self.acquirer.bus.subscribe()
    }

    /// The background renewal scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &RenewalScheduler {
        &self.scheduler
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCoordinator")
            .field("status", &self.status())
            .field("failed_attempts", &self.failed_attempts())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Acquirer {
    async fn acquire(self: Arc<Self>, epoch: u64) -> SessionResult<Token> {
        loop {
            let result = self.attempt(epoch).await;
            if self.cache.epoch() != epoch {
                return Err(SessionError::LoggedOut);
            }

            match result {
                Ok(token) => {
                    self.failures.store(0, Ordering::Release);
                    info!(
                        token = %token.preview(),
                        remaining_secs = token.seconds_until_expiry(self.clock.now()),
                        "session token acquired"
                    );
                    return Ok(token);
                }
                Err(error) if error.is_retryable() => {
                    let attempt = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
                    if attempt >= self.settings.max_attempts {
                        warn!(attempt, %error, "giving up on token acquisition");
                        self.announce_failure(epoch);
                        return Err(SessionError::AttemptsExhausted { attempts: attempt });
                    }
                    let delay = self.settings.retry_delay(attempt);
                    warn!(
                        attempt,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %error,
                        "token acquisition failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    if self.cache.epoch() != epoch {
                        return Err(SessionError::LoggedOut);
                    }
                }
                // The exchange client already cleared and announced it.
                Err(error @ SessionError::Exchange(ExchangeError::Rejected { .. })) => {
                    return Err(error);
                }
                Err(SessionError::LoggedOut) => return Err(SessionError::LoggedOut),
                Err(error) => {
                    warn!(%error, "token acquisition failed");
                    self.announce_failure(epoch);
                    return Err(error);
                }
            }
        }
    }

    async fn attempt(&self, epoch: u64) -> SessionResult<Token> {
        let assertion = self.identity.assertion().await?;
        Ok(self.exchange.exchange_within(epoch, &assertion).await?)
    }

    fn announce_failure(&self, epoch: u64) {
        if self.cache.epoch() == epoch {
            self.bus.publish(SessionEvent::Cleared {
                reason: ClearReason::ExchangeFailed,
            });
        }
    }
}
