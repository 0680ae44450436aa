//! The single token exchange a session may have in flight.
//!
//! Foreground acquisitions and background renewals both register here, so
//! whoever arrives while either one is running joins it instead of starting
//! a second round trip.

use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, MutexGuard};
use storefront_domain::Token;

use crate::error::SessionResult;

pub(crate) type SharedExchange = Shared<BoxFuture<'static, SessionResult<Token>>>;

/// Who started a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlightKind {
    /// `ensure_token` found nothing valid cached.
    Acquisition,
    /// The scheduler refreshed a token nearing expiry.
    Renewal,
}

#[derive(Clone)]
pub(crate) struct Flight {
    id: u64,
    kind: FlightKind,
    future: SharedExchange,
}

impl Flight {
    pub(crate) const fn id(&self) -> u64 {
        self.id
    }

    pub(crate) const fn kind(&self) -> FlightKind {
        self.kind
    }

    pub(crate) fn future(&self) -> SharedExchange {
        self.future.clone()
    }
}

/// Result of [`FlightSlot::claim`].
pub(crate) enum Claim<'a> {
    /// Something is already running.
    Busy(Flight),
    /// The slot is empty and stays locked until the vacancy is filled or
    /// dropped.
    Vacant(Vacancy<'a>),
}

pub(crate) struct Vacancy<'a> {
    slot: MutexGuard<'a, Option<Flight>>,
    next_id: &'a AtomicU64,
}

impl Vacancy<'_> {
    /// Registers `future` as the session's flight.
    pub(crate) fn fill(mut self, kind: FlightKind, future: SharedExchange) -> Flight {
        let flight = Flight {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            future,
        };
        *self.slot = Some(flight.clone());
        flight
    }
}

/// Shared between the coordinator and the renewal scheduler.
#[derive(Default)]
pub(crate) struct FlightSlot {
    current: Mutex<Option<Flight>>,
    next_id: AtomicU64,
}

impl FlightSlot {
    pub(crate) fn claim(&self) -> Claim<'_> {
        let slot = self.current.lock();
        match slot.as_ref() {
            Some(flight) => Claim::Busy(flight.clone()),
            None => Claim::Vacant(Vacancy {
                slot,
                next_id: &self.next_id,
            }),
        }
    }

    /// Empties the slot if flight `id` still occupies it.
    pub(crate) fn land(&self, id: u64) {
        let mut slot = self.current.lock();
        if slot.as_ref().is_some_and(|flight| flight.id == id) {
            *slot = None;
        }
    }

    /// Forgets whatever is running. Joined callers still get its result.
    pub(crate) fn abandon(&self) {
        self.current.lock().take();
    }

    pub(crate) fn kind(&self) -> Option<FlightKind> {
        self.current.lock().as_ref().map(Flight::kind)
    }
}

impl std::fmt::Debug for FlightSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightSlot")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Lands a flight when dropped, so a panicking or cancelled flight cannot
/// hold the slot forever.
pub(crate) struct Landing<'a> {
    pub(crate) slot: &'a FlightSlot,
    pub(crate) id: u64,
}

impl Drop for Landing<'_> {
    fn drop(&mut self) {
        self.slot.land(self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use pretty_assertions::assert_eq;

    use crate::error::SessionError;

    fn failing() -> SharedExchange {
        async { Err(SessionError::SignedOut) }.boxed().shared()
    }

    #[tokio::test]
    async fn test_second_claim_joins_first_flight() {
        let slot = FlightSlot::default();
        let Claim::Vacant(vacancy) = slot.claim() else {
            panic!("fresh slot is occupied");
        };
        let first = vacancy.fill(FlightKind::Renewal, failing());

        let Claim::Busy(joined) = slot.claim() else {
            panic!("renewal did not occupy the slot");
        };
        assert_eq!(joined.id(), first.id());
        assert_eq!(joined.kind(), FlightKind::Renewal);
        assert_eq!(joined.future().await, Err(SessionError::SignedOut));
    }

    #[test]
    fn test_landing_only_clears_its_own_flight() {
        let slot = FlightSlot::default();
        let Claim::Vacant(vacancy) = slot.claim() else {
            panic!("fresh slot is occupied");
        };
        let stale = vacancy.fill(FlightKind::Acquisition, failing()).id();

        slot.abandon();
        let Claim::Vacant(vacancy) = slot.claim() else {
            panic!("abandon left the slot occupied");
        };
        let current = vacancy.fill(FlightKind::Acquisition, failing()).id();

        drop(Landing {
            slot: &slot,
            id: stale,
        });
        assert_eq!(slot.kind(), Some(FlightKind::Acquisition));

        slot.land(current);
        assert_eq!(slot.kind(), None);
    }
}
