//! Session event fan-out.
//!
//! Wraps a `tokio::sync::broadcast` channel carrying [`SessionEvent`]s so that
//! independently rendered regions learn about session transitions without
//! polling. Delivery is at-least-once; [`SessionListener::next_transition`]
//! collapses repeats for handlers with side effects.

use storefront_domain::SessionEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Publisher side of the session event channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Broadcasts an event to every current subscriber.
    pub fn publish(&self, event: SessionEvent) {
        match self.sender.send(event) {
            Ok(receivers) => debug!(event = event.name(), receivers, "session event published"),
            Err(_) => debug!(event = event.name(), "session event published with no subscribers"),
        }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> SessionListener {
        SessionListener {
            receiver: self.sender.subscribe(),
            last: None,
            ready: false,
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Receiving side of the session event channel.
#[derive(Debug)]
pub struct SessionListener {
    receiver: broadcast::Receiver<SessionEvent>,
    last: Option<SessionEvent>,
    ready: bool,
}

impl SessionListener {
    /// Next raw event, duplicates included.
    ///
    /// Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session listener lagged behind; events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next event that changes what this listener has already seen.
    ///
    /// A `session:ready` is delivered once until a `session:cleared` follows;
    /// consecutive `session:pending` or `session:cleared` events are
    /// delivered once.
    pub async fn next_transition(&mut self) -> Option<SessionEvent> {
        loop {
            let event = self.recv().await?;
            if self.accept(event) {
                return Some(event);
            }
            debug!(event = event.name(), "suppressing repeated session event");
        }
    }

    /// Waits until a session is ready.
    ///
    /// Returns `false` if the session is cleared first or the bus closes.
    pub async fn until_ready(&mut self) -> bool {
        while let Some(event) = self.recv().await {
            match event {
                SessionEvent::Ready { .. } => {
                    self.accept(event);
                    return true;
                }
                SessionEvent::Cleared { .. } => {
                    self.accept(event);
                    return false;
                }
                SessionEvent::Pending {} => {}
            }
        }
        false
    }

    fn accept(&mut self, event: SessionEvent) -> bool {
        let fresh = match event {
            SessionEvent::Ready { .. } => !self.ready,
            SessionEvent::Cleared { .. } => !self.last.is_some_and(|last| last.is_cleared()),
            SessionEvent::Pending {} => !matches!(self.last, Some(SessionEvent::Pending {})),
        };
        if fresh {
            self.ready = event.is_ready() || (self.ready && !event.is_cleared());
            self.last = Some(event);
        }
        fresh
    }
}
