//! Relay session notifications
//!
//! [`Relay`](crate::relay::Relay) publishes a [`RelayEvent`] whenever a
//! session opens, is turned away or closes. Delivery is best effort: a
//! session never waits on a listener, and a listener that falls behind
//! loses the oldest events.

pub mod types;

pub use types::RelayEvent;

use tokio::sync::broadcast;

/// Events buffered per listener before the oldest are overwritten
const EVENT_BACKLOG: usize = 256;

/// Fan-out of session events to the event feed and other listeners
///
/// ```no_run
/// use cam_relay::events::{EventBus, RelayEvent};
///
/// # async fn watch(bus: &EventBus) {
/// let mut rx = bus.subscribe();
/// while let Ok(event) = rx.recv().await {
///     if let RelayEvent::SessionClosed { session_id, reason, frames, .. } = event {
///         println!("{session_id} closed ({reason}) after {frames} frames");
///     }
/// }
/// # }
/// ```
pub struct EventBus {
    tx: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BACKLOG);
        Self { tx }
    }

    /// Deliver to every current listener; dropped when there are none
    pub fn publish(&self, event: RelayEvent) {
        let _ = self.tx.send(event);
    }

    /// Listen for events published from now on
    ///
    /// A lagging receiver gets `RecvError::Lagged` with the number of
    /// events it missed.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Listeners currently attached, reported by the health endpoint
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
