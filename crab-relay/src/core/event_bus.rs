//! Event Bus - 中继事件广播
//!
//! ```text
//! PollingScheduler / PrintDispatcher / NetworkMonitor
//!        │ publish
//!        ▼
//!    EventBus (broadcast)
//!        ├──► UI / tray subscriber
//!        └──► LogNotificationSink, tests, ...
//! ```
//!
//! Publishing is best-effort: with no subscriber the event is dropped, and a
//! slow subscriber sees `Lagged` instead of blocking the publisher.

use shared::RelayEvent;
use tokio::sync::broadcast;

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers
    pub fn publish(&self, event: RelayEvent) {
        tracing::trace!(event = %event, "Publishing relay event");
        // Err only means nobody is listening
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
