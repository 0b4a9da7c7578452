//! Notification sink writing to the `notify` log and the event bus

use shared::{Order, RelayEvent};

use super::NotificationSink;
use crate::core::EventBus;

/// Surfaces notifications through the permanent `notify` log target
///
/// Desktop/tray front-ends subscribe to the [`EventBus`] for
/// [`RelayEvent::Issue`].
pub struct LogNotificationSink {
    bus: EventBus,
}

impl LogNotificationSink {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl NotificationSink for LogNotificationSink {
    fn notify_new_order(&self, order: &Order) {
        tracing::info!(
            target: "notify",
            order_id = %order.id,
            number = %order.number,
            total = %order.content.total,
            currency = %order.content.currency,
            "New order #{}",
            order.number
        );
    }

    fn notify_issue(&self, message: &str) {
        tracing::warn!(target: "notify", "{}", message);
        self.bus.publish(RelayEvent::Issue {
            message: message.to_string(),
        });
    }
}
