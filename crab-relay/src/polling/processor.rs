//! Per-cycle order processing
//!
//! For each fetched order: recency filter (first poll only) → dedup →
//! merge authoritative local flags → notify → dispatch.

use parking_lot::Mutex;
use shared::{Order, RelayEvent};
use std::sync::Arc;
use std::time::Duration;

use super::Deduplicator;
use crate::core::EventBus;
use crate::printing::{DispatchOutcome, PrintDispatcher};
use crate::sources::{ConfigSource, NotificationSink, OrderSource};

/// Result of processing one fetched batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Orders seen for the first time in this process
    pub new_orders: usize,
    pub notified: usize,
    pub printed: usize,
    pub failed: usize,
    /// Orders dropped by the first-poll recency window
    pub stale_skipped: usize,
    /// Creation time of the earliest order whose dispatch failed
    pub earliest_failed_at: Option<i64>,
}

pub struct OrderProcessor {
    config: Arc<dyn ConfigSource>,
    orders: Arc<dyn OrderSource>,
    notifier: Arc<dyn NotificationSink>,
    dispatcher: Arc<PrintDispatcher>,
    dedup: Arc<Deduplicator>,
    bus: EventBus,
    recency_window: Mutex<Duration>,
}

/// Dedup mark for an order still being handled
///
/// Dropped unsettled (dispatch error, panic, or the cycle future aborted by a
/// restart) it releases the id so a later cycle picks the order up again.
struct InFlight<'a> {
    dedup: &'a Deduplicator,
    id: String,
    settled: bool,
}

impl<'a> InFlight<'a> {
    /// `None` if the id was already seen
    fn claim(dedup: &'a Deduplicator, id: &str) -> Option<Self> {
        dedup.check_and_mark(id).then(|| Self {
            dedup,
            id: id.to_string(),
            settled: false,
        })
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.dedup.release(&self.id);
            tracing::debug!(order_id = %self.id, "Released unsettled order for retry");
        }
    }
}

impl OrderProcessor {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        orders: Arc<dyn OrderSource>,
        notifier: Arc<dyn NotificationSink>,
        dispatcher: Arc<PrintDispatcher>,
        dedup: Arc<Deduplicator>,
        bus: EventBus,
    ) -> Self {
        Self {
            config,
            orders,
            notifier,
            dispatcher,
            dedup,
            bus,
            recency_window: Mutex::new(Duration::from_secs(300)),
        }
    }

    pub fn with_recency_window(self, window: Duration) -> Self {
        self.set_recency_window(window);
        self
    }

    pub fn set_recency_window(&self, window: Duration) {
        *self.recency_window.lock() = window;
    }

    pub fn recency_window(&self) -> Duration {
        *self.recency_window.lock()
    }

    pub fn dedup(&self) -> &Arc<Deduplicator> {
        &self.dedup
    }

    pub fn dispatcher(&self) -> &Arc<PrintDispatcher> {
        &self.dispatcher
    }

    /// Process one fetched batch, one order at a time
    ///
    /// `first_poll` enables the recency window: older orders are assumed to
    /// have been handled by a previous process and are only marked seen.
    pub async fn process(&self, fetched: Vec<Order>, first_poll: bool) -> CycleReport {
        let mut report = CycleReport::default();
        let now = shared::util::now_millis();
        let window_ms = i64::try_from(self.recency_window().as_millis()).unwrap_or(i64::MAX);
        let printer = self.config.printer_config().await;

        for mut order in fetched {
            if !order.status.is_actionable() {
                continue;
            }

            if first_poll && now.saturating_sub(order.created_at) > window_ms {
                self.dedup.mark_seen(&order.id);
                report.stale_skipped += 1;
                tracing::debug!(order_id = %order.id, "Skipping order outside recency window");
                continue;
            }

            let Some(in_flight) = InFlight::claim(&self.dedup, &order.id) else {
                continue;
            };
            report.new_orders += 1;

            match self.orders.get_by_id(&order.id).await {
                Ok(Some(local)) => order.merge_local_flags(&local),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Failed to read local order state")
                }
            }

            if !order.notified {
                self.notifier.notify_new_order(&order);
                if let Err(e) = self.orders.mark_notified(&order.id).await {
                    tracing::warn!(order_id = %order.id, error = %e, "Failed to persist notified flag");
                }
                order.notified = true;
                report.notified += 1;
            }

            let Some(printer) = printer.as_ref() else {
                tracing::debug!(order_id = %order.id, "No printer configured");
                in_flight.settle();
                continue;
            };

            match self.dispatcher.dispatch(&order, printer).await {
                Ok(DispatchOutcome::Printed) => {
                    in_flight.settle();
                    report.printed += 1;
                    self.bus.publish(RelayEvent::OrderPrinted {
                        order_id: order.id.clone(),
                    });
                }
                Ok(DispatchOutcome::Skipped(reason)) => {
                    in_flight.settle();
                    tracing::debug!(order_id = %order.id, reason = %reason, "Print skipped");
                }
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Dispatch failed, will retry next cycle");
                    drop(in_flight);
                    report.failed += 1;
                    report.earliest_failed_at = Some(
                        report
                            .earliest_failed_at
                            .map_or(order.created_at, |t| t.min(order.created_at)),
                    );
                    self.bus.publish(RelayEvent::PrintFailed {
                        order_id: order.id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        self.bus.publish(RelayEvent::OrdersUpdated);
        if report.new_orders > 0 {
            self.bus.publish(RelayEvent::NewOrders {
                count: report.new_orders,
            });
        }
        report
    }
}
