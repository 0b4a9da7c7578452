//! Relay events
//!
//! Published on the relay's event bus so observers (UI, tray icon, metrics)
//! subscribe instead of relying on OS-level broadcasts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event published by the polling engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// A poll cycle completed and the order list may have changed
    OrdersUpdated,
    /// New actionable orders were found in a cycle
    NewOrders { count: usize },
    /// An out-of-band poll was requested
    RefreshRequested { reason: String },
    /// A receipt was printed and the order marked printed
    OrderPrinted { order_id: String },
    /// Dispatch failed; the order stays unprinted for the next cycle
    PrintFailed { order_id: String, reason: String },
    /// The scheduler loop was restarted
    SchedulerRestarted { reason: String },
    /// Connectivity changed
    NetworkChanged { available: bool },
    /// User-facing issue (e.g. sustained network outage)
    Issue { message: String },
}

impl fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayEvent::OrdersUpdated => write!(f, "orders_updated"),
            RelayEvent::NewOrders { count } => write!(f, "new_orders({})", count),
            RelayEvent::RefreshRequested { reason } => write!(f, "refresh_requested({})", reason),
            RelayEvent::OrderPrinted { order_id } => write!(f, "order_printed({})", order_id),
            RelayEvent::PrintFailed { order_id, .. } => write!(f, "print_failed({})", order_id),
            RelayEvent::SchedulerRestarted { reason } => {
                write!(f, "scheduler_restarted({})", reason)
            }
            RelayEvent::NetworkChanged { available } => {
                write!(f, "network_changed({})", available)
            }
            RelayEvent::Issue { .. } => write!(f, "issue"),
        }
    }
}
