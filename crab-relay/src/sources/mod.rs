//! External collaborators consumed by the polling engine
//!
//! The engine only talks to these traits; the concrete implementations in
//! this module are what the `crab-relay` daemon wires together:
//!
//! - [`ConfigSource`] → [`EnvConfigSource`]
//! - [`OrderSource`] → [`RemoteOrderSource`] (backend API + [`OrderStore`])
//! - [`NotificationSink`] → [`LogNotificationSink`]

pub mod config_source;
pub mod notify;
pub mod remote;
pub mod storage;

pub use config_source::EnvConfigSource;
pub use notify::LogNotificationSink;
pub use remote::RemoteOrderSource;
pub use storage::{OrderStore, OrderStoreError, OrderStoreResult};

use async_trait::async_trait;
use shared::{Order, PrinterConfig};
use tokio::sync::watch;

use crate::core::RelayResult;

/// Reactive source of polling interval, credentials and print settings
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Polling interval in seconds; every change is pushed to receivers
    fn polling_interval(&self) -> watch::Receiver<u64>;

    /// Whether backend credentials are present and complete
    async fn credentials_valid(&self) -> bool;

    /// Global auto-print switch
    async fn auto_print_enabled(&self) -> bool;

    /// Configured receipt printer, if any
    async fn printer_config(&self) -> Option<PrinterConfig>;
}

/// Orders as seen by the engine
///
/// The printed flag returned by [`OrderSource::get_by_id`] is authoritative;
/// the one in fetch results may be stale.
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Actionable orders created or changed since `cursor` (Unix millis);
    /// `None` means "no cursor yet"
    async fn fetch_actionable_since(&self, cursor: Option<i64>) -> RelayResult<Vec<Order>>;

    /// Locally persisted record of an order
    async fn get_by_id(&self, id: &str) -> RelayResult<Option<Order>>;

    /// Persist the printed flag; `false` if the order is unknown
    async fn mark_printed(&self, id: &str) -> RelayResult<bool>;

    /// Persist the notified flag
    async fn mark_notified(&self, id: &str) -> RelayResult<()>;
}

/// User-facing notifications
pub trait NotificationSink: Send + Sync {
    fn notify_new_order(&self, order: &Order);

    fn notify_issue(&self, message: &str);
}
