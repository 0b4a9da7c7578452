//! Polling engine
//!
//! ```text
//! ConfigSource ──interval──► PollingScheduler ──fetch──► OrderSource
//!                                 │
//!                                 ▼
//!                          OrderProcessor ─► Deduplicator
//!                                 │
//!                     notify ◄────┴────► PrintDispatcher
//!
//! Watchdog ──restart──► PollingScheduler ◄──poll_now── NetworkMonitor
//! ```

pub mod dedup;
pub mod guard;
pub mod network;
pub mod policy;
pub mod processor;
pub mod scheduler;
pub mod watchdog;

pub use dedup::Deduplicator;
pub use guard::{InhibitKeepAlive, KeepAlive, NoopKeepAlive, ResourceGuard, ResourceLease};
pub use network::{ConnectivityProbe, NetworkMonitor, TcpConnectivityProbe};
pub use policy::{PollPhase, PollingIntervalPolicy};
pub use processor::{CycleReport, OrderProcessor};
pub use scheduler::{PollingScheduler, SchedulerOptions, SchedulerStatus};
pub use watchdog::Watchdog;
