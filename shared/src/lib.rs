//! Shared types for the Crab order relay
//!
//! Data model used by both the printing library consumers and the relay
//! engine: orders, printer configuration, connection state and the events
//! published on the relay's event bus.

pub mod event;
pub mod models;
pub mod util;

// Re-exports
pub use event::RelayEvent;
pub use models::{
    Order, OrderContent, OrderLine, OrderStatus, PrinterConfig, PrinterConnectionState,
};
pub use serde::{Deserialize, Serialize};
