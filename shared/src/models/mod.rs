//! Data models
//!
//! Orders are owned by the order source; the relay only reads them and asks
//! for the printed/notified flags to be changed. Printer configuration is
//! owned by the host and read-only to the relay.

pub mod order;
pub mod printer;

// Re-exports
pub use order::*;
pub use printer::*;
