//! Receipt printing
//!
//! - [`PrinterLink`] / [`NetworkPrinterLink`] - printer I/O
//! - [`Templating`] / [`ReceiptRenderer`] - order → ESC/POS bytes
//! - [`PrintDispatcher`] - print decision, connection state, send

pub mod dispatcher;
pub mod link;
pub mod renderer;

pub use dispatcher::{DispatchOutcome, PrintDispatcher, PrintTimeouts, SkipReason};
pub use link::{NetworkPrinterLink, PrinterLink};
pub use renderer::{ReceiptRenderer, Templating};
