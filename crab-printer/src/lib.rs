//! # crab-printer
//!
//! ESC/POS receipt printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building
//! - Text encoding for the printer's code page (UTF-8, GBK, Windows-1252)
//! - Persistent network printing connections (TCP port 9100)
//!
//! Business logic (WHAT to print, WHEN to print) stays in application code:
//! - Receipt rendering and dispatch → crab-relay
//!
//! ## Example
//!
//! ```ignore
//! use crab_printer::{EscPosBuilder, NetworkPrinter, TextEncoding};
//! use std::time::Duration;
//!
//! let mut builder = EscPosBuilder::with_encoding(48, TextEncoding::Latin1);
//! builder.center();
//! builder.double_size();
//! builder.line("Order #1042");
//! builder.reset_size();
//! builder.sep_double();
//! builder.cut();
//!
//! let printer = NetworkPrinter::new("192.168.1.100", 9100)?;
//! printer.connect(Duration::from_secs(15)).await?;
//! printer.send(&builder.build(), Duration::from_secs(30)).await?;
//! ```

mod encoding;
mod error;
mod escpos;
mod printer;

// Re-exports
pub use encoding::{TextEncoding, encode_payload, pad_to_width, text_width, truncate_to_width};
pub use error::{PrintError, PrintResult};
pub use escpos::EscPosBuilder;
pub use printer::{ConnectionStatus, NetworkPrinter};
