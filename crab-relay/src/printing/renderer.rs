//! Customer receipt renderer
//!
//! Renders an [`Order`] into ESC/POS bytes for thermal printers.

use chrono_tz::Tz;
use crab_printer::{EscPosBuilder, TextEncoding};
use shared::{Order, PrinterConfig};

/// Render an order to a printable payload
pub trait Templating: Send + Sync {
    fn render(&self, order: &Order, config: &PrinterConfig) -> Vec<u8>;
}

/// Receipt renderer
///
/// Layout: order number, timestamp, customer, line items with options,
/// totals, customer note, then feed + cut.
pub struct ReceiptRenderer {
    timezone: Tz,
}

impl ReceiptRenderer {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Parse an IANA timezone name, falling back to UTC
    pub fn from_timezone_name(name: &str) -> Self {
        let timezone = name.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(timezone = %name, "Unknown timezone, using UTC");
            Tz::UTC
        });
        Self::new(timezone)
    }

    fn render_header(&self, b: &mut EscPosBuilder, order: &Order) {
        b.center();
        b.double_size();
        b.bold();
        b.line(&format!("#{}", order.number));
        b.reset_size();
        b.bold_off();

        if let Some(dt) = chrono::DateTime::from_timestamp_millis(order.created_at) {
            let local = dt.with_timezone(&self.timezone);
            b.line(&local.format("%Y-%m-%d %H:%M").to_string());
        }
        b.left();
        b.sep_double();

        let content = &order.content;
        if let Some(name) = &content.customer_name {
            b.line(name);
        }
        if let Some(shipping) = &content.shipping_method {
            b.line_lr("Shipping", shipping);
        }
        if let Some(payment) = &content.payment_method {
            b.line_lr("Payment", payment);
        }
        if content.customer_name.is_some()
            || content.shipping_method.is_some()
            || content.payment_method.is_some()
        {
            b.sep_single();
        }
    }

    fn render_lines(&self, b: &mut EscPosBuilder, order: &Order) {
        for line in &order.content.lines {
            b.bold();
            b.line_lr(&format!("{} x {}", line.quantity, line.name), &line.total);
            b.bold_off();
            for option in &line.options {
                b.line_wrapped(&format!("  - {}", option), 4);
            }
        }
    }

    fn render_footer(&self, b: &mut EscPosBuilder, order: &Order) {
        let content = &order.content;
        b.sep_single();
        b.bold();
        b.double_height();
        let total = format!("{} {}", content.total, content.currency);
        b.line_lr("TOTAL", total.trim());
        b.reset_size();
        b.bold_off();

        if let Some(note) = &content.customer_note {
            b.sep_single();
            b.bold();
            b.line("Note:");
            b.bold_off();
            b.line_wrapped(note, 0);
        }

        b.cut_feed(3);
    }
}

impl Templating for ReceiptRenderer {
    fn render(&self, order: &Order, config: &PrinterConfig) -> Vec<u8> {
        let encoding = config.encoding.parse::<TextEncoding>().unwrap_or_else(|e| {
            tracing::warn!(printer = %config.name, "{}, falling back to utf8", e);
            TextEncoding::Utf8
        });

        let mut b = EscPosBuilder::with_encoding(config.paper_width, encoding);
        self.render_header(&mut b, order);
        self.render_lines(&mut b, order);
        self.render_footer(&mut b, order);
        b.build()
    }
}
