//! Print dispatcher
//!
//! Decides whether an order should print, owns the printer connection state
//! and performs the send.
//!
//! ```text
//! actionable? ─► not printed? ─► auto-print on? ─► connected? ──(no)─► connect (timeout)
//!                                                      │                   │
//!                                                      ▼                   ▼
//!                               render ─► printed recheck ─► send (timeout) ─► mark_printed ─► verify
//! ```
//!
//! Every failure leaves the order unprinted; the next poll cycle that
//! includes it tries again. There is no retry inside a cycle.

use shared::{Order, PrinterConfig, PrinterConnectionState};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::{PrinterLink, Templating};
use crate::core::{RelayError, RelayResult};
use crate::sources::{ConfigSource, OrderSource};

/// Why an order was not printed (not an error)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotActionable,
    AlreadyPrinted,
    AutoPrintDisabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotActionable => write!(f, "not actionable"),
            SkipReason::AlreadyPrinted => write!(f, "already printed"),
            SkipReason::AutoPrintDisabled => write!(f, "auto-print disabled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Printed,
    Skipped(SkipReason),
}

/// Printer connect / send deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintTimeouts {
    pub connect: Duration,
    pub send: Duration,
}

impl Default for PrintTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            send: Duration::from_secs(30),
        }
    }
}

/// Print dispatcher
pub struct PrintDispatcher {
    config: Arc<dyn ConfigSource>,
    orders: Arc<dyn OrderSource>,
    link: Arc<dyn PrinterLink>,
    templating: Arc<dyn Templating>,
    timeouts: parking_lot::RwLock<PrintTimeouts>,
    state: parking_lot::Mutex<PrinterConnectionState>,
}

impl PrintDispatcher {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        orders: Arc<dyn OrderSource>,
        link: Arc<dyn PrinterLink>,
        templating: Arc<dyn Templating>,
    ) -> Self {
        Self {
            config,
            orders,
            link,
            templating,
            timeouts: parking_lot::RwLock::new(PrintTimeouts::default()),
            state: parking_lot::Mutex::new(PrinterConnectionState::Disconnected),
        }
    }

    pub fn with_timeouts(self, connect: Duration, send: Duration) -> Self {
        self.set_timeouts(connect, send);
        self
    }

    /// Replace the timeouts; applies from the next connect / send
    pub fn set_timeouts(&self, connect: Duration, send: Duration) {
        *self.timeouts.write() = PrintTimeouts { connect, send };
    }

    pub fn timeouts(&self) -> PrintTimeouts {
        *self.timeouts.read()
    }

    /// Last observed connection state
    pub fn connection_state(&self) -> PrinterConnectionState {
        *self.state.lock()
    }

    fn set_state(&self, next: PrinterConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::debug!(from = %*state, to = %next, "Printer state changed");
            *state = next;
        }
    }

    /// Print one order
    ///
    /// `Ok(Skipped)` when a precondition does not hold, `Err` when printing
    /// was attempted and failed.
    pub async fn dispatch(
        &self,
        order: &Order,
        printer: &PrinterConfig,
    ) -> RelayResult<DispatchOutcome> {
        if !order.status.is_actionable() {
            return Ok(DispatchOutcome::Skipped(SkipReason::NotActionable));
        }
        if order.printed {
            return Ok(DispatchOutcome::Skipped(SkipReason::AlreadyPrinted));
        }
        if !self.config.auto_print_enabled().await || !printer.auto_print_enabled {
            return Ok(DispatchOutcome::Skipped(SkipReason::AutoPrintDisabled));
        }

        self.ensure_connected(printer).await?;

        let payload = self.templating.render(order, printer);

        // A manual print may have landed while we were connecting
        if let Some(local) = self.orders.get_by_id(&order.id).await?
            && local.printed
        {
            tracing::info!(order_id = %order.id, "Order printed elsewhere, skipping");
            return Ok(DispatchOutcome::Skipped(SkipReason::AlreadyPrinted));
        }

        self.send(order, &payload, printer).await?;

        match self.orders.mark_printed(&order.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(order_id = %order.id, "mark_printed: order not found in store")
            }
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Printed but failed to persist printed flag")
            }
        }

        match self.orders.get_by_id(&order.id).await {
            Ok(Some(local)) if local.printed => {}
            Ok(_) => tracing::warn!(order_id = %order.id, "Printed flag verification failed"),
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "Printed flag verification failed")
            }
        }

        tracing::info!(order_id = %order.id, number = %order.number, printer = %printer.name, "Receipt printed");
        Ok(DispatchOutcome::Printed)
    }

    async fn ensure_connected(&self, printer: &PrinterConfig) -> RelayResult<()> {
        let status = self.link.status(printer).await;
        if status == PrinterConnectionState::Connected {
            self.set_state(PrinterConnectionState::Connected);
            return Ok(());
        }

        self.set_state(PrinterConnectionState::Connecting);
        let timeout = self.timeouts().connect;
        let connect = self.link.connect(printer, timeout);
        match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(())) => {
                tracing::info!(printer = %printer.name, address = %printer.address, "Printer connected");
                self.set_state(PrinterConnectionState::Connected);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(PrinterConnectionState::Error);
                Err(RelayError::PrinterUnreachable(format!(
                    "{} ({}): {}",
                    printer.name, printer.address, e
                )))
            }
            Err(_) => {
                self.set_state(PrinterConnectionState::Error);
                Err(RelayError::PrinterUnreachable(format!(
                    "{} ({}): connect timed out after {:?}",
                    printer.name, printer.address, timeout
                )))
            }
        }
    }

    async fn send(&self, order: &Order, payload: &[u8], printer: &PrinterConfig) -> RelayResult<()> {
        let timeout = self.timeouts().send;
        let send = self.link.send(payload, printer, timeout);
        match tokio::time::timeout(timeout, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_timeout() => {
                self.set_state(PrinterConnectionState::Error);
                Err(RelayError::PrintTimeout(format!("order {}: {}", order.id, e)))
            }
            Ok(Err(e)) => {
                self.set_state(PrinterConnectionState::Error);
                Err(RelayError::PrintFailed(format!("order {}: {}", order.id, e)))
            }
            Err(_) => {
                self.set_state(PrinterConnectionState::Error);
                Err(RelayError::PrintTimeout(format!(
                    "order {}: send timed out after {:?}",
                    order.id, timeout
                )))
            }
        }
    }
}
