mod common;

use common::{ConnectMode, FakeOrders, Harness, SendMode, order_created_ago, printer_config};
use crab_relay::RelayError;
use crab_relay::printing::{DispatchOutcome, SkipReason};
use shared::{OrderStatus, PrinterConnectionState};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn harness_with_order(mode: ConnectMode) -> (Harness, shared::Order) {
    let order = order_created_ago("1", Duration::from_secs(30));
    let h = Harness::new(FakeOrders::with_remote(vec![order.clone()]), mode);
    h.orders.local.lock().insert(order.id.clone(), order.clone());
    (h, order)
}

#[tokio::test]
async fn test_dispatch_twice_sends_once() {
    let (h, order) = harness_with_order(ConnectMode::Succeed);
    let printer = printer_config();

    let first = h.dispatcher.dispatch(&order, &printer).await.unwrap();
    // Same stale copy: printed flag still false
    let second = h.dispatcher.dispatch(&order, &printer).await.unwrap();

    assert_eq!(first, DispatchOutcome::Printed);
    assert_eq!(second, DispatchOutcome::Skipped(SkipReason::AlreadyPrinted));
    assert_eq!(h.link.sent_count(), 1);
    assert!(h.orders.local("1").unwrap().printed);
    assert_eq!(h.dispatcher.connection_state(), PrinterConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_connect_timeout_then_later_success() {
    let (h, order) = harness_with_order(ConnectMode::Hang);
    let printer = printer_config();

    let err = h.dispatcher.dispatch(&order, &printer).await.unwrap_err();
    assert!(matches!(err, RelayError::PrinterUnreachable(_)));
    assert!(err.is_transient());
    assert_eq!(h.dispatcher.connection_state(), PrinterConnectionState::Error);
    assert_eq!(h.link.sent_count(), 0);
    assert!(!h.orders.local("1").unwrap().printed);

    // Printer comes back
    h.link.set_mode(ConnectMode::Succeed);
    let outcome = h.dispatcher.dispatch(&order, &printer).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Printed);

    let outcome = h.dispatcher.dispatch(&order, &printer).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::AlreadyPrinted));
    assert_eq!(h.link.sent_count(), 1);
    assert_eq!(h.orders.mark_printed_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connect_failure_leaves_order_unprinted() {
    let (h, order) = harness_with_order(ConnectMode::Fail);

    let err = h
        .dispatcher
        .dispatch(&order, &printer_config())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::PrinterUnreachable(_)));
    assert_eq!(h.link.connects.load(Ordering::SeqCst), 1);
    assert!(!h.orders.local("1").unwrap().printed);
}

#[tokio::test]
async fn test_send_failure_is_print_failed() {
    let (h, order) = harness_with_order(ConnectMode::Succeed);
    h.link.set_send_mode(SendMode::Fail);

    let err = h
        .dispatcher
        .dispatch(&order, &printer_config())
        .await
        .unwrap_err();

    assert!(matches!(err, RelayError::PrintFailed(_)));
    assert_eq!(h.orders.mark_printed_calls.load(Ordering::SeqCst), 0);
    assert!(!h.orders.local("1").unwrap().printed);
}

#[tokio::test]
async fn test_manual_print_detected_before_send() {
    let (h, order) = harness_with_order(ConnectMode::Succeed);
    // Printed on another device after the fetch
    h.orders.set_printed("1");

    let outcome = h.dispatcher.dispatch(&order, &printer_config()).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::AlreadyPrinted));
    assert_eq!(h.link.sent_count(), 0);
}

#[tokio::test]
async fn test_preconditions_short_circuit() {
    let (h, order) = harness_with_order(ConnectMode::Succeed);
    let printer = printer_config();

    let mut cancelled = order.clone();
    cancelled.status = OrderStatus::Cancelled;
    assert_eq!(
        h.dispatcher.dispatch(&cancelled, &printer).await.unwrap(),
        DispatchOutcome::Skipped(SkipReason::NotActionable)
    );

    let mut no_auto = printer.clone();
    no_auto.auto_print_enabled = false;
    assert_eq!(
        h.dispatcher.dispatch(&order, &no_auto).await.unwrap(),
        DispatchOutcome::Skipped(SkipReason::AutoPrintDisabled)
    );

    h.config.auto_print.store(false, Ordering::SeqCst);
    assert_eq!(
        h.dispatcher.dispatch(&order, &printer).await.unwrap(),
        DispatchOutcome::Skipped(SkipReason::AutoPrintDisabled)
    );

    // Nothing touched the printer
    assert_eq!(h.link.connects.load(Ordering::SeqCst), 0);
    assert_eq!(h.link.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_timeout_leaves_order_unprinted() {
    let (h, order) = harness_with_order(ConnectMode::Succeed);
    h.link.set_send_mode(SendMode::Hang);
    let printer = printer_config();

    let err = h.dispatcher.dispatch(&order, &printer).await.unwrap_err();

    assert!(matches!(err, RelayError::PrintTimeout(_)));
    assert!(err.is_transient());
    assert_eq!(h.dispatcher.connection_state(), PrinterConnectionState::Error);
    assert_eq!(h.orders.mark_printed_calls.load(Ordering::SeqCst), 0);
    assert!(!h.orders.local("1").unwrap().printed);
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_can_be_changed_at_runtime() {
    let (h, order) = harness_with_order(ConnectMode::Hang);
    h.dispatcher
        .set_timeouts(Duration::from_secs(2), Duration::from_secs(5));

    let started = tokio::time::Instant::now();
    let err = h.dispatcher.dispatch(&order, &printer_config()).await.unwrap_err();

    assert!(matches!(err, RelayError::PrinterUnreachable(_)));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3), "{elapsed:?}");
}
