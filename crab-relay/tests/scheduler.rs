mod common;

use common::{ConnectMode, FakeOrders, Harness, order_created_ago, wait_until};
use crab_relay::polling::PollPhase;
use shared::RelayEvent;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn gap(times: &[tokio::time::Instant], i: usize) -> Duration {
    times[i + 1].duration_since(times[i])
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_applies_to_next_sleep() {
    let h = Harness::new(FakeOrders::default(), ConnectMode::Succeed);
    let scheduler = h.scheduler();
    let shutdown = CancellationToken::new();
    tokio::spawn(scheduler.clone().watch_interval(shutdown.clone()));

    scheduler.start().await;
    wait_until(Duration::from_secs(5), || scheduler.cycle_count() == 1).await;
    assert_eq!(scheduler.phase(), PollPhase::SteadyPoll);

    // Loop is sleeping its 60s steady interval; push 20s
    h.config.set_interval(20);
    wait_until(Duration::from_secs(200), || h.orders.fetch_count() >= 3).await;

    let times = h.orders.fetch_times();
    let first = gap(&times, 0);
    let second = gap(&times, 1);
    assert!(first >= Duration::from_secs(60) && first < Duration::from_secs(61), "{first:?}");
    assert!(second >= Duration::from_secs(20) && second < Duration::from_secs(21), "{second:?}");
    assert_eq!(scheduler.current_interval(), Duration::from_secs(20));

    scheduler.stop().await;
    shutdown.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_fast_poll_until_first_successful_cycle() {
    let h = Harness::new(FakeOrders::default(), ConnectMode::Succeed);
    h.config.credentials.store(false, Ordering::SeqCst);
    let scheduler = h.scheduler();

    scheduler.start().await;
    wait_until(Duration::from_secs(60), || {
        h.config.credential_checks.lock().len() >= 3
    })
    .await;

    // Invalid credentials: cycles skipped, no fetch, still fast polling
    assert_eq!(h.orders.fetch_count(), 0);
    assert_eq!(scheduler.phase(), PollPhase::FastPoll);
    let checks = h.config.credential_checks.lock().clone();
    assert!(gap(&checks, 0) >= Duration::from_secs(10) && gap(&checks, 0) < Duration::from_secs(11));

    h.config.credentials.store(true, Ordering::SeqCst);
    wait_until(Duration::from_secs(15), || scheduler.phase() == PollPhase::SteadyPoll).await;
    assert_eq!(h.orders.fetch_count(), 1);

    // Stays steady across restarts
    scheduler.restart("test").await;
    assert_eq!(scheduler.phase(), PollPhase::SteadyPoll);

    scheduler.reset_fast_poll();
    assert_eq!(scheduler.phase(), PollPhase::FastPoll);

    scheduler.stop().await;
    assert_eq!(scheduler.phase(), PollPhase::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_failure_does_not_stop_loop() {
    let h = Harness::new(FakeOrders::default(), ConnectMode::Succeed);
    h.orders.fail_fetch.store(true, Ordering::SeqCst);
    let scheduler = h.scheduler();

    scheduler.start().await;
    wait_until(Duration::from_secs(60), || h.orders.fetch_count() >= 3).await;

    assert!(scheduler.is_alive());
    assert_eq!(scheduler.cursor(), None);
    assert_eq!(scheduler.phase(), PollPhase::FastPoll);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_cursor_advances_and_never_regresses() {
    let orders = FakeOrders::with_remote(vec![order_created_ago("1", Duration::from_secs(5))]);
    let h = Harness::new(orders, ConnectMode::Succeed);
    let scheduler = h.scheduler();

    scheduler.start().await;
    wait_until(Duration::from_secs(200), || h.orders.fetch_count() >= 3).await;
    scheduler.stop().await;

    let cursors: Vec<Option<i64>> = h.orders.fetches.lock().iter().map(|(_, c)| *c).collect();
    assert_eq!(cursors[0], None);
    assert!(cursors[1].is_some());
    assert!(cursors.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(h.link.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_print_holds_cursor_and_retries() {
    let order = order_created_ago("1", Duration::from_secs(5));
    let created_at = order.created_at;
    let h = Harness::new(FakeOrders::with_remote(vec![order]), ConnectMode::Fail);
    let scheduler = h.scheduler();

    scheduler.start().await;
    wait_until(Duration::from_secs(5), || h.orders.fetch_count() == 1).await;
    wait_until(Duration::from_secs(5), || scheduler.cursor().is_some()).await;
    assert!(scheduler.cursor().unwrap() < created_at);

    h.link.set_mode(ConnectMode::Succeed);
    wait_until(Duration::from_secs(120), || h.link.sent_count() == 1).await;
    assert!(h.orders.local("1").unwrap().printed);
    assert_eq!(h.sink.new_order_ids(), vec!["1".to_string()]);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_poll_now_runs_out_of_band_cycle() {
    let h = Harness::new(FakeOrders::default(), ConnectMode::Succeed);
    let scheduler = h.scheduler();
    let mut events = h.bus.subscribe();

    scheduler.start().await;
    wait_until(Duration::from_secs(5), || h.orders.fetch_count() == 1).await;
    let before = tokio::time::Instant::now();

    scheduler.poll_now("manual refresh");
    wait_until(Duration::from_secs(5), || h.orders.fetch_count() == 2).await;
    assert!(before.elapsed() < Duration::from_secs(5));

    let mut refreshed = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, RelayEvent::RefreshRequested { .. }) {
            refreshed = true;
        }
    }
    assert!(refreshed);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_restarts_leave_single_loop() {
    let h = Harness::new(FakeOrders::default(), ConnectMode::Succeed);
    let scheduler = h.scheduler();
    scheduler.start().await;

    let a = {
        let s = scheduler.clone();
        tokio::spawn(async move { s.restart("watchdog").await })
    };
    let b = {
        let s = scheduler.clone();
        tokio::spawn(async move { s.restart("config").await })
    };
    a.await.unwrap();
    b.await.unwrap();
    scheduler.start().await;

    assert_eq!(scheduler.restart_count(), 2);
    assert!(scheduler.is_alive());

    // Let the fresh loop finish its immediate cycle; then one fetch per interval
    tokio::time::sleep(Duration::from_secs(1)).await;
    let base = h.orders.fetch_count();
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.orders.fetch_count() - base, 1);

    scheduler.stop().await;
    assert!(!scheduler.is_alive());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_held_while_running() {
    let h = Harness::new(FakeOrders::default(), ConnectMode::Succeed);
    let scheduler = h.scheduler();

    scheduler.start().await;
    wait_until(Duration::from_secs(5), || h.orders.fetch_count() == 1).await;
    assert_eq!(h.keepalive.holds.load(Ordering::SeqCst), 1);
    assert_eq!(h.keepalive.unholds.load(Ordering::SeqCst), 0);

    scheduler.stop().await;
    assert_eq!(h.keepalive.unholds.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_foreground_multiplier() {
    let h = Harness::new(FakeOrders::default(), ConnectMode::Succeed);
    let scheduler = h.scheduler();
    scheduler.start().await;
    wait_until(Duration::from_secs(5), || scheduler.cycle_count() == 1).await;

    assert_eq!(scheduler.effective_interval(), Duration::from_secs(60));
    scheduler.set_foreground(true);
    assert_eq!(scheduler.effective_interval(), Duration::from_secs(30));

    let status = scheduler.status();
    assert!(status.active);
    assert_eq!(status.phase, PollPhase::SteadyPoll);
    assert_eq!(status.cycles, 1);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_keeps_cursor_and_loop() {
    let h = Harness::new(FakeOrders::default(), ConnectMode::Succeed);
    let scheduler = h.scheduler();

    scheduler.start().await;
    wait_until(Duration::from_secs(5), || scheduler.cycle_count() == 1).await;
    let cursor = scheduler.cursor();
    assert!(cursor.is_some());

    h.orders.hang_fetch.store(true, Ordering::SeqCst);
    scheduler.poll_now("test");
    wait_until(Duration::from_secs(5), || h.orders.fetch_count() == 2).await;
    let started = tokio::time::Instant::now();

    // Fetch abandoned after the 30s timeout, cycle ends as a failure
    wait_until(Duration::from_secs(40), || scheduler.cycle_count() == 2).await;
    assert!(started.elapsed() >= Duration::from_secs(29));
    assert_eq!(scheduler.cursor(), cursor);
    assert!(scheduler.is_alive());
    assert_eq!(scheduler.phase(), PollPhase::SteadyPoll);

    h.orders.hang_fetch.store(false, Ordering::SeqCst);
    wait_until(Duration::from_secs(70), || scheduler.cycle_count() == 3).await;
    let used: Vec<Option<i64>> = h.orders.fetches.lock().iter().map(|(_, c)| *c).collect();
    assert_eq!(used[1], cursor);
    assert_eq!(used[2], cursor);
    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_fetch_timeout_change_applies_next_cycle() {
    let h = Harness::new(FakeOrders::default(), ConnectMode::Succeed);
    h.orders.hang_fetch.store(true, Ordering::SeqCst);
    let scheduler = h.scheduler();
    scheduler.set_fetch_timeout(Duration::from_secs(5));
    assert_eq!(scheduler.expected_cycle_span(), Duration::from_secs(65));

    scheduler.start().await;
    wait_until(Duration::from_secs(10), || scheduler.cycle_count() == 1).await;
    assert_eq!(scheduler.cursor(), None);
    scheduler.stop().await;
}
