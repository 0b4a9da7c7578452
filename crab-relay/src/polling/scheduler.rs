//! Polling scheduler
//!
//! Runs exactly one polling loop at a time:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ effective interval ─► credentials? ─► fetch(cursor, timeout) │
//! │        ▲                    │(no)            │               │
//! │        │                    ▼                ▼               │
//! │   sleep(interval − elapsed) ◄──────── process + advance cursor│
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Start / stop / restart are serialized behind one async mutex so the
//! watchdog and a config reload can never leave two loops running. A restart
//! marks the loop inactive, waits a bounded time for it to exit, aborts it
//! otherwise, then spawns a fresh loop.

use futures::FutureExt;
use parking_lot::Mutex;
use shared::RelayEvent;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{Deduplicator, OrderProcessor, PollPhase, PollingIntervalPolicy, ResourceGuard};
use crate::core::tasks::panic_message;
use crate::core::{EventBus, RelayError};
use crate::sources::{ConfigSource, OrderSource};

/// Default wait for a loop to observe a stop request before it is aborted
const DEFAULT_RESTART_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub policy: PollingIntervalPolicy,
    pub fetch_timeout: Duration,
    pub restart_grace: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            policy: PollingIntervalPolicy::default(),
            fetch_timeout: Duration::from_secs(30),
            restart_grace: DEFAULT_RESTART_GRACE,
        }
    }
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStatus {
    pub phase: PollPhase,
    pub active: bool,
    pub alive: bool,
    pub cursor: Option<i64>,
    pub interval: Duration,
    pub idle_for: Duration,
    pub restarts: u64,
    pub cycles: u64,
}

/// How a single cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Completed,
    ConfigInvalid,
    FetchFailed,
}

/// State shared between the scheduler handle and its loop task
struct Inner {
    config: Arc<dyn ConfigSource>,
    orders: Arc<dyn OrderSource>,
    processor: OrderProcessor,
    guard: Arc<ResourceGuard>,
    bus: EventBus,
    policy: Mutex<PollingIntervalPolicy>,
    fetch_timeout: Mutex<Duration>,

    /// Desired state: set by start, cleared by stop
    active: AtomicBool,
    fast_poll_done: AtomicBool,
    foreground: AtomicBool,
    current_interval: Mutex<Duration>,
    cursor: Mutex<Option<i64>>,
    last_activity: Mutex<Instant>,
    cycles: AtomicU64,
    wake: Notify,
}

struct LoopHandle {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct PollingScheduler {
    inner: Arc<Inner>,
    current: Mutex<Option<LoopHandle>>,
    restart_lock: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    restarts: AtomicU64,
    restart_grace: Duration,
}

impl PollingScheduler {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        orders: Arc<dyn OrderSource>,
        processor: OrderProcessor,
        guard: Arc<ResourceGuard>,
        bus: EventBus,
        options: SchedulerOptions,
    ) -> Arc<Self> {
        let initial = Duration::from_secs(*config.polling_interval().borrow());
        let initial = if initial.is_zero() {
            options.policy.base
        } else {
            initial
        };

        Arc::new(Self {
            inner: Arc::new(Inner {
                config,
                orders,
                processor,
                guard,
                bus,
                policy: Mutex::new(options.policy),
                fetch_timeout: Mutex::new(options.fetch_timeout),
                active: AtomicBool::new(false),
                fast_poll_done: AtomicBool::new(false),
                foreground: AtomicBool::new(false),
                current_interval: Mutex::new(initial),
                cursor: Mutex::new(None),
                last_activity: Mutex::new(Instant::now()),
                cycles: AtomicU64::new(0),
                wake: Notify::new(),
            }),
            current: Mutex::new(None),
            restart_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            restart_grace: options.restart_grace,
        })
    }

    // ========== Lifecycle ==========

    /// Start the loop; no-op if one is already running
    pub async fn start(&self) {
        let _serial = self.restart_lock.lock().await;
        if self.is_alive() {
            tracing::debug!("Polling loop already running");
            return;
        }
        self.spawn_loop();
    }

    /// Stop the loop and wait (bounded) for it to exit
    pub async fn stop(&self) {
        let _serial = self.restart_lock.lock().await;
        self.stop_locked().await;
    }

    /// Force a fresh loop
    pub async fn restart(&self, reason: &str) {
        let _serial = self.restart_lock.lock().await;
        tracing::warn!(reason = %reason, "Restarting polling loop");
        self.stop_locked().await;
        self.inner.record_activity();
        self.spawn_loop();
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.inner.bus.publish(RelayEvent::SchedulerRestarted {
            reason: reason.to_string(),
        });
    }

    fn spawn_loop(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        self.inner.active.store(true, Ordering::SeqCst);
        self.inner.record_activity();

        let handle = tokio::spawn(run_loop(self.inner.clone(), generation, cancel.clone()));
        *self.current.lock() = Some(LoopHandle {
            generation,
            cancel,
            handle,
        });
        tracing::info!(generation, "Polling loop started");
    }

    async fn stop_locked(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        let current = self.current.lock().take();
        let Some(LoopHandle {
            generation,
            cancel,
            mut handle,
        }) = current
        else {
            return;
        };

        cancel.cancel();
        self.inner.wake.notify_waiters();

        if tokio::time::timeout(self.restart_grace, &mut handle)
            .await
            .is_err()
        {
            tracing::warn!(generation, grace = ?self.restart_grace, "Polling loop did not exit in time, aborting");
            handle.abort();
            // Wait for the aborted task to drop its resource lease
            let _ = handle.await;
        }
        tracing::info!(generation, "Polling loop stopped");
    }

    // ========== Controls ==========

    /// Wake the loop for one out-of-band cycle (no restart)
    pub fn poll_now(&self, reason: &str) {
        if !self.is_active() {
            tracing::debug!(reason = %reason, "poll_now ignored, scheduler inactive");
            return;
        }
        tracing::info!(reason = %reason, "Out-of-band poll requested");
        self.inner.bus.publish(RelayEvent::RefreshRequested {
            reason: reason.to_string(),
        });
        self.inner.wake.notify_one();
    }

    /// Host foreground state (applies the foreground multiplier)
    pub fn set_foreground(&self, foreground: bool) {
        self.inner.foreground.store(foreground, Ordering::SeqCst);
    }

    /// Go back to fast polling until the next successful cycle
    pub fn reset_fast_poll(&self) {
        self.inner.fast_poll_done.store(false, Ordering::SeqCst);
    }

    /// Replace the interval policy; applies from the next sleep
    pub fn set_policy(&self, policy: PollingIntervalPolicy) {
        *self.inner.policy.lock() = policy;
    }

    /// Replace the fetch timeout; applies from the next cycle
    pub fn set_fetch_timeout(&self, timeout: Duration) {
        *self.inner.fetch_timeout.lock() = timeout;
    }

    /// Follow interval pushes from the config source until `shutdown`
    pub async fn watch_interval(self: Arc<Self>, shutdown: CancellationToken) {
        let mut rx = self.inner.config.polling_interval();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Interval channel closed");
                        break;
                    }
                    let secs = *rx.borrow_and_update();
                    if secs == 0 {
                        tracing::warn!("Ignoring zero polling interval");
                        continue;
                    }
                    *self.inner.current_interval.lock() = Duration::from_secs(secs);
                    tracing::info!(interval_secs = secs, "Polling interval updated");
                }
            }
        }
    }

    // ========== Observation ==========

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Whether the loop task exists and has not exited
    pub fn is_alive(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|current| !current.handle.is_finished())
    }

    pub fn phase(&self) -> PollPhase {
        self.inner.phase()
    }

    pub fn cursor(&self) -> Option<i64> {
        *self.inner.cursor.lock()
    }

    pub fn current_interval(&self) -> Duration {
        *self.inner.current_interval.lock()
    }

    /// Interval the next sleep will be computed from
    pub fn effective_interval(&self) -> Duration {
        self.inner.effective_interval()
    }

    /// Longest a healthy loop can go between two activity marks
    pub fn expected_cycle_span(&self) -> Duration {
        self.inner.effective_interval() + self.fetch_timeout()
    }

    pub fn last_activity(&self) -> Instant {
        *self.inner.last_activity.lock()
    }

    pub fn restart_count(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn cycle_count(&self) -> u64 {
        self.inner.cycles.load(Ordering::SeqCst)
    }

    pub fn dedup(&self) -> &Arc<Deduplicator> {
        self.inner.processor.dedup()
    }

    pub fn processor(&self) -> &OrderProcessor {
        &self.inner.processor
    }

    pub fn guard(&self) -> &Arc<ResourceGuard> {
        &self.inner.guard
    }

    pub fn policy(&self) -> PollingIntervalPolicy {
        self.inner.policy.lock().clone()
    }

    pub fn fetch_timeout(&self) -> Duration {
        *self.inner.fetch_timeout.lock()
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            phase: self.phase(),
            active: self.is_active(),
            alive: self.is_alive(),
            cursor: self.cursor(),
            interval: self.effective_interval(),
            idle_for: self.last_activity().elapsed(),
            restarts: self.restart_count(),
            cycles: self.cycle_count(),
        }
    }
}

impl Inner {
    fn record_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn phase(&self) -> PollPhase {
        if !self.active.load(Ordering::SeqCst) {
            PollPhase::Stopped
        } else if self.fast_poll_done.load(Ordering::SeqCst) {
            PollPhase::SteadyPoll
        } else {
            PollPhase::FastPoll
        }
    }

    fn effective_interval(&self) -> Duration {
        let phase = match self.phase() {
            PollPhase::Stopped => PollPhase::SteadyPoll,
            phase => phase,
        };
        let current = *self.current_interval.lock();
        self.policy
            .lock()
            .effective(phase, current, self.foreground.load(Ordering::SeqCst))
    }

    /// One poll cycle; every failure is absorbed here
    async fn run_cycle(&self) -> CycleOutcome {
        if !self.config.credentials_valid().await {
            let e = RelayError::ConfigInvalid("backend credentials missing".into());
            tracing::warn!(error = %e, "Skipping poll cycle");
            return CycleOutcome::ConfigInvalid;
        }

        let poll_started = shared::util::now_millis();
        let cursor = *self.cursor.lock();

        let fetch = self.orders.fetch_actionable_since(cursor);
        let fetch_timeout = *self.fetch_timeout.lock();
        let fetched = match tokio::time::timeout(fetch_timeout, fetch).await {
            Ok(Ok(orders)) => orders,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Order fetch failed");
                return CycleOutcome::FetchFailed;
            }
            Err(_) => {
                let e = RelayError::Fetch(format!("timed out after {:?}", fetch_timeout));
                tracing::warn!(error = %e, "Order fetch failed");
                return CycleOutcome::FetchFailed;
            }
        };

        let fetched_count = fetched.len();
        let report = self.processor.process(fetched, cursor.is_none()).await;

        // Hold the cursor just before the earliest failed order so the next
        // fetch includes it again
        let next = match report.earliest_failed_at {
            Some(failed_at) => poll_started.min(failed_at - 1000),
            None => poll_started,
        };
        {
            let mut guard = self.cursor.lock();
            *guard = Some(guard.map_or(next, |prev| prev.max(next)));
        }

        tracing::debug!(
            fetched = fetched_count,
            new = report.new_orders,
            printed = report.printed,
            failed = report.failed,
            stale = report.stale_skipped,
            "Poll cycle completed"
        );
        CycleOutcome::Completed
    }
}

async fn run_loop(inner: Arc<Inner>, generation: u64, cancel: CancellationToken) {
    let lease = inner.guard.lease();

    loop {
        if cancel.is_cancelled() || !inner.active.load(Ordering::SeqCst) {
            break;
        }
        lease.refresh();
        inner.record_activity();
        let started = Instant::now();

        match AssertUnwindSafe(inner.run_cycle()).catch_unwind().await {
            Ok(CycleOutcome::Completed) => {
                if !inner.fast_poll_done.swap(true, Ordering::SeqCst) {
                    tracing::info!(generation, "First cycle completed, switching to steady polling");
                }
            }
            Ok(CycleOutcome::ConfigInvalid | CycleOutcome::FetchFailed) => {}
            Err(panic) => {
                tracing::error!(
                    generation,
                    panic = %panic_message(panic.as_ref()),
                    "Poll cycle panicked, treating as empty"
                );
            }
        }

        inner.cycles.fetch_add(1, Ordering::SeqCst);
        inner.record_activity();

        let interval = inner.effective_interval();
        let wait = interval.saturating_sub(started.elapsed());
        tracing::trace!(generation, wait_ms = wait.as_millis() as u64, "Sleeping until next cycle");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
            _ = inner.wake.notified() => {
                tracing::debug!(generation, "Woken for out-of-band poll");
            }
        }
    }

    tracing::debug!(generation, "Polling loop exited");
}
