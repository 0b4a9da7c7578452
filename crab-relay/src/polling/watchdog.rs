//! Scheduler watchdog
//!
//! Every `check_interval` it looks at how long the polling loop has been
//! silent and whether its task is still alive. Either failure triggers one
//! restart through the scheduler's serialized restart path; the restart
//! resets the activity mark, so a single stall never causes two restarts.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::PollingScheduler;
use crate::core::RelayError;

pub struct Watchdog {
    scheduler: Arc<PollingScheduler>,
    check_interval: Duration,
    stall_threshold: Duration,
}

impl Watchdog {
    pub fn new(
        scheduler: Arc<PollingScheduler>,
        check_interval: Duration,
        stall_threshold: Duration,
    ) -> Self {
        Self {
            scheduler,
            check_interval,
            stall_threshold,
        }
    }

    /// Threshold actually applied: a long polling interval is not a stall
    fn threshold(&self) -> Duration {
        self.stall_threshold
            .max(self.scheduler.expected_cycle_span())
    }

    /// Run one check; returns `true` if a restart was triggered
    pub async fn check_once(&self) -> bool {
        if !self.scheduler.is_active() {
            return false;
        }

        let idle = self.scheduler.last_activity().elapsed();
        let alive = self.scheduler.is_alive();
        let threshold = self.threshold();

        let stall = if !alive {
            Some(RelayError::StallDetected("polling task is not running".into()))
        } else if idle > threshold {
            Some(RelayError::StallDetected(format!(
                "no activity for {}s (threshold {}s)",
                idle.as_secs(),
                threshold.as_secs()
            )))
        } else {
            None
        };

        match stall {
            Some(e) => {
                tracing::error!(error = %e, "Watchdog detected stalled scheduler");
                self.scheduler.restart(&e.to_string()).await;
                true
            }
            None => {
                tracing::trace!(idle_secs = idle.as_secs(), "Watchdog check ok");
                false
            }
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            check_secs = self.check_interval.as_secs(),
            stall_secs = self.stall_threshold.as_secs(),
            "Watchdog started"
        );
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // skip immediate tick

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }
        tracing::info!("Watchdog stopped");
    }
}
