//! Environment-backed configuration source

use async_trait::async_trait;
use parking_lot::RwLock;
use shared::PrinterConfig;
use tokio::sync::watch;

use super::ConfigSource;
use crate::core::RelayConfig;

/// [`ConfigSource`] over a [`RelayConfig`]
///
/// The polling interval is published through a watch channel so the running
/// scheduler picks up changes without restarting.
pub struct EnvConfigSource {
    config: RwLock<RelayConfig>,
    interval_tx: watch::Sender<u64>,
}

impl EnvConfigSource {
    pub fn new(config: RelayConfig) -> Self {
        let (interval_tx, _) = watch::channel(config.poll_interval_secs);
        Self {
            config: RwLock::new(config),
            interval_tx,
        }
    }

    /// Current configuration snapshot
    pub fn snapshot(&self) -> RelayConfig {
        self.config.read().clone()
    }

    /// Replace the configuration
    ///
    /// Returns `true` when the change needs a hard scheduler restart.
    /// Interval changes are always pushed to watchers.
    pub fn apply(&self, next: RelayConfig) -> bool {
        let (restart, interval) = {
            let mut current = self.config.write();
            let restart = current.requires_restart(&next);
            let interval = next.poll_interval_secs;
            *current = next;
            (restart, interval)
        };

        self.interval_tx.send_if_modified(|value| {
            if *value != interval {
                tracing::info!(from = *value, to = interval, "Polling interval changed");
                *value = interval;
                true
            } else {
                false
            }
        });

        restart
    }

    /// Push a new polling interval only
    pub fn set_polling_interval(&self, secs: u64) {
        let mut next = self.snapshot();
        next.poll_interval_secs = secs;
        self.apply(next);
    }
}

#[async_trait]
impl ConfigSource for EnvConfigSource {
    fn polling_interval(&self) -> watch::Receiver<u64> {
        self.interval_tx.subscribe()
    }

    async fn credentials_valid(&self) -> bool {
        self.config.read().credentials_valid()
    }

    async fn auto_print_enabled(&self) -> bool {
        self.config.read().auto_print
    }

    async fn printer_config(&self) -> Option<PrinterConfig> {
        self.config.read().printer_config()
    }
}
