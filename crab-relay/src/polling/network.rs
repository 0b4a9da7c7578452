//! Network heartbeat
//!
//! - transport probe every `check_interval` (plus optional external check)
//! - unavailable → available while steady polling: one out-of-band poll
//! - more than `max_retry` consecutive failures: exactly one issue
//!   notification until connectivity comes back

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::RelayEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{PollPhase, PollingScheduler};
use crate::core::EventBus;
use crate::sources::NotificationSink;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connectivity probe
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Reachability of the underlying transport
    async fn transport_available(&self) -> bool;

    /// Optional lightweight external check
    async fn external_reachable(&self) -> bool {
        true
    }
}

/// TCP connect to the backend host, then `HEAD` of the backend URL
pub struct TcpConnectivityProbe {
    target: Option<(String, u16)>,
    url: Option<String>,
    client: reqwest::Client,
}

impl TcpConnectivityProbe {
    pub fn new(backend_url: &str, external_check: bool) -> Self {
        let parsed = reqwest::Url::parse(backend_url).ok();
        let target = parsed.as_ref().and_then(|url| {
            let host = url.host_str()?.to_string();
            let port = url.port_or_known_default()?;
            Some((host, port))
        });
        if target.is_none() {
            tracing::warn!(url = %backend_url, "Backend URL unusable for connectivity probe");
        }

        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            target,
            url: external_check.then(|| backend_url.to_string()),
            client,
        }
    }
}

#[async_trait]
impl ConnectivityProbe for TcpConnectivityProbe {
    async fn transport_available(&self) -> bool {
        let Some((host, port)) = &self.target else {
            return false;
        };
        let connect = tokio::net::TcpStream::connect((host.as_str(), *port));
        matches!(
            tokio::time::timeout(PROBE_TIMEOUT, connect).await,
            Ok(Ok(_))
        )
    }

    async fn external_reachable(&self) -> bool {
        let Some(url) = &self.url else {
            return true;
        };
        // Any HTTP answer, even 4xx, proves reachability
        self.client.head(url).send().await.is_ok()
    }
}

#[derive(Debug)]
struct MonitorState {
    consecutive_failures: u32,
    was_available: bool,
    issue_notified: bool,
}

pub struct NetworkMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    scheduler: Arc<PollingScheduler>,
    notifier: Arc<dyn NotificationSink>,
    bus: EventBus,
    max_retry: u32,
    state: Mutex<MonitorState>,
}

impl NetworkMonitor {
    pub fn new(
        probe: Arc<dyn ConnectivityProbe>,
        scheduler: Arc<PollingScheduler>,
        notifier: Arc<dyn NotificationSink>,
        bus: EventBus,
        max_retry: u32,
    ) -> Self {
        Self {
            probe,
            scheduler,
            notifier,
            bus,
            max_retry,
            state: Mutex::new(MonitorState {
                consecutive_failures: 0,
                was_available: true,
                issue_notified: false,
            }),
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Probe once and react; returns current availability
    pub async fn check_once(&self) -> bool {
        let available = tokio::time::timeout(PROBE_TIMEOUT, async {
            self.probe.transport_available().await && self.probe.external_reachable().await
        })
        .await
        .unwrap_or(false);

        let (changed, recovered, notify_issue, failures) = {
            let mut state = self.state.lock();
            let changed = state.was_available != available;
            state.was_available = available;

            if available {
                state.consecutive_failures = 0;
                state.issue_notified = false;
                (changed, changed, false, 0)
            } else {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                let notify = state.consecutive_failures > self.max_retry && !state.issue_notified;
                if notify {
                    state.issue_notified = true;
                }
                (changed, false, notify, state.consecutive_failures)
            }
        };

        if changed {
            tracing::info!(available, "Network availability changed");
            self.bus.publish(RelayEvent::NetworkChanged { available });
        }

        if !available {
            tracing::debug!(failures, max_retry = self.max_retry, "Network check failed");
        }

        if notify_issue {
            self.notifier.notify_issue(&format!(
                "Network unavailable: {} consecutive checks failed, orders may be delayed",
                failures
            ));
        }

        if recovered
            && self.scheduler.is_active()
            && self.scheduler.phase() == PollPhase::SteadyPoll
        {
            self.scheduler.poll_now("network recovered");
        }

        available
    }

    pub async fn run(self, check_interval: Duration, shutdown: CancellationToken) {
        tracing::info!(check_secs = check_interval.as_secs(), "Network monitor started");
        let mut ticker = tokio::time::interval(check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.check_once().await;
                }
            }
        }
        tracing::info!("Network monitor stopped");
    }
}
