//! Relay service - 生命周期入口
//!
//! 组装调度器与监督任务，只暴露 `start` / `stop` / `restart` / `reload`。
//! 进程级的启停策略交给 systemd 等外部进程管理器。

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::{BackgroundTasks, EventBus, RelayConfig, TaskKind};
use crate::polling::{
    ConnectivityProbe, Deduplicator, KeepAlive, NetworkMonitor, OrderProcessor, PollingScheduler,
    ResourceGuard, SchedulerOptions, SchedulerStatus, Watchdog,
};
use crate::printing::{PrintDispatcher, PrinterLink, Templating};
use crate::sources::{EnvConfigSource, NotificationSink, OrderSource};

/// Cache cleanup cadence
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(600);
/// Grace period for background tasks on stop
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Collaborators wired into the engine
pub struct RelayComponents {
    pub config: Arc<EnvConfigSource>,
    pub orders: Arc<dyn OrderSource>,
    pub link: Arc<dyn PrinterLink>,
    pub templating: Arc<dyn Templating>,
    pub notifier: Arc<dyn NotificationSink>,
    pub probe: Arc<dyn ConnectivityProbe>,
    pub keepalive: Arc<dyn KeepAlive>,
}

pub struct RelayService {
    config: Arc<EnvConfigSource>,
    notifier: Arc<dyn NotificationSink>,
    probe: Arc<dyn ConnectivityProbe>,
    scheduler: Arc<PollingScheduler>,
    bus: EventBus,
    tasks: Option<BackgroundTasks>,
}

impl RelayService {
    pub fn new(components: RelayComponents, bus: EventBus) -> Self {
        let settings = components.config.snapshot();
        let config_source: Arc<dyn crate::sources::ConfigSource> = components.config.clone();

        let dispatcher = Arc::new(
            PrintDispatcher::new(
                config_source.clone(),
                components.orders.clone(),
                components.link,
                components.templating,
            )
            .with_timeouts(
                settings.print_connect_timeout(),
                settings.print_send_timeout(),
            ),
        );

        let dedup = Arc::new(Deduplicator::new(settings.dedup_capacity));
        let processor = OrderProcessor::new(
            config_source.clone(),
            components.orders.clone(),
            components.notifier.clone(),
            dispatcher,
            dedup,
            bus.clone(),
        )
        .with_recency_window(settings.recency_window());

        let guard = ResourceGuard::new(components.keepalive, settings.keepalive_timeout());
        let scheduler = PollingScheduler::new(
            config_source,
            components.orders,
            processor,
            guard,
            bus.clone(),
            SchedulerOptions {
                policy: settings.polling_policy(),
                fetch_timeout: settings.fetch_timeout(),
                ..Default::default()
            },
        );

        Self {
            config: components.config,
            notifier: components.notifier,
            probe: components.probe,
            scheduler,
            bus,
            tasks: None,
        }
    }

    pub fn scheduler(&self) -> &Arc<PollingScheduler> {
        &self.scheduler
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.is_some()
    }

    /// Start the polling loop and its supervisors
    pub async fn start(&mut self) {
        if self.tasks.is_some() {
            tracing::debug!("Relay service already running");
            return;
        }

        let settings = self.config.snapshot();
        let mut tasks = BackgroundTasks::new(CancellationToken::new());

        // Interval listener
        tasks.spawn(
            "interval_listener",
            TaskKind::Listener,
            self.scheduler.clone().watch_interval(tasks.shutdown_token()),
        );

        // Watchdog
        let watchdog = Watchdog::new(
            self.scheduler.clone(),
            Duration::from_secs(settings.watchdog_check_secs),
            Duration::from_secs(settings.watchdog_stall_secs),
        );
        tasks.spawn(
            "watchdog",
            TaskKind::Supervisor,
            watchdog.run(tasks.shutdown_token()),
        );

        // Network heartbeat
        let monitor = NetworkMonitor::new(
            self.probe.clone(),
            self.scheduler.clone(),
            self.notifier.clone(),
            self.bus.clone(),
            settings.network_max_retry,
        );
        tasks.spawn(
            "network_monitor",
            TaskKind::Monitor,
            monitor.run(
                Duration::from_secs(settings.network_check_secs),
                tasks.shutdown_token(),
            ),
        );

        // Processed-id cache TTL
        let dedup = self.scheduler.dedup().clone();
        let shutdown = tasks.shutdown_token();
        tasks.spawn("cache_cleanup", TaskKind::Periodic, async move {
            let mut ticker = tokio::time::interval(CACHE_CLEANUP_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = dedup.evict_expired();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = dedup.len(), "Evicted expired processed ids");
                        }
                    }
                }
            }
        });

        self.scheduler.start().await;
        tasks.log_summary();
        self.tasks = Some(tasks);
        tracing::info!("Relay service started");
    }

    /// Register an extra process-lifetime task (e.g. store cleanup)
    ///
    /// Returns `false` if the service is not running.
    pub fn spawn_task<F>(&mut self, name: &'static str, kind: TaskKind, future: F) -> bool
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match self.tasks.as_mut() {
            Some(tasks) => {
                tasks.spawn(name, kind, future);
                true
            }
            None => false,
        }
    }

    /// Cancellation token shared by the background tasks
    pub fn shutdown_token(&self) -> Option<CancellationToken> {
        self.tasks.as_ref().map(|t| t.shutdown_token())
    }

    pub async fn stop(&mut self) {
        self.scheduler.stop().await;
        if let Some(tasks) = self.tasks.take() {
            tasks.shutdown(SHUTDOWN_GRACE).await;
        }
        tracing::info!("Relay service stopped");
    }

    pub async fn restart(&self, reason: &str) {
        self.scheduler.restart(reason).await;
    }

    /// Apply a re-read configuration
    ///
    /// Interval changes are pushed to the running loop and engine tuning is
    /// applied in place. Backend, printer and keep-alive changes restart the
    /// loop. Returns `true` when a restart happened.
    pub async fn reload(&self, next: RelayConfig) -> bool {
        let previous = self.config.snapshot();
        for key in previous.process_restart_keys(&next) {
            tracing::warn!(key, "Setting changed, takes effect after a process restart");
        }

        self.apply_tuning(&next);
        let restart = self.config.apply(next);
        if restart && self.scheduler.is_active() {
            self.scheduler.restart("configuration reloaded").await;
        }
        restart
    }

    fn apply_tuning(&self, settings: &RelayConfig) {
        self.scheduler.set_policy(settings.polling_policy());
        self.scheduler.set_fetch_timeout(settings.fetch_timeout());
        self.scheduler.guard().set_safety_timeout(settings.keepalive_timeout());

        let processor = self.scheduler.processor();
        processor.set_recency_window(settings.recency_window());
        processor.dedup().set_capacity(settings.dedup_capacity);
        processor
            .dispatcher()
            .set_timeouts(settings.print_connect_timeout(), settings.print_send_timeout());
    }
}
