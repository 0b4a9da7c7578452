use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crab_relay::polling::{InhibitKeepAlive, KeepAlive, NoopKeepAlive, TcpConnectivityProbe};
use crab_relay::printing::{NetworkPrinterLink, ReceiptRenderer};
use crab_relay::sources::{EnvConfigSource, LogNotificationSink, OrderStore, RemoteOrderSource};
use crab_relay::{
    EventBus, RelayComponents, RelayConfig, RelayService, TaskKind, init_logger_with_file,
    print_banner,
};

/// Local order records are kept this long
const STORE_RETENTION_SECS: i64 = 7 * 86_400;
const STORE_CLEANUP_INTERVAL: Duration = Duration::from_secs(6 * 3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 工作目录, 日志)
    dotenv::dotenv().ok();
    let config = RelayConfig::from_env();
    std::fs::create_dir_all(&config.work_dir)?;
    init_logger_with_file(&config.log_level, config.log_json, Some(config.log_dir().as_str()))?;

    print_banner();
    tracing::info!("🦀 Crab Relay starting...");

    if !config.credentials_valid() {
        tracing::warn!("Backend credentials incomplete, polling will idle until configured");
    }
    if config.printer_config().is_none() {
        tracing::warn!("PRINTER_ADDR not set, receipts will not be printed");
    }

    // 2. 本地订单库 + 协作者
    let store = OrderStore::open(config.store_path())?;
    let remote = Arc::new(RemoteOrderSource::new(&config, store.clone())?);
    let bus = EventBus::new();
    let config_source = Arc::new(EnvConfigSource::new(config.clone()));

    let keepalive: Arc<dyn KeepAlive> = if cfg!(target_os = "linux") {
        Arc::new(InhibitKeepAlive::new("crab-relay", "Polling for new orders"))
    } else {
        Arc::new(NoopKeepAlive)
    };

    let components = RelayComponents {
        config: config_source,
        orders: remote.clone(),
        link: Arc::new(NetworkPrinterLink::new()),
        templating: Arc::new(ReceiptRenderer::from_timezone_name(&config.timezone)),
        notifier: Arc::new(LogNotificationSink::new(bus.clone())),
        probe: Arc::new(TcpConnectivityProbe::new(&config.backend_url, true)),
        keepalive,
    };

    // 3. 启动
    let mut service = RelayService::new(components, bus);
    service.start().await;

    if let Some(shutdown) = service.shutdown_token() {
        service.spawn_task("store_cleanup", TaskKind::Periodic, async move {
            let mut ticker = tokio::time::interval(STORE_CLEANUP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => match store.cleanup_old_records(STORE_RETENTION_SECS) {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(deleted = n, "Cleaned up old order records"),
                        Err(e) => tracing::error!(error = %e, "Order store cleanup failed"),
                    },
                }
            }
        });
    }

    // 4. 信号: Ctrl-C / SIGTERM → stop, SIGHUP → reload
    wait_for_signals(&service, &remote).await?;

    tracing::info!("Shutdown signal received");
    service.stop().await;
    tracing::info!("Crab Relay stopped");
    Ok(())
}

/// Re-read configuration; `.env` entries override the process environment
fn reload_config() -> RelayConfig {
    let overrides: HashMap<String, String> = match dotenv::dotenv_iter() {
        Ok(iter) => iter.flatten().collect(),
        Err(e) => {
            tracing::debug!(error = %e, "No .env file to reload");
            HashMap::new()
        }
    };
    RelayConfig::from_lookup(|key| {
        overrides
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    })
}

async fn apply_reload(service: &RelayService, remote: &RemoteOrderSource) {
    let next = reload_config();
    remote.reconfigure(&next);
    let restarted = service.reload(next).await;
    if !restarted {
        service.scheduler().poll_now("configuration reloaded");
    }
    tracing::info!(restarted, "Configuration reloaded");
}

#[cfg(unix)]
async fn wait_for_signals(service: &RelayService, remote: &RemoteOrderSource) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = terminate.recv() => return Ok(()),
            _ = hangup.recv() => apply_reload(service, remote).await,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signals(_service: &RelayService, _remote: &RemoteOrderSource) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
