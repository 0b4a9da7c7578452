//! In-memory collaborators for driving the engine in tests
#![allow(dead_code)]

use async_trait::async_trait;
use crab_printer::{PrintError, PrintResult};
use crab_relay::core::EventBus;
use crab_relay::polling::{
    ConnectivityProbe, Deduplicator, KeepAlive, OrderProcessor, PollingIntervalPolicy,
    PollingScheduler, ResourceGuard, SchedulerOptions,
};
use crab_relay::printing::{PrintDispatcher, PrinterLink, Templating};
use crab_relay::sources::{ConfigSource, NotificationSink, OrderSource};
use crab_relay::{RelayError, RelayResult};
use parking_lot::Mutex;
use shared::{Order, OrderStatus, PrinterConfig, PrinterConnectionState};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

// ========== Config ==========

pub struct FakeConfig {
    interval_tx: watch::Sender<u64>,
    pub credentials: AtomicBool,
    pub auto_print: AtomicBool,
    pub printer: Mutex<Option<PrinterConfig>>,
    pub credential_checks: Mutex<Vec<Instant>>,
}

impl FakeConfig {
    pub fn new(interval_secs: u64) -> Self {
        let (interval_tx, _) = watch::channel(interval_secs);
        Self {
            interval_tx,
            credentials: AtomicBool::new(true),
            auto_print: AtomicBool::new(true),
            printer: Mutex::new(Some(printer_config())),
            credential_checks: Mutex::new(Vec::new()),
        }
    }

    pub fn set_interval(&self, secs: u64) {
        self.interval_tx.send_replace(secs);
    }
}

#[async_trait]
impl ConfigSource for FakeConfig {
    fn polling_interval(&self) -> watch::Receiver<u64> {
        self.interval_tx.subscribe()
    }

    async fn credentials_valid(&self) -> bool {
        self.credential_checks.lock().push(Instant::now());
        self.credentials.load(Ordering::SeqCst)
    }

    async fn auto_print_enabled(&self) -> bool {
        self.auto_print.load(Ordering::SeqCst)
    }

    async fn printer_config(&self) -> Option<PrinterConfig> {
        self.printer.lock().clone()
    }
}

pub fn printer_config() -> PrinterConfig {
    PrinterConfig {
        name: "front".into(),
        address: "10.0.0.20:9100".into(),
        ..Default::default()
    }
}

// ========== Orders ==========

#[derive(Default)]
pub struct FakeOrders {
    /// What the backend returns on every fetch
    pub remote: Mutex<Vec<Order>>,
    /// Authoritative local records
    pub local: Mutex<HashMap<String, Order>>,
    /// (time, cursor) of every fetch
    pub fetches: Mutex<Vec<(Instant, Option<i64>)>>,
    pub fail_fetch: AtomicBool,
    pub hang_fetch: AtomicBool,
    pub hang_lookups: AtomicBool,
    pub mark_printed_calls: AtomicUsize,
}

impl FakeOrders {
    pub fn with_remote(orders: Vec<Order>) -> Self {
        let fake = Self::default();
        *fake.remote.lock() = orders;
        fake
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().len()
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.fetches.lock().iter().map(|(t, _)| *t).collect()
    }

    pub fn local(&self, id: &str) -> Option<Order> {
        self.local.lock().get(id).cloned()
    }

    /// Simulate a manual print from another device
    pub fn set_printed(&self, id: &str) {
        if let Some(order) = self.local.lock().get_mut(id) {
            order.printed = true;
        }
    }
}

#[async_trait]
impl OrderSource for FakeOrders {
    async fn fetch_actionable_since(&self, cursor: Option<i64>) -> RelayResult<Vec<Order>> {
        self.fetches.lock().push((Instant::now(), cursor));
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RelayError::Fetch("backend unavailable".into()));
        }
        if self.hang_fetch.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }

        let remote = self.remote.lock().clone();
        let mut local = self.local.lock();
        let merged = remote
            .into_iter()
            .map(|mut order| {
                if let Some(existing) = local.get(&order.id) {
                    order.merge_local_flags(existing);
                }
                local.insert(order.id.clone(), order.clone());
                order
            })
            .collect();
        Ok(merged)
    }

    async fn get_by_id(&self, id: &str) -> RelayResult<Option<Order>> {
        if self.hang_lookups.load(Ordering::SeqCst) {
            return std::future::pending().await;
        }
        Ok(self.local(id))
    }

    async fn mark_printed(&self, id: &str) -> RelayResult<bool> {
        self.mark_printed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(match self.local.lock().get_mut(id) {
            Some(order) => {
                order.printed = true;
                true
            }
            None => false,
        })
    }

    async fn mark_notified(&self, id: &str) -> RelayResult<()> {
        if let Some(order) = self.local.lock().get_mut(id) {
            order.notified = true;
        }
        Ok(())
    }
}

pub fn order_created_ago(id: &str, ago: Duration) -> Order {
    let created_at = shared::util::now_millis() - ago.as_millis() as i64;
    Order::new(id, format!("10{id}"), OrderStatus::Processing, created_at)
}

// ========== Printer ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    Succeed,
    Hang,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Succeed,
    Hang,
    Fail,
}

pub struct FakeLink {
    pub connected: AtomicBool,
    pub mode: Mutex<ConnectMode>,
    pub send_mode: Mutex<SendMode>,
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub connects: AtomicUsize,
}

impl FakeLink {
    pub fn new(mode: ConnectMode) -> Self {
        Self {
            connected: AtomicBool::new(false),
            mode: Mutex::new(mode),
            send_mode: Mutex::new(SendMode::Succeed),
            sent: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: ConnectMode) {
        *self.mode.lock() = mode;
    }

    pub fn set_send_mode(&self, mode: SendMode) {
        *self.send_mode.lock() = mode;
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl PrinterLink for FakeLink {
    async fn status(&self, _config: &PrinterConfig) -> PrinterConnectionState {
        if self.connected.load(Ordering::SeqCst) {
            PrinterConnectionState::Connected
        } else {
            PrinterConnectionState::Disconnected
        }
    }

    async fn connect(&self, config: &PrinterConfig, _timeout: Duration) -> PrintResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock();
        match mode {
            ConnectMode::Succeed => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            ConnectMode::Hang => std::future::pending().await,
            ConnectMode::Fail => Err(PrintError::Connection(config.address.clone())),
        }
    }

    async fn send(
        &self,
        payload: &[u8],
        config: &PrinterConfig,
        _timeout: Duration,
    ) -> PrintResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PrintError::Offline(config.address.clone()));
        }
        let mode = *self.send_mode.lock();
        match mode {
            SendMode::Succeed => {
                self.sent.lock().push(payload.to_vec());
                Ok(())
            }
            SendMode::Hang => std::future::pending().await,
            SendMode::Fail => {
                self.connected.store(false, Ordering::SeqCst);
                Err(PrintError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "printer closed connection",
                )))
            }
        }
    }
}

pub struct IdTemplating;

impl Templating for IdTemplating {
    fn render(&self, order: &Order, _config: &PrinterConfig) -> Vec<u8> {
        order.id.as_bytes().to_vec()
    }
}

// ========== Notifications ==========

#[derive(Default)]
pub struct RecordingSink {
    pub new_orders: Mutex<Vec<String>>,
    pub issues: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new_order_ids(&self) -> Vec<String> {
        self.new_orders.lock().clone()
    }

    pub fn issue_count(&self) -> usize {
        self.issues.lock().len()
    }
}

impl NotificationSink for RecordingSink {
    fn notify_new_order(&self, order: &Order) {
        self.new_orders.lock().push(order.id.clone());
    }

    fn notify_issue(&self, message: &str) {
        self.issues.lock().push(message.to_string());
    }
}

// ========== Host ==========

pub struct FakeProbe {
    pub available: AtomicBool,
}

impl FakeProbe {
    pub fn new(available: bool) -> Self {
        Self {
            available: AtomicBool::new(available),
        }
    }

    pub fn set(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for FakeProbe {
    async fn transport_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct CountingKeepAlive {
    pub holds: AtomicUsize,
    pub unholds: AtomicUsize,
}

impl KeepAlive for CountingKeepAlive {
    fn hold(&self, _timeout: Duration) -> io::Result<()> {
        self.holds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unhold(&self) {
        self.unholds.fetch_add(1, Ordering::SeqCst);
    }
}

// ========== Harness ==========

pub struct Harness {
    pub config: Arc<FakeConfig>,
    pub orders: Arc<FakeOrders>,
    pub link: Arc<FakeLink>,
    pub sink: Arc<RecordingSink>,
    pub keepalive: Arc<CountingKeepAlive>,
    pub bus: EventBus,
    pub dispatcher: Arc<PrintDispatcher>,
    pub dedup: Arc<Deduplicator>,
}

impl Harness {
    pub fn new(orders: FakeOrders, mode: ConnectMode) -> Self {
        let config = Arc::new(FakeConfig::new(60));
        let orders = Arc::new(orders);
        let link = Arc::new(FakeLink::new(mode));
        let dispatcher = Arc::new(PrintDispatcher::new(
            config.clone(),
            orders.clone(),
            link.clone(),
            Arc::new(IdTemplating),
        ));

        Self {
            config,
            orders,
            link,
            sink: Arc::new(RecordingSink::default()),
            keepalive: Arc::new(CountingKeepAlive::default()),
            bus: EventBus::new(),
            dispatcher,
            dedup: Arc::new(Deduplicator::new(500)),
        }
    }

    pub fn processor(&self) -> OrderProcessor {
        OrderProcessor::new(
            self.config.clone(),
            self.orders.clone(),
            self.sink.clone(),
            self.dispatcher.clone(),
            self.dedup.clone(),
            self.bus.clone(),
        )
    }

    pub fn scheduler(&self) -> Arc<PollingScheduler> {
        let guard = ResourceGuard::new(self.keepalive.clone(), Duration::from_secs(1800));
        PollingScheduler::new(
            self.config.clone(),
            self.orders.clone(),
            self.processor(),
            guard,
            self.bus.clone(),
            SchedulerOptions {
                policy: PollingIntervalPolicy {
                    base: Duration::from_secs(60),
                    foreground_multiplier: 0.5,
                    floor: Duration::from_secs(1),
                    initial_fast_poll: Duration::from_secs(10),
                },
                fetch_timeout: Duration::from_secs(30),
                restart_grace: Duration::from_secs(1),
            },
        )
    }
}

/// Sleep in small virtual-time steps until `cond` holds (panics after `limit`)
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within {limit:?}");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
