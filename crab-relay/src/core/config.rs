use std::str::FromStr;
use std::time::Duration;

use shared::PrinterConfig;

use crate::polling::PollingIntervalPolicy;

/// 中继配置 - 订单轮询与打印的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量 (或 `.env`) 覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/crab/relay | 工作目录 (订单库、日志) |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 日志 |
/// | BACKEND_URL | - | 电商后台地址 |
/// | CONSUMER_KEY / CONSUMER_SECRET | - | 后台凭证 |
/// | POLL_INTERVAL_SECS | 60 | 基础轮询间隔 |
/// | FOREGROUND_MULTIPLIER | 0.5 | 前台时的间隔倍数 |
/// | POLL_FLOOR_SECS | 15 | 最小间隔 |
/// | FAST_POLL_SECS | 10 | 启动快速轮询间隔 |
/// | FETCH_TIMEOUT_SECS | 30 | 拉取超时 |
/// | RECENCY_WINDOW_SECS | 300 | 首次轮询的新单时间窗口 |
/// | DEDUP_CAPACITY | 500 | 已处理订单缓存容量 |
/// | PRINTER_ADDR | - | 打印机地址 host:port (为空则不打印) |
/// | PRINTER_NAME | receipt | 打印机名称 |
/// | PAPER_WIDTH | 48 | 每行字符数 |
/// | PRINTER_ENCODING | utf8 | utf8 / gbk / latin1 |
/// | AUTO_PRINT | true | 全局自动打印 |
/// | PRINTER_AUTO_PRINT | true | 打印机自动打印 |
/// | PRINT_CONNECT_TIMEOUT_SECS | 15 | 打印机连接超时 |
/// | PRINT_SEND_TIMEOUT_SECS | 30 | 打印发送超时 |
/// | WATCHDOG_CHECK_SECS | 60 | 看门狗检查间隔 |
/// | WATCHDOG_STALL_SECS | 180 | 判定卡死的阈值 |
/// | NETWORK_CHECK_SECS | 30 | 网络心跳间隔 |
/// | NETWORK_MAX_RETRY | 3 | 连续失败多少次后通知用户 |
/// | KEEPALIVE_TIMEOUT_SECS | 1800 | 保活资源的安全超时 |
/// | TIMEZONE | UTC | 小票时间的时区 |
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    pub work_dir: String,
    pub log_level: String,
    pub log_json: bool,

    // === Backend ===
    pub backend_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,

    // === Polling ===
    pub poll_interval_secs: u64,
    pub foreground_multiplier: f64,
    pub poll_floor_secs: u64,
    pub fast_poll_secs: u64,
    pub fetch_timeout_secs: u64,
    pub recency_window_secs: u64,
    pub dedup_capacity: usize,

    // === Printer ===
    pub printer_addr: String,
    pub printer_name: String,
    pub paper_width: usize,
    pub printer_encoding: String,
    pub auto_print: bool,
    pub printer_auto_print: bool,
    pub print_connect_timeout_secs: u64,
    pub print_send_timeout_secs: u64,

    // === Supervision ===
    pub watchdog_check_secs: u64,
    pub watchdog_stall_secs: u64,
    pub network_check_secs: u64,
    pub network_max_retry: u32,
    pub keepalive_timeout_secs: u64,

    pub timezone: String,
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn or<T: FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn string(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.into())
    }
}

impl RelayConfig {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源加载 (重载时用 .env 覆盖进程环境)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Lookup(lookup);
        Self {
            work_dir: env.string("WORK_DIR", "/var/lib/crab/relay"),
            log_level: env.string("LOG_LEVEL", "info"),
            log_json: env.or("LOG_JSON", false),

            backend_url: env.string("BACKEND_URL", ""),
            consumer_key: env.string("CONSUMER_KEY", ""),
            consumer_secret: env.string("CONSUMER_SECRET", ""),

            poll_interval_secs: env.or("POLL_INTERVAL_SECS", 60),
            foreground_multiplier: env.or("FOREGROUND_MULTIPLIER", 0.5),
            poll_floor_secs: env.or("POLL_FLOOR_SECS", 15),
            fast_poll_secs: env.or("FAST_POLL_SECS", 10),
            fetch_timeout_secs: env.or("FETCH_TIMEOUT_SECS", 30),
            recency_window_secs: env.or("RECENCY_WINDOW_SECS", 300),
            dedup_capacity: env.or("DEDUP_CAPACITY", 500),

            printer_addr: env.string("PRINTER_ADDR", ""),
            printer_name: env.string("PRINTER_NAME", "receipt"),
            paper_width: env.or("PAPER_WIDTH", 48),
            printer_encoding: env.string("PRINTER_ENCODING", "utf8"),
            auto_print: env.or("AUTO_PRINT", true),
            printer_auto_print: env.or("PRINTER_AUTO_PRINT", true),
            print_connect_timeout_secs: env.or("PRINT_CONNECT_TIMEOUT_SECS", 15),
            print_send_timeout_secs: env.or("PRINT_SEND_TIMEOUT_SECS", 30),

            watchdog_check_secs: env.or("WATCHDOG_CHECK_SECS", 60),
            watchdog_stall_secs: env.or("WATCHDOG_STALL_SECS", 180),
            network_check_secs: env.or("NETWORK_CHECK_SECS", 30),
            network_max_retry: env.or("NETWORK_MAX_RETRY", 3),
            keepalive_timeout_secs: env.or("KEEPALIVE_TIMEOUT_SECS", 1800),

            timezone: env.string("TIMEZONE", "UTC"),
        }
    }

    /// 凭证是否完整
    pub fn credentials_valid(&self) -> bool {
        !self.backend_url.trim().is_empty()
            && !self.consumer_key.trim().is_empty()
            && !self.consumer_secret.trim().is_empty()
    }

    /// 打印机配置 (未配置地址时为 None)
    pub fn printer_config(&self) -> Option<PrinterConfig> {
        if self.printer_addr.trim().is_empty() {
            return None;
        }
        Some(PrinterConfig {
            name: self.printer_name.clone(),
            address: self.printer_addr.trim().to_string(),
            paper_width: self.paper_width,
            encoding: self.printer_encoding.clone(),
            auto_print_enabled: self.printer_auto_print,
        })
    }

    /// 轮询间隔策略
    pub fn polling_policy(&self) -> PollingIntervalPolicy {
        PollingIntervalPolicy {
            base: Duration::from_secs(self.poll_interval_secs),
            foreground_multiplier: self.foreground_multiplier,
            floor: Duration::from_secs(self.poll_floor_secs),
            initial_fast_poll: Duration::from_secs(self.fast_poll_secs),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn recency_window(&self) -> Duration {
        Duration::from_secs(self.recency_window_secs)
    }

    pub fn print_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.print_connect_timeout_secs)
    }

    pub fn print_send_timeout(&self) -> Duration {
        Duration::from_secs(self.print_send_timeout_secs)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.keepalive_timeout_secs)
    }

    /// 日志目录
    pub fn log_dir(&self) -> String {
        format!("{}/logs", self.work_dir.trim_end_matches('/'))
    }

    /// 本地订单库路径
    pub fn store_path(&self) -> String {
        format!("{}/orders.redb", self.work_dir.trim_end_matches('/'))
    }

    /// Whether a reload from `self` to `next` needs a hard scheduler restart
    ///
    /// Only backend, printer and keep-alive settings restart the loop. Engine
    /// tuning (interval policy, timeouts, recency window, dedup capacity) is
    /// applied in place, see [`RelayService::reload`](crate::RelayService::reload).
    pub fn requires_restart(&self, next: &RelayConfig) -> bool {
        self.backend_url != next.backend_url
            || self.consumer_key != next.consumer_key
            || self.consumer_secret != next.consumer_secret
            || self.printer_addr != next.printer_addr
            || self.printer_name != next.printer_name
            || self.paper_width != next.paper_width
            || self.printer_encoding != next.printer_encoding
            || self.auto_print != next.auto_print
            || self.printer_auto_print != next.printer_auto_print
            || self.keepalive_timeout_secs != next.keepalive_timeout_secs
    }

    /// Changed keys that only take effect after a process restart
    pub fn process_restart_keys(&self, next: &RelayConfig) -> Vec<&'static str> {
        let changed = [
            ("WORK_DIR", self.work_dir != next.work_dir),
            ("LOG_LEVEL", self.log_level != next.log_level),
            ("LOG_JSON", self.log_json != next.log_json),
            ("TIMEZONE", self.timezone != next.timezone),
            ("WATCHDOG_CHECK_SECS", self.watchdog_check_secs != next.watchdog_check_secs),
            ("WATCHDOG_STALL_SECS", self.watchdog_stall_secs != next.watchdog_stall_secs),
            ("NETWORK_CHECK_SECS", self.network_check_secs != next.network_check_secs),
            ("NETWORK_MAX_RETRY", self.network_max_retry != next.network_max_retry),
        ];
        changed
            .into_iter()
            .filter_map(|(key, differs)| differs.then_some(key))
            .collect()
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RelayConfig {
        let mut config = RelayConfig::from_env();
        config.backend_url = "https://shop.example.com/wp-json/wc/v3".into();
        config.consumer_key = "ck_test".into();
        config.consumer_secret = "cs_test".into();
        config.printer_addr = "10.0.0.20:9100".into();
        config
    }

    #[test]
    fn test_credentials_valid() {
        let mut config = sample();
        assert!(config.credentials_valid());
        config.consumer_secret = "  ".into();
        assert!(!config.credentials_valid());
    }

    #[test]
    fn test_printer_config_requires_address() {
        let mut config = sample();
        assert_eq!(config.printer_config().unwrap().address, "10.0.0.20:9100");
        config.printer_addr.clear();
        assert!(config.printer_config().is_none());
    }

    #[test]
    fn test_from_lookup_defaults_and_overrides() {
        let config = RelayConfig::from_lookup(|key| match key {
            "POLL_INTERVAL_SECS" => Some(" 90 ".into()),
            "AUTO_PRINT" => Some("false".into()),
            "PAPER_WIDTH" => Some("not a number".into()),
            _ => None,
        });
        assert_eq!(config.poll_interval_secs, 90);
        assert!(!config.auto_print);
        assert_eq!(config.paper_width, 48);
        assert_eq!(config.watchdog_stall_secs, 180);
        assert_eq!(config.store_path(), "/var/lib/crab/relay/orders.redb");
    }

    #[test]
    fn test_interval_change_does_not_require_restart() {
        let config = sample();
        let mut next = config.clone();
        next.poll_interval_secs = 120;
        assert!(!config.requires_restart(&next));

        next.backend_url = "https://other.example.com".into();
        assert!(config.requires_restart(&next));
    }

    #[test]
    fn test_tuning_change_does_not_require_restart() {
        let config = sample();
        let mut next = config.clone();
        next.poll_floor_secs = 120;
        next.fetch_timeout_secs = 5;
        next.print_send_timeout_secs = 5;
        next.dedup_capacity = 10;
        assert!(!config.requires_restart(&next));
        assert!(config.process_restart_keys(&next).is_empty());

        next.printer_addr = "10.0.0.21:9100".into();
        assert!(config.requires_restart(&next));
    }

    #[test]
    fn test_process_restart_keys() {
        let config = sample();
        let mut next = config.clone();
        next.timezone = "Europe/Madrid".into();
        next.watchdog_stall_secs = 600;
        assert_eq!(
            config.process_restart_keys(&next),
            vec!["TIMEZONE", "WATCHDOG_STALL_SECS"]
        );
        assert!(!config.requires_restart(&next));
    }
}
