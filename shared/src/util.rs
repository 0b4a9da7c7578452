/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Format a Unix millis timestamp as RFC 3339 (UTC, second precision)
///
/// Returns `None` for timestamps outside chrono's range.
pub fn millis_to_rfc3339(ts: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}
