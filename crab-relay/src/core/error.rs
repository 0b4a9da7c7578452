//! 统一错误处理
//!
//! | 分类 | 变体 | 处理方式 |
//! |------|------|----------|
//! | 配置 | `ConfigInvalid` | 跳过本轮，等待下一轮 |
//! | 拉取 | `Fetch` | 记录日志，本轮视为 0 单 |
//! | 打印 | `PrinterUnreachable` / `PrintTimeout` / `PrintFailed` | 订单保持未打印，下一轮重试 |
//! | 存储 | `Storage` | 记录日志 |
//! | 监控 | `StallDetected` | 看门狗强制重启调度器 |
//! | 关闭 | `Cancelled` | 非错误，仅释放资源 |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or incomplete backend credentials
    #[error("Configuration invalid: {0}")]
    ConfigInvalid(String),

    /// Network/API failure while fetching orders
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Printer connect failed or timed out
    #[error("Printer unreachable: {0}")]
    PrinterUnreachable(String),

    /// Printer send exceeded its deadline
    #[error("Print timeout: {0}")]
    PrintTimeout(String),

    /// Printer rejected or dropped the job
    #[error("Print failed: {0}")]
    PrintFailed(String),

    /// Local order store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Scheduler stopped ticking
    #[error("Scheduler stalled: {0}")]
    StallDetected(String),

    /// Cooperative shutdown
    #[error("Cancelled")]
    Cancelled,
}

impl RelayError {
    /// Whether the next poll cycle may succeed without intervention
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RelayError::Fetch(_)
                | RelayError::PrinterUnreachable(_)
                | RelayError::PrintTimeout(_)
                | RelayError::PrintFailed(_)
        )
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Fetch(e.to_string())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
