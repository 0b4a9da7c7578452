//! 核心模块 - 配置、错误、事件总线和后台任务
//!
//! # 模块结构
//!
//! - [`RelayConfig`] - 中继配置
//! - [`RelayError`] - 错误分类
//! - [`EventBus`] - 事件广播
//! - [`BackgroundTasks`] - 后台任务管理

pub mod config;
pub mod error;
pub mod event_bus;
pub mod tasks;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use event_bus::EventBus;
pub use tasks::{BackgroundTasks, TaskKind};
