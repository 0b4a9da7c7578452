//! Crab Relay - 电商订单自动打印中继
//!
//! # 架构概述
//!
//! 无人值守的守护进程：定时从电商后台拉取待处理订单，去重后通知用户并
//! 自动打印到小票打印机。
//!
//! - **轮询** (`polling`): 自适应间隔调度器、去重缓存、看门狗、网络心跳、保活
//! - **打印** (`printing`): 打印决策、连接状态、小票渲染
//! - **数据源** (`sources`): 配置、订单 (后台 API + redb 本地库)、通知
//!
//! # 模块结构
//!
//! ```text
//! crab-relay/src/
//! ├── core/          # 配置、错误、事件总线、后台任务
//! ├── polling/       # 调度器与监督任务
//! ├── printing/      # 打印链路
//! ├── sources/       # 外部协作者
//! ├── utils/         # 日志
//! └── service.rs     # 生命周期入口
//! ```

pub mod core;
pub mod polling;
pub mod printing;
pub mod service;
pub mod sources;
pub mod utils;

// Re-export 公共类型
pub use core::{BackgroundTasks, EventBus, RelayConfig, RelayError, RelayResult, TaskKind};
pub use polling::{PollPhase, PollingScheduler, SchedulerStatus};
pub use printing::{DispatchOutcome, PrintDispatcher};
pub use service::{RelayComponents, RelayService};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

pub fn print_banner() {
    println!(
        r#"
   ______           __
  / ____/________ _/ /_
 / /   / ___/ __ `/ __ \
/ /___/ /  / /_/ / /_/ /
\____/_/   \__,_/_.___/
    ____       __
   / __ \___  / /___ ___  __
  / /_/ / _ \/ / __ `/ / / /
 / _, _/  __/ / /_/ / /_/ /
/_/ |_|\___/_/\__,_/\__, /
                   /____/
    "#
    );
}
