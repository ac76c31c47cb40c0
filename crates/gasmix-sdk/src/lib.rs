//! Gasmix SDK - 双路混气台 Rust SDK
//!
//! 两路质量流量控制器（目标气 + 稀释气）与一个浓度传感器组成的混气台：
//! 闭环 PID 按阶段调节混合浓度，开环分步流程完成标定和冲洗。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **设备层** (`device`): 流量通道 / 传感器 trait、标定区间、仿真与 Mock 后端
//! - **驱动层** (`driver`): 连接状态、重试命令、关机例程、遥测采样
//! - **控制层** (`control`): PID、序列执行器、分步流程、事件队列
//! - **工具层** (`tools`): 序列校验、配置文件、滤波与统计
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use gasmix_sdk::prelude::*;
//!
//! let config = RigConfig::default();
//! let rig = gasmix_sdk::simulated_rig(&config).unwrap();
//! rig.connect_all().unwrap();
//!
//! let (events, _rx) = event_channel(config.telemetry.event_queue_capacity);
//! let executor = SequenceExecutor::new(rig, settings::executor_config(&config), events);
//! executor
//!     .start(
//!         validate_pairs("10,5000,5,3000").unwrap(),
//!         config.flow.total_setpoint_sccm,
//!         settings::pid_gains(&config),
//!     )
//!     .unwrap();
//! executor.wait().unwrap();
//! ```

pub mod prelude;
pub mod settings;

pub use gasmix_control as control;
pub use gasmix_device as device;
pub use gasmix_driver as driver;
pub use gasmix_tools as tools;

// 常用类型
pub use gasmix_control::{
    ControlError, EventSender, PidController, PidGains, RigEvent, SequenceExecutor,
    StagedProcedure, event_channel,
};
pub use gasmix_device::{CalibrationRange, CalibrationStore, DeviceError};
pub use gasmix_driver::{DeviceCommandError, DriverError, Rig, RigBuilder, RunState};
pub use gasmix_tools::{ConfigError, RigConfig, ValidationError};

#[cfg(feature = "sim")]
pub use settings::simulated_rig;

use tracing_subscriber::EnvFilter;

/// 初始化日志（`RUST_LOG` 优先，缺省为 `default_level`）
///
/// 重复调用是安全的，只有第一次生效。
pub fn init_logger(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
