//! # Gasmix Driver
//!
//! 混气台驱动层：
//! - [`Rig`]：持有两路流量通道与浓度传感器，提供带锁的读写入口
//! - [`ConnectionState`]：每路通道的连接状态机
//! - [`RetryingDeviceCommand`]：写命令的有界重试
//! - [`RunFlag`]：协作式取消标志
//! - [`TelemetrySampler`]：后台遥测采样线程
//! - [`shutdown`]：所有退出路径汇聚的归零例程
//!
//! 上层的序列执行器与分步流程见 `gasmix-control`。

mod builder;
mod error;
pub mod flag;
pub mod link;
pub mod metrics;
pub mod retry;
mod rig;
pub mod shutdown;
pub mod state;
pub mod telemetry;

pub use builder::RigBuilder;
pub use error::{DeviceCommandError, DriverError};
pub use flag::RunFlag;
pub use link::{ChannelId, ChannelLink, ChannelSession, ConnectionState};
pub use metrics::{MetricsSnapshot, RigMetrics};
pub use retry::{RetryOutcome, RetryPolicy, RetryingDeviceCommand};
pub use rig::{ActivityGuard, Rig};
pub use shutdown::{ShutdownReport, shutdown};
pub use state::{AtomicRunState, RunState};
pub use telemetry::{TelemetryConfig, TelemetrySampler, TelemetrySink, TelemetrySnapshot};

// 重新导出设备层
pub use gasmix_device::{
    CalibrationRange, CalibrationStore, ConcentrationSensor, DeviceError, FlowChannel,
};
