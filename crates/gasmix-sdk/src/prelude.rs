//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use gasmix_sdk::prelude::*;
//! ```

// 控制层
pub use gasmix_control::{
    CalibrationTiming, ControlSample, EventSender, ExecutorConfig, FilteredSensor, FlowSplit,
    FlushTiming, PidController, PidGains, ProcedureHandle, ProcedureOutcome, ProcedureReport,
    RigEvent, RunReport, SequenceExecutor, StagedProcedure, StopHandle, WriteMode, event_channel,
};

// 驱动层
pub use gasmix_driver::{
    ChannelId, ConnectionState, RetryPolicy, Rig, RigBuilder, RunFlag, RunState, ShutdownReport,
    TelemetryConfig, TelemetrySampler, TelemetrySnapshot, shutdown,
};

// 设备层
pub use gasmix_device::{CalibrationRange, CalibrationStore, ConcentrationSensor, FlowChannel};

// 工具层
pub use gasmix_tools::{RigConfig, Sequence, build_schedule, validate_pairs, validate_triples};

pub use crate::settings;

// 错误类型
pub use gasmix_control::ControlError;
pub use gasmix_device::DeviceError;
pub use gasmix_driver::{DeviceCommandError, DriverError};
pub use gasmix_tools::{ConfigError, ValidationError};
