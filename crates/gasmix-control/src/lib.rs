//! # Gasmix Control
//!
//! 混气台的闭环控制层：
//!
//! - [`PidController`]：浓度误差 → 控制信号（0~100），再拆分为两路流量
//! - [`SequenceExecutor`]：按阶段驱动 PID 闭环（`Idle → Running → Completed/Stopped`）
//! - [`StagedProcedure`]：固定流量的分步流程（标定、冲洗、半手动时间表）
//! - [`EventSender`]：后台线程 → 前台的有界事件队列
//!
//! 所有退出路径最终都调用 `gasmix_driver::shutdown`，两路通道归零。

pub mod countdown;
mod error;
pub mod events;
pub mod executor;
pub mod filter;
pub mod pid;
pub mod procedure;

pub use countdown::Countdown;
pub use error::ControlError;
pub use events::{ControlSample, EventSender, RigEvent, event_channel};
pub use executor::{ExecutorConfig, RunReport, SequenceExecutor, StopHandle, WriteMode};
pub use filter::FilteredSensor;
pub use pid::{FlowSplit, PidController, PidGains, PidState};
pub use procedure::{
    CalibrationTiming, FlushTiming, ProcedureHandle, ProcedureKind, ProcedureOutcome,
    ProcedureReport, ProcedureStep, SampleRole, SamplingSpec, StagedProcedure, StepSamples,
};
