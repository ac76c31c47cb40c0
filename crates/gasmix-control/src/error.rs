//! 控制层错误类型定义

use gasmix_device::CalibrationError;
use gasmix_driver::{DeviceCommandError, DriverError, RunState};
use gasmix_tools::ValidationError;
use thiserror::Error;

/// 控制层错误类型
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Command(#[from] DeviceCommandError),

    #[error("Invalid sequence: {0}")]
    Validation(#[from] ValidationError),

    /// 非法状态转换（例如运行中再次 start）
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("Flow setpoint {0} sccm is outside (0, 500]")]
    InvalidFlowSetpoint(f64),

    #[error("Calibration rejected: {0}")]
    CalibrationRejected(#[from] CalibrationError),

    /// 没有可等待的运行
    #[error("No run has been started")]
    NotStarted,

    #[error("Worker thread panicked")]
    WorkerPanicked,
}
