//! 驱动层错误类型定义

use crate::link::ChannelId;
use gasmix_device::DeviceError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 设备错误（单次操作失败，未经重试）
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// 重试耗尽的写命令
    #[error(transparent)]
    Command(#[from] DeviceCommandError),

    /// 混气台已被其他流程占用
    #[error("Rig is busy: '{holder}' is still active")]
    Busy { holder: String },

    /// 构造参数不完整
    #[error("Invalid rig configuration: {0}")]
    InvalidConfig(String),

    /// 后台线程创建失败
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// 写命令重试耗尽
///
/// 携带最后一次底层错误与实际尝试次数；对当前运行是致命的。
#[derive(Error, Debug, Clone)]
#[error("{channel} command failed after {attempts} attempt(s): {last}")]
pub struct DeviceCommandError {
    pub channel: ChannelId,
    pub attempts: u32,
    #[source]
    pub last: DeviceError,
}
