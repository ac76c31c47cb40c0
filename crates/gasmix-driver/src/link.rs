//! 通道连接状态机
//!
//! ```text
//! Disconnected --connect ok--> Connected(session)
//! Disconnected --connect err-> Faulted(err)
//! Connected    --retry exhausted--> Faulted(err)
//! Faulted      --connect ok--> Connected(session)
//! ```
//!
//! `Faulted` 状态下仍允许写入，保证关机例程能把通道归零。

use gasmix_device::{DeviceError, FlowChannel};
use std::fmt;
use std::time::Instant;
use tracing::{error, info, warn};

/// 通道编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    /// 通道 1：目标气
    Target,
    /// 通道 2：稀释气
    Diluent,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::Target, ChannelId::Diluent];

    pub fn index(self) -> usize {
        match self {
            ChannelId::Target => 0,
            ChannelId::Diluent => 1,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelId::Target => write!(f, "channel1 (target)"),
            ChannelId::Diluent => write!(f, "channel2 (diluent)"),
        }
    }
}

/// 已建立的连接
#[derive(Debug, Clone)]
pub struct ChannelSession {
    pub port: String,
    pub connected_at: Instant,
}

#[derive(Debug, Clone)]
pub enum ConnectionState {
    Disconnected,
    Connected(ChannelSession),
    Faulted(DeviceError),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self, ConnectionState::Faulted(_))
    }
}

/// 单路通道：设备 + 连接状态
pub struct ChannelLink {
    id: ChannelId,
    device: Box<dyn FlowChannel>,
    state: ConnectionState,
}

impl ChannelLink {
    pub fn new(id: ChannelId, device: Box<dyn FlowChannel>) -> Self {
        Self {
            id,
            device,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn port(&self) -> &str {
        self.device.port()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn connect(&mut self) -> Result<(), DeviceError> {
        match self.device.connect() {
            Ok(()) => {
                info!(channel = %self.id, port = self.device.port(), "Channel connected");
                self.state = ConnectionState::Connected(ChannelSession {
                    port: self.device.port().to_string(),
                    connected_at: Instant::now(),
                });
                Ok(())
            },
            Err(e) => {
                error!(channel = %self.id, port = self.device.port(), "Connect failed: {}", e);
                self.state = ConnectionState::Faulted(e.clone());
                Err(e)
            },
        }
    }

    /// 单次写入
    ///
    /// 未连接时直接返回 `NotConnected`，不触碰设备。
    pub fn write(&mut self, sccm: f64) -> Result<(), DeviceError> {
        if matches!(self.state, ConnectionState::Disconnected) {
            return Err(DeviceError::NotConnected);
        }
        self.device.set_flow_rate(sccm)
    }

    /// 重试耗尽后标记故障
    pub fn mark_faulted(&mut self, err: DeviceError) {
        warn!(channel = %self.id, "Channel faulted: {}", err);
        self.state = ConnectionState::Faulted(err);
    }

    /// 读实测流量（失败退化为 0）
    pub fn measured_flow(&mut self) -> f64 {
        if matches!(self.state, ConnectionState::Disconnected) {
            return 0.0;
        }
        self.device.get_measured_flow()
    }

    /// 读设备当前设定值（失败退化为 0）
    pub fn current_setpoint(&mut self) -> f64 {
        if matches!(self.state, ConnectionState::Disconnected) {
            return 0.0;
        }
        self.device.get_current_setpoint()
    }
}

impl fmt::Debug for ChannelLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelLink")
            .field("id", &self.id)
            .field("port", &self.device.port())
            .field("state", &self.state)
            .finish()
    }
}
