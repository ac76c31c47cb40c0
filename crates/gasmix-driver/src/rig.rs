//! 混气台实例
//!
//! 两路通道各自在 `parking_lot::Mutex` 之后，传感器同理；
//! 锁只在单次设备调用期间持有，退避等待期间不持锁，
//! 因此关机例程总能在一个设备往返内拿到通道。

use crate::error::{DeviceCommandError, DriverError};
use crate::flag::RunFlag;
use crate::link::{ChannelId, ChannelLink, ConnectionState};
use crate::metrics::RigMetrics;
use crate::retry::{RetryOutcome, RetryPolicy, RetryingDeviceCommand};
use gasmix_device::{CalibrationStore, ConcentrationSensor, DeviceError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

struct RigInner {
    channels: [Mutex<ChannelLink>; 2],
    sensor: Mutex<Box<dyn ConcentrationSensor>>,
    calibration: CalibrationStore,
    /// 当前占用者（执行器 / 标定 / 冲洗 ...）
    activity: Mutex<Option<String>>,
    metrics: RigMetrics,
}

/// 混气台句柄
///
/// Clone 只复制 `Arc`，可以自由传给后台线程。
#[derive(Clone)]
pub struct Rig {
    inner: Arc<RigInner>,
}

impl Rig {
    pub(crate) fn from_parts(
        target: ChannelLink,
        diluent: ChannelLink,
        sensor: Box<dyn ConcentrationSensor>,
    ) -> Self {
        let calibration = sensor.calibration().clone();
        Self {
            inner: Arc::new(RigInner {
                channels: [Mutex::new(target), Mutex::new(diluent)],
                sensor: Mutex::new(sensor),
                calibration,
                activity: Mutex::new(None),
                metrics: RigMetrics::new(),
            }),
        }
    }

    fn link(&self, id: ChannelId) -> &Mutex<ChannelLink> {
        &self.inner.channels[id.index()]
    }

    /// 连接两路通道和传感器
    ///
    /// 所有设备都会尝试连接；返回第一个错误。
    pub fn connect_all(&self) -> Result<(), DriverError> {
        let mut first_err = None;
        for id in ChannelId::ALL {
            if let Err(e) = self.connect_channel(id) {
                first_err.get_or_insert(e);
            }
        }
        if let Err(e) = self.inner.sensor.lock().connect() {
            warn!("Sensor connect failed: {}", e);
            first_err.get_or_insert(e);
        }
        match first_err {
            Some(e) => Err(DriverError::Device(e)),
            None => {
                info!("Rig connected");
                Ok(())
            },
        }
    }

    pub fn connect_channel(&self, id: ChannelId) -> Result<(), DeviceError> {
        self.link(id).lock().connect()
    }

    pub fn connection_state(&self, id: ChannelId) -> ConnectionState {
        self.link(id).lock().state().clone()
    }

    pub fn port(&self, id: ChannelId) -> String {
        self.link(id).lock().port().to_string()
    }

    /// 单次写入（不重试）
    pub fn set_flow(&self, id: ChannelId, sccm: f64) -> Result<(), DeviceError> {
        let result = self.link(id).lock().write(sccm);
        match &result {
            Ok(()) => RigMetrics::incr(&self.inner.metrics.writes_ok),
            Err(_) => RigMetrics::incr(&self.inner.metrics.writes_failed),
        }
        result
    }

    /// 按策略重试写入
    ///
    /// 重试耗尽时通道进入 `Faulted`。`cancel` 被清除时提前结束，返回 `Cancelled`。
    pub fn command_flow(
        &self,
        id: ChannelId,
        sccm: f64,
        policy: RetryPolicy,
        cancel: Option<&RunFlag>,
    ) -> Result<RetryOutcome, DeviceCommandError> {
        let mut command = RetryingDeviceCommand::new(id, policy);
        if let Some(flag) = cancel {
            command = command.with_cancel(flag);
        }

        let metrics = &self.inner.metrics;
        let result = command.execute(|_attempt| self.set_flow(id, sccm));
        match &result {
            Ok(outcome) => {
                let retries = u64::from(outcome.attempts().saturating_sub(1));
                metrics.write_retries.fetch_add(retries, Ordering::Relaxed);
                if !outcome.is_completed() {
                    RigMetrics::incr(&metrics.commands_cancelled);
                }
            },
            Err(e) => {
                let retries = u64::from(e.attempts.saturating_sub(1));
                metrics.write_retries.fetch_add(retries, Ordering::Relaxed);
                RigMetrics::incr(&metrics.commands_exhausted);
                self.link(id).lock().mark_faulted(e.last.clone());
            },
        }
        result
    }

    /// 实测流量（失败退化为 0）
    pub fn measured_flow(&self, id: ChannelId) -> f64 {
        self.link(id).lock().measured_flow()
    }

    /// 设备当前设定值（失败退化为 0）
    pub fn current_setpoint(&self, id: ChannelId) -> f64 {
        self.link(id).lock().current_setpoint()
    }

    /// 浓度（ppm，失败退化为 0）
    pub fn read_ppm(&self) -> f64 {
        self.inner.sensor.lock().read_ppm()
    }

    /// 原始电压（V，失败退化为 0）
    pub fn read_raw_voltage(&self) -> f64 {
        self.inner.sensor.lock().read_raw_voltage()
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.inner.calibration
    }

    pub fn metrics(&self) -> &RigMetrics {
        &self.inner.metrics
    }

    /// 获取独占活动锁
    ///
    /// 同一时刻只允许一个序列运行或分步流程；返回的 guard 释放时解锁。
    pub fn try_acquire(&self, holder: &str) -> Result<ActivityGuard, DriverError> {
        let mut activity = self.inner.activity.lock();
        if let Some(current) = activity.as_ref() {
            return Err(DriverError::Busy {
                holder: current.clone(),
            });
        }
        *activity = Some(holder.to_string());
        info!(holder, "Rig acquired");
        Ok(ActivityGuard { rig: self.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.inner.activity.lock().is_some()
    }

    pub fn active_holder(&self) -> Option<String> {
        self.inner.activity.lock().clone()
    }
}

impl std::fmt::Debug for Rig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rig")
            .field("target", &*self.link(ChannelId::Target).lock())
            .field("diluent", &*self.link(ChannelId::Diluent).lock())
            .field("calibration", &self.inner.calibration.current())
            .field("holder", &*self.inner.activity.lock())
            .finish()
    }
}

/// 活动锁 guard（RAII）
///
/// 成功、失败、panic 展开都会释放。
pub struct ActivityGuard {
    rig: Rig,
}

impl ActivityGuard {
    pub fn holder(&self) -> Option<String> {
        self.rig.active_holder()
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        if let Some(holder) = self.rig.inner.activity.lock().take() {
            info!(holder = %holder, "Rig released");
        }
    }
}

impl std::fmt::Debug for ActivityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityGuard")
            .field("holder", &self.holder())
            .finish()
    }
}
