//! Mock 后端（feature = "mock"）
//!
//! 脚本化的流量通道与传感器，配合 probe 句柄在测试中注入故障、检查写入记录。
//! 设备本体交给被测代码，probe 留在测试线程。

use crate::{
    CalibrationStore, ConcentrationSensor, DeviceError, DeviceFault, DeviceFaultKind, FlowChannel,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ChannelState {
    /// 成功写入的设定值（按时间顺序）
    writes: Mutex<Vec<f64>>,
    /// 每次写尝试的时间戳（包括失败的）
    attempt_times: Mutex<Vec<Instant>>,
    setpoint: Mutex<f64>,
    measured_override: Mutex<Option<f64>>,
    write_delay: Mutex<Duration>,
    connects: AtomicU64,
    fail_next_writes: AtomicU32,
    fail_nonzero_writes: AtomicBool,
    fail_all_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_connect: AtomicBool,
}

/// Mock 流量通道
#[derive(Debug)]
pub struct MockFlowChannel {
    port: String,
    state: Arc<ChannelState>,
}

/// Mock 流量通道的观测/控制句柄
#[derive(Debug, Clone)]
pub struct MockChannelProbe {
    state: Arc<ChannelState>,
}

impl MockFlowChannel {
    pub fn new(port: impl Into<String>) -> (Self, MockChannelProbe) {
        let state = Arc::new(ChannelState::default());
        (
            Self {
                port: port.into(),
                state: state.clone(),
            },
            MockChannelProbe { state },
        )
    }
}

impl FlowChannel for MockFlowChannel {
    fn port(&self) -> &str {
        &self.port
    }

    fn connect(&mut self) -> Result<(), DeviceError> {
        self.state.connects.fetch_add(1, Ordering::Relaxed);
        if self.state.fail_connect.load(Ordering::Relaxed) {
            return Err(DeviceFault::new(DeviceFaultKind::NotFound, "mock port missing").into());
        }
        Ok(())
    }

    fn set_flow_rate(&mut self, sccm: f64) -> Result<(), DeviceError> {
        self.state.attempt_times.lock().push(Instant::now());

        let delay = *self.state.write_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let scripted_failure = self
            .state
            .fail_next_writes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        let fail = scripted_failure
            || self.state.fail_all_writes.load(Ordering::Relaxed)
            || (sccm != 0.0 && self.state.fail_nonzero_writes.load(Ordering::Relaxed));
        if fail {
            return Err(DeviceError::Timeout);
        }

        *self.state.setpoint.lock() = sccm;
        self.state.writes.lock().push(sccm);
        Ok(())
    }

    fn read_measured_flow(&mut self) -> Result<f64, DeviceError> {
        if self.state.fail_reads.load(Ordering::Relaxed) {
            return Err(DeviceError::Timeout);
        }
        let measured = *self.state.measured_override.lock();
        Ok(measured.unwrap_or(*self.state.setpoint.lock()))
    }

    fn read_setpoint(&mut self) -> Result<f64, DeviceError> {
        if self.state.fail_reads.load(Ordering::Relaxed) {
            return Err(DeviceError::Timeout);
        }
        Ok(*self.state.setpoint.lock())
    }
}

impl MockChannelProbe {
    /// 成功写入的设定值序列
    pub fn writes(&self) -> Vec<f64> {
        self.state.writes.lock().clone()
    }

    pub fn last_write(&self) -> Option<f64> {
        self.state.writes.lock().last().copied()
    }

    /// 设备当前设定值（最后一次成功写入，初始为 0）
    pub fn setpoint(&self) -> f64 {
        *self.state.setpoint.lock()
    }

    /// 写尝试次数（包括失败）
    pub fn attempts(&self) -> usize {
        self.state.attempt_times.lock().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.attempt_times.lock().clone()
    }

    pub fn connects(&self) -> u64 {
        self.state.connects.load(Ordering::Relaxed)
    }

    /// 接下来的 `n` 次写入失败
    pub fn fail_next_writes(&self, n: u32) {
        self.state.fail_next_writes.store(n, Ordering::Release);
    }

    /// 非零写入一律失败（写 0 仍然成功）
    pub fn fail_nonzero_writes(&self, fail: bool) {
        self.state.fail_nonzero_writes.store(fail, Ordering::Relaxed);
    }

    pub fn fail_all_writes(&self, fail: bool) {
        self.state.fail_all_writes.store(fail, Ordering::Relaxed);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.fail_connect.store(fail, Ordering::Relaxed);
    }

    /// 固定实测流量（默认跟随设定值）
    pub fn set_measured(&self, flow: Option<f64>) {
        *self.state.measured_override.lock() = flow;
    }

    /// 每次写入的额外延时（模拟慢速设备）
    pub fn set_write_delay(&self, delay: Duration) {
        *self.state.write_delay.lock() = delay;
    }

    pub fn clear_writes(&self) {
        self.state.writes.lock().clear();
        self.state.attempt_times.lock().clear();
    }
}

#[derive(Debug, Default)]
struct SensorState {
    voltage: Mutex<f64>,
    script: Mutex<VecDeque<f64>>,
    reads: AtomicU64,
    fail: AtomicBool,
}

/// Mock 浓度传感器
///
/// 优先消费脚本队列中的电压，队列空后返回固定电压。
#[derive(Debug)]
pub struct MockSensor {
    state: Arc<SensorState>,
    calibration: CalibrationStore,
}

#[derive(Debug, Clone)]
pub struct MockSensorProbe {
    state: Arc<SensorState>,
    calibration: CalibrationStore,
}

impl MockSensor {
    pub fn new(calibration: CalibrationStore) -> (Self, MockSensorProbe) {
        let state = Arc::new(SensorState::default());
        (
            Self {
                state: state.clone(),
                calibration: calibration.clone(),
            },
            MockSensorProbe { state, calibration },
        )
    }
}

impl ConcentrationSensor for MockSensor {
    fn sample_voltage(&mut self) -> Result<f64, DeviceError> {
        self.state.reads.fetch_add(1, Ordering::Relaxed);
        if self.state.fail.load(Ordering::Relaxed) {
            return Err(DeviceError::Timeout);
        }
        if let Some(v) = self.state.script.lock().pop_front() {
            return Ok(v);
        }
        Ok(*self.state.voltage.lock())
    }

    fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }
}

impl MockSensorProbe {
    pub fn set_voltage(&self, voltage: f64) {
        *self.state.voltage.lock() = voltage;
    }

    /// 按当前标定区间设置等效浓度
    pub fn set_ppm(&self, ppm: f64) {
        let voltage = self.calibration.current().ppm_to_voltage(ppm);
        self.set_voltage(voltage);
    }

    pub fn push_script(&self, voltages: impl IntoIterator<Item = f64>) {
        self.state.script.lock().extend(voltages);
    }

    pub fn fail(&self, fail: bool) {
        self.state.fail.store(fail, Ordering::Relaxed);
    }

    pub fn reads(&self) -> u64 {
        self.state.reads.load(Ordering::Relaxed)
    }
}
