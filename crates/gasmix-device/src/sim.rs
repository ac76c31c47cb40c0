//! 仿真后端
//!
//! 两路仿真 MFC 共享一个混合腔模型，仿真传感器读取混合腔浓度：
//!
//! ```text
//! target = source_ppm * q1 / (q1 + q2)
//! c(t+dt) = c + (target - c) * (1 - exp(-dt / tau))
//! ```
//!
//! 总流量为 0 时腔内浓度保持不变（无气体交换）。
//! 每次 IO 都会按 `io_latency` 休眠，模拟串口往返时间。

use crate::{
    CalibrationRange, CalibrationStore, ConcentrationSensor, DeviceError, FlowChannel,
    check_flow_range,
};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 仿真参数
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// 目标气源浓度（ppm）
    pub source_ppm: f64,
    /// 混合腔时间常数
    pub time_constant: Duration,
    /// 单次设备 IO 往返时间
    pub io_latency: Duration,
    /// 传感器噪声幅度（ppm，均匀分布 ±）
    pub sensor_noise_ppm: f64,
    /// 流量读数的相对噪声（比例，均匀分布 ±）
    pub flow_noise_ratio: f64,
    /// 传感器物理特性曲线
    pub sensor_curve: CalibrationRange,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            source_ppm: 20_000.0,
            time_constant: Duration::from_secs(8),
            io_latency: Duration::from_millis(20),
            sensor_noise_ppm: 15.0,
            flow_noise_ratio: 0.005,
            sensor_curve: CalibrationRange::default(),
        }
    }
}

#[derive(Debug)]
struct ChamberState {
    flows: [f64; 2],
    concentration: f64,
    last_update: Instant,
}

/// 混合腔（两路通道与传感器共享）
#[derive(Debug)]
pub struct MixingChamber {
    config: SimConfig,
    state: Mutex<ChamberState>,
}

impl MixingChamber {
    fn new(config: SimConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ChamberState {
                flows: [0.0; 2],
                concentration: 0.0,
                last_update: Instant::now(),
            }),
        }
    }

    /// 推进模型到当前时刻
    fn advance(&self, state: &mut ChamberState) {
        let now = Instant::now();
        let dt = now.duration_since(state.last_update).as_secs_f64();
        state.last_update = now;

        let total = state.flows[0] + state.flows[1];
        if total <= f64::EPSILON {
            return;
        }
        let target = self.config.source_ppm * state.flows[0] / total;
        let tau = self.config.time_constant.as_secs_f64().max(1e-3);
        state.concentration += (target - state.concentration) * (1.0 - (-dt / tau).exp());
    }

    fn set_flow(&self, slot: usize, sccm: f64) {
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.flows[slot] = sccm;
    }

    fn flow(&self, slot: usize) -> f64 {
        self.state.lock().flows[slot]
    }

    /// 当前腔内浓度（ppm）
    pub fn concentration(&self) -> f64 {
        let mut state = self.state.lock();
        self.advance(&mut state);
        state.concentration
    }
}

/// 仿真混气台：产出两路通道与一个传感器
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    chamber: Arc<MixingChamber>,
}

impl SimulatedRig {
    pub fn new(config: SimConfig) -> Self {
        debug!(
            source_ppm = config.source_ppm,
            tau_s = config.time_constant.as_secs_f64(),
            "Creating simulated mixing rig"
        );
        Self {
            chamber: Arc::new(MixingChamber::new(config)),
        }
    }

    /// 目标气通道（通道 1）
    pub fn target_channel(&self, port: impl Into<String>) -> SimFlowChannel {
        SimFlowChannel::new(port.into(), 0, self.chamber.clone())
    }

    /// 稀释气通道（通道 2）
    pub fn diluent_channel(&self, port: impl Into<String>) -> SimFlowChannel {
        SimFlowChannel::new(port.into(), 1, self.chamber.clone())
    }

    pub fn sensor(&self, calibration: CalibrationStore) -> SimSensor {
        SimSensor {
            chamber: self.chamber.clone(),
            calibration,
        }
    }

    pub fn chamber(&self) -> &MixingChamber {
        &self.chamber
    }
}

impl Default for SimulatedRig {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

/// 仿真 MFC
#[derive(Debug)]
pub struct SimFlowChannel {
    port: String,
    slot: usize,
    chamber: Arc<MixingChamber>,
    connected: bool,
}

impl SimFlowChannel {
    fn new(port: String, slot: usize, chamber: Arc<MixingChamber>) -> Self {
        Self {
            port,
            slot,
            chamber,
            connected: false,
        }
    }

    fn round_trip(&self) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        let latency = self.chamber.config.io_latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        Ok(())
    }
}

impl FlowChannel for SimFlowChannel {
    fn port(&self) -> &str {
        &self.port
    }

    fn connect(&mut self) -> Result<(), DeviceError> {
        self.connected = true;
        debug!(port = %self.port, "Simulated flow channel connected");
        Ok(())
    }

    fn set_flow_rate(&mut self, sccm: f64) -> Result<(), DeviceError> {
        check_flow_range(sccm)?;
        self.round_trip()?;
        trace!(port = %self.port, sccm, "sim write");
        self.chamber.set_flow(self.slot, sccm);
        Ok(())
    }

    fn read_measured_flow(&mut self) -> Result<f64, DeviceError> {
        self.round_trip()?;
        let flow = self.chamber.flow(self.slot);
        let ratio = self.chamber.config.flow_noise_ratio;
        if flow <= 0.0 || ratio <= 0.0 {
            return Ok(flow.max(0.0));
        }
        let noise = rand::thread_rng().gen_range(-ratio..=ratio);
        Ok((flow * (1.0 + noise)).max(0.0))
    }

    fn read_setpoint(&mut self) -> Result<f64, DeviceError> {
        self.round_trip()?;
        Ok(self.chamber.flow(self.slot))
    }
}

/// 仿真浓度传感器
#[derive(Debug)]
pub struct SimSensor {
    chamber: Arc<MixingChamber>,
    calibration: CalibrationStore,
}

impl ConcentrationSensor for SimSensor {
    fn sample_voltage(&mut self) -> Result<f64, DeviceError> {
        let config = &self.chamber.config;
        if !config.io_latency.is_zero() {
            std::thread::sleep(config.io_latency);
        }
        let mut ppm = self.chamber.concentration();
        if config.sensor_noise_ppm > 0.0 {
            let n = config.sensor_noise_ppm;
            ppm += rand::thread_rng().gen_range(-n..=n);
        }
        Ok(config.sensor_curve.ppm_to_voltage(ppm))
    }

    fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }
}
