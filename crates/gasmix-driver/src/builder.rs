//! Builder 模式实现
//!
//! 提供链式构造 [`Rig`] 实例的便捷方式。

use crate::error::DriverError;
use crate::link::{ChannelId, ChannelLink};
use crate::rig::Rig;
use gasmix_device::{ConcentrationSensor, FlowChannel};

/// Rig Builder（链式构造）
///
/// 传感器自带的 `CalibrationStore` 即混气台共享的标定存储。
///
/// # Example
///
/// ```no_run
/// use gasmix_driver::{CalibrationStore, RigBuilder};
/// use gasmix_device::SimulatedRig;
///
/// let sim = SimulatedRig::default();
/// let rig = RigBuilder::new()
///     .target_channel(sim.target_channel("sim0"))
///     .diluent_channel(sim.diluent_channel("sim1"))
///     .sensor(sim.sensor(CalibrationStore::default()))
///     .build()
///     .unwrap();
/// rig.connect_all().unwrap();
/// ```
#[derive(Default)]
pub struct RigBuilder {
    target: Option<Box<dyn FlowChannel>>,
    diluent: Option<Box<dyn FlowChannel>>,
    sensor: Option<Box<dyn ConcentrationSensor>>,
}

impl RigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通道 1（目标气）
    pub fn target_channel(mut self, channel: impl FlowChannel + 'static) -> Self {
        self.target = Some(Box::new(channel));
        self
    }

    /// 通道 2（稀释气）
    pub fn diluent_channel(mut self, channel: impl FlowChannel + 'static) -> Self {
        self.diluent = Some(Box::new(channel));
        self
    }

    pub fn sensor(mut self, sensor: impl ConcentrationSensor + 'static) -> Self {
        self.sensor = Some(Box::new(sensor));
        self
    }

    /// 从仿真混气台装配
    #[cfg(feature = "sim")]
    pub fn simulated(
        sim: &gasmix_device::SimulatedRig,
        calibration: gasmix_device::CalibrationStore,
    ) -> Self {
        Self::new()
            .target_channel(sim.target_channel("sim://channel1"))
            .diluent_channel(sim.diluent_channel("sim://channel2"))
            .sensor(sim.sensor(calibration))
    }

    /// 构造 Rig（不连接设备，需调用 `connect_all`）
    pub fn build(self) -> Result<Rig, DriverError> {
        let target = self
            .target
            .ok_or_else(|| DriverError::InvalidConfig("target channel not set".into()))?;
        let diluent = self
            .diluent
            .ok_or_else(|| DriverError::InvalidConfig("diluent channel not set".into()))?;
        let sensor = self
            .sensor
            .ok_or_else(|| DriverError::InvalidConfig("concentration sensor not set".into()))?;

        Ok(Rig::from_parts(
            ChannelLink::new(ChannelId::Target, target),
            ChannelLink::new(ChannelId::Diluent, diluent),
            sensor,
        ))
    }
}
