//! 集成测试共用的 Mock 混气台

#![allow(dead_code)]

use gasmix_sdk::device::mock::{MockChannelProbe, MockFlowChannel, MockSensor, MockSensorProbe};
use gasmix_sdk::prelude::*;
use std::time::Duration;

pub struct MockRig {
    pub rig: Rig,
    pub target: MockChannelProbe,
    pub diluent: MockChannelProbe,
    pub sensor: MockSensorProbe,
}

impl MockRig {
    pub fn connected() -> Self {
        let (ch1, target) = MockFlowChannel::new("mock://channel1");
        let (ch2, diluent) = MockFlowChannel::new("mock://channel2");
        let (sensor_dev, sensor) = MockSensor::new(CalibrationStore::default());
        let rig = RigBuilder::new()
            .target_channel(ch1)
            .diluent_channel(ch2)
            .sensor(sensor_dev)
            .build()
            .expect("mock rig");
        rig.connect_all().expect("mock connect");
        Self {
            rig,
            target,
            diluent,
            sensor,
        }
    }

    pub fn both_at_zero(&self) -> bool {
        self.target.setpoint() == 0.0 && self.diluent.setpoint() == 0.0
    }
}

/// 测试用执行器配置：5ms tick，快速倒计时
pub fn fast_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        min_tick_period: Duration::from_millis(5),
        countdown_period: Duration::from_millis(20),
        ..ExecutorConfig::default()
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(20))
}
