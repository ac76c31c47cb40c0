//! 关机例程
//!
//! 所有退出路径（自然结束、用户停止、命令失败、流程结束）都汇聚到这里：
//! 1. 清除运行/监控标志
//! 2. 两路通道各写一次 0（单次尝试，互不影响）
//!
//! 例程从不返回错误，可以重复调用。

use crate::flag::RunFlag;
use crate::link::ChannelId;
use crate::metrics::RigMetrics;
use crate::rig::Rig;
use gasmix_device::DeviceError;
use tracing::{error, info};

/// 关机结果
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// 按 `ChannelId::index()` 排列的归零结果
    pub channels: [Result<(), DeviceError>; 2],
}

impl ShutdownReport {
    /// 两路都成功归零
    pub fn is_clean(&self) -> bool {
        self.channels.iter().all(|r| r.is_ok())
    }

    pub fn channel(&self, id: ChannelId) -> &Result<(), DeviceError> {
        &self.channels[id.index()]
    }
}

/// 执行关机例程
pub fn shutdown(rig: &Rig, flags: &[&RunFlag]) -> ShutdownReport {
    for flag in flags {
        flag.clear();
    }

    let channels = ChannelId::ALL.map(|id| {
        let result = rig.set_flow(id, 0.0);
        if let Err(e) = &result {
            error!(channel = %id, "Failed to zero channel during shutdown: {}", e);
        }
        result
    });

    RigMetrics::incr(&rig.metrics().shutdowns);
    let report = ShutdownReport { channels };
    if report.is_clean() {
        info!("Shutdown complete: both channels at zero");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RigBuilder;
    use gasmix_device::CalibrationStore;
    use gasmix_device::mock::{MockFlowChannel, MockSensor};

    #[test]
    fn test_shutdown_zeroes_both_even_if_one_fails() {
        let (ch1, p1) = MockFlowChannel::new("mock0");
        let (ch2, p2) = MockFlowChannel::new("mock1");
        let (sensor, _) = MockSensor::new(CalibrationStore::default());
        let rig = RigBuilder::new()
            .target_channel(ch1)
            .diluent_channel(ch2)
            .sensor(sensor)
            .build()
            .unwrap();
        rig.connect_all().unwrap();
        rig.set_flow(ChannelId::Target, 40.0).unwrap();
        rig.set_flow(ChannelId::Diluent, 60.0).unwrap();

        p1.fail_all_writes(true);
        let flag = RunFlag::raised();
        let report = shutdown(&rig, &[&flag]);

        assert!(!flag.is_set());
        assert!(!report.is_clean());
        assert!(report.channel(ChannelId::Target).is_err());
        assert!(report.channel(ChannelId::Diluent).is_ok());
        assert_eq!(p2.setpoint(), 0.0);

        // 再来一次：仍然不报错
        p1.fail_all_writes(false);
        let report = shutdown(&rig, &[&flag]);
        assert!(report.is_clean());
        assert_eq!(p1.setpoint(), 0.0);
        assert_eq!(rig.metrics().snapshot().shutdowns, 2);
    }
}
