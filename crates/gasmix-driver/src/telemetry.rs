//! TelemetrySampler - 后台遥测采样
//!
//! 活动标志置位期间，按固定周期读取两路实测流量与浓度，
//! 交给 [`TelemetrySink`]。采样线程从不触碰前台状态，
//! 前台通过事件队列拿到快照后在自己的线程里处理。
//!
//! 停止：任意线程清除活动标志，下一个周期边界生效。

use crate::error::DriverError;
use crate::flag::RunFlag;
use crate::link::ChannelId;
use crate::metrics::RigMetrics;
use crate::rig::Rig;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

/// 单次采样结果
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TelemetrySnapshot {
    pub channel1_measured_flow: f64,
    pub channel2_measured_flow: f64,
    pub concentration_ppm: f64,
    pub tick_index: u64,
}

impl TelemetrySnapshot {
    /// 采样一次（读失败的量为 0）
    pub fn capture(rig: &Rig, tick_index: u64) -> Self {
        Self {
            channel1_measured_flow: rig.measured_flow(ChannelId::Target),
            channel2_measured_flow: rig.measured_flow(ChannelId::Diluent),
            concentration_ppm: rig.read_ppm(),
            tick_index,
        }
    }
}

/// 采样配置
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// 采样周期
    pub interval: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
        }
    }
}

/// 快照消费者
pub trait TelemetrySink: Send + 'static {
    fn publish(&self, snapshot: TelemetrySnapshot);
}

impl<F> TelemetrySink for F
where
    F: Fn(TelemetrySnapshot) + Send + 'static,
{
    fn publish(&self, snapshot: TelemetrySnapshot) {
        self(snapshot)
    }
}

/// 遥测采样器
pub struct TelemetrySampler {
    handle: Option<thread::JoinHandle<u64>>,
    active: RunFlag,
}

impl TelemetrySampler {
    /// 启动采样线程
    pub fn start(
        rig: Rig,
        config: TelemetryConfig,
        sink: impl TelemetrySink,
    ) -> Result<Self, DriverError> {
        Self::start_with_flag(rig, config, sink, RunFlag::new())
    }

    /// 使用外部活动标志启动
    ///
    /// 关机例程清除同一个标志即可停止采样。
    pub fn start_with_flag(
        rig: Rig,
        config: TelemetryConfig,
        sink: impl TelemetrySink,
        active: RunFlag,
    ) -> Result<Self, DriverError> {
        active.raise();
        let flag = active.clone();
        let handle = thread::Builder::new()
            .name("gasmix-telemetry".into())
            .spawn(move || Self::sample_loop(rig, config, sink, flag))
            .map_err(|e| {
                active.clear();
                DriverError::Spawn(e)
            })?;

        Ok(Self {
            handle: Some(handle),
            active,
        })
    }

    /// 采样循环，返回完成的周期数
    fn sample_loop(
        rig: Rig,
        config: TelemetryConfig,
        sink: impl TelemetrySink,
        active: RunFlag,
    ) -> u64 {
        debug!(interval = ?config.interval, "Telemetry sampler started");
        let mut tick = 0u64;
        while active.is_set() {
            let snapshot = TelemetrySnapshot::capture(&rig, tick);
            trace!(?snapshot, "telemetry");
            sink.publish(snapshot);
            RigMetrics::incr(&rig.metrics().telemetry_cycles);
            tick += 1;

            if !active.sleep(config.interval) {
                break;
            }
        }
        debug!(cycles = tick, "Telemetry sampler stopped");
        tick
    }

    /// 请求停止（下一个周期边界生效）
    pub fn stop(&self) {
        self.active.clear();
    }

    pub fn active_flag(&self) -> RunFlag {
        self.active.clone()
    }

    pub fn is_running(&self) -> bool {
        self.active.is_set()
    }

    /// 停止并等待线程结束，返回采样周期数
    pub fn join(mut self) -> u64 {
        self.active.clear();
        self.handle
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(0)
    }
}

impl Drop for TelemetrySampler {
    fn drop(&mut self) {
        self.active.clear();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RigBuilder;
    use gasmix_device::CalibrationStore;
    use gasmix_device::mock::{MockFlowChannel, MockSensor};
    use std::sync::mpsc;
    use std::time::Instant;

    fn rig_with_flows(ch1_flow: f64, ch2_flow: f64) -> Rig {
        let (ch1, _) = MockFlowChannel::new("mock0");
        let (ch2, p2) = MockFlowChannel::new("mock1");
        let (sensor, ps) = MockSensor::new(CalibrationStore::default());
        ps.set_ppm(1_000.0);
        let rig = RigBuilder::new()
            .target_channel(ch1)
            .diluent_channel(ch2)
            .sensor(sensor)
            .build()
            .unwrap();
        rig.connect_all().unwrap();
        rig.set_flow(ChannelId::Target, ch1_flow).unwrap();
        rig.set_flow(ChannelId::Diluent, ch2_flow).unwrap();
        p2.fail_reads(true);
        rig
    }

    #[test]
    fn test_sampler_publishes_snapshots() {
        let rig = rig_with_flows(10.0, 90.0);
        let (tx, rx) = mpsc::channel();
        let sampler = TelemetrySampler::start(
            rig,
            TelemetryConfig {
                interval: Duration::from_millis(10),
            },
            move |snap: TelemetrySnapshot| {
                let _ = tx.send(snap);
            },
        )
        .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(first.tick_index, 0);
        assert_eq!(second.tick_index, 1);
        assert_eq!(first.channel1_measured_flow, 10.0);
        // 读失败退化为 0
        assert_eq!(first.channel2_measured_flow, 0.0);
        assert!((first.concentration_ppm - 1_000.0).abs() < 1e-6);

        assert!(sampler.join() >= 2);
    }

    #[test]
    fn test_stop_from_other_thread() {
        let rig = rig_with_flows(0.0, 0.0);
        let sampler = TelemetrySampler::start(
            rig,
            TelemetryConfig {
                interval: Duration::from_secs(10),
            },
            |_snap: TelemetrySnapshot| {},
        )
        .unwrap();
        assert!(sampler.is_running());

        let flag = sampler.active_flag();
        let start = Instant::now();
        thread::spawn(move || flag.clear()).join().unwrap();
        let cycles = sampler.join();

        // 清除可能发生在第一个周期之前
        assert!(cycles <= 1);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_default_interval() {
        assert_eq!(TelemetryConfig::default().interval, Duration::from_millis(500));
    }
}
