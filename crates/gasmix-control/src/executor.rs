//! SequenceExecutor - 闭环序列执行器
//!
//! 状态机：`Idle → Running → {Completed, Stopped}`，两个终态都经过关机例程，
//! `reset()` 把终态执行器带回 `Idle`。
//!
//! 控制循环在独立的工作线程中运行，每个 tick：
//! 1. 读浓度
//! 2. PID 计算控制信号
//! 3. 拆分总流量，写两路通道
//! 4. 向前台投递 [`ControlSample`]
//!
//! 运行标志在每个 tick 顶部和每个阶段边界检查；
//! `stop()` 可以在任意线程调用：运行中时清除标志并立即执行关机例程，
//! 工作线程退出（包括 panic unwind）时会再执行一次（例程是幂等的）。

use crate::countdown::Countdown;
use crate::error::ControlError;
use crate::events::{ControlSample, EventSender, RigEvent};
use crate::pid::{FlowSplit, PidController, PidGains};
use gasmix_driver::{
    ActivityGuard, AtomicRunState, ChannelId, DeviceCommandError, DriverError, RetryOutcome,
    RetryPolicy, Rig, RunFlag, RunState, ShutdownReport, TelemetryConfig, TelemetrySampler,
    shutdown,
};
use gasmix_tools::Sequence;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, trace, warn};

/// 两路总流量上限（sccm）
pub const MAX_TOTAL_FLOW_SCCM: f64 = 500.0;

/// 控制循环的写入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// 单次尝试；失败记录日志，循环继续
    #[default]
    BestEffort,
    /// 按策略重试；耗尽则中止运行
    Retry(RetryPolicy),
}

/// 执行器配置
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub write_mode: WriteMode,
    /// 最小 tick 周期（0 = 仅受设备 IO 限制）
    pub min_tick_period: Duration,
    /// 倒计时事件周期
    pub countdown_period: Duration,
    /// 运行期间的遥测采样（None = 不采样）
    pub telemetry: Option<TelemetryConfig>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::BestEffort,
            min_tick_period: Duration::ZERO,
            countdown_period: Duration::from_secs(1),
            telemetry: None,
        }
    }
}

/// 单次运行的结果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub final_state: RunState,
    pub stages_completed: usize,
    pub total_stages: usize,
    pub ticks: u64,
    pub elapsed: Duration,
    /// 中止运行的命令错误（仅 `WriteMode::Retry`）
    pub error: Option<DeviceCommandError>,
    pub shutdown: ShutdownReport,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.final_state == RunState::Completed
    }
}

struct Shared {
    state: AtomicRunState,
    running: RunFlag,
    /// 关机例程一并清除的监控标志
    monitors: Mutex<Vec<RunFlag>>,
}

impl Shared {
    fn shutdown(&self, rig: &Rig) -> ShutdownReport {
        let monitors = self.monitors.lock().clone();
        let mut flags: Vec<&RunFlag> = Vec::with_capacity(monitors.len() + 1);
        flags.push(&self.running);
        flags.extend(monitors.iter());
        shutdown(rig, &flags)
    }
}

/// 停止句柄（可克隆，可跨线程，例如 Ctrl-C 处理函数）
#[derive(Clone)]
pub struct StopHandle {
    rig: Rig,
    shared: Arc<Shared>,
}

impl StopHandle {
    /// 请求停止；运行中才立即归零两路通道
    ///
    /// 非运行状态只清除标志、不触碰设备，返回 `None`
    /// （此时混气台可能已被其他活动占用）。
    pub fn stop(&self) -> Option<ShutdownReport> {
        if self.shared.state.get() != RunState::Running {
            self.shared.running.clear();
            info!("Stop requested while not running, channels untouched");
            return None;
        }
        info!("Stop requested");
        Some(self.shared.shutdown(&self.rig))
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.get() == RunState::Running
    }
}

/// 序列执行器
///
/// # 示例
///
/// ```rust,no_run
/// use gasmix_control::{ExecutorConfig, PidGains, SequenceExecutor, event_channel};
/// use gasmix_driver::{CalibrationStore, RigBuilder};
/// use gasmix_device::SimulatedRig;
/// use gasmix_tools::validate_pairs;
///
/// let sim = SimulatedRig::default();
/// let rig = RigBuilder::simulated(&sim, CalibrationStore::default()).build().unwrap();
/// rig.connect_all().unwrap();
///
/// let (events, rx) = event_channel(256);
/// let executor = SequenceExecutor::new(rig, ExecutorConfig::default(), events);
/// executor
///     .start(validate_pairs("10,5000,5,3000").unwrap(), 100.0, PidGains::default())
///     .unwrap();
/// let report = executor.wait().unwrap();
/// println!("{:?}", report.final_state);
/// # drop(rx);
/// ```
pub struct SequenceExecutor {
    rig: Rig,
    config: ExecutorConfig,
    events: EventSender,
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<RunReport>>>,
}

impl SequenceExecutor {
    pub fn new(rig: Rig, config: ExecutorConfig, events: EventSender) -> Self {
        Self {
            rig,
            config,
            events,
            shared: Arc::new(Shared {
                state: AtomicRunState::new(RunState::Idle),
                running: RunFlag::new(),
                monitors: Mutex::new(Vec::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RunState {
        self.shared.state.get()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            rig: self.rig.clone(),
            shared: self.shared.clone(),
        }
    }

    /// 注册一个监控标志，关机例程会清除它
    pub fn add_monitor(&self, flag: RunFlag) {
        self.shared.monitors.lock().push(flag);
    }

    /// 开始运行（仅限 Idle）
    ///
    /// 重置 PID 状态，占用混气台，启动控制线程与倒计时。
    pub fn start(
        &self,
        sequence: Sequence,
        flow_setpoint: f64,
        gains: PidGains,
    ) -> Result<(), ControlError> {
        if !(flow_setpoint.is_finite()
            && flow_setpoint > 0.0
            && flow_setpoint <= MAX_TOTAL_FLOW_SCCM)
        {
            return Err(ControlError::InvalidFlowSetpoint(flow_setpoint));
        }

        if !self
            .shared
            .state
            .compare_exchange(RunState::Idle, RunState::Running)
        {
            return Err(ControlError::InvalidTransition {
                from: self.state(),
                to: RunState::Running,
            });
        }

        let guard = match self.rig.try_acquire("sequence run") {
            Ok(guard) => guard,
            Err(e) => {
                self.shared.state.set(RunState::Idle);
                return Err(e.into());
            },
        };
        self.shared.running.raise();

        let sampler = self.config.telemetry.clone().and_then(|cfg| {
            let flag = RunFlag::new();
            self.add_monitor(flag.clone());
            TelemetrySampler::start_with_flag(self.rig.clone(), cfg, self.events.clone(), flag)
                .map_err(|e| warn!("Telemetry sampler not started: {}", e))
                .ok()
        });

        let worker = RunWorker {
            rig: self.rig.clone(),
            config: self.config.clone(),
            events: self.events.clone(),
            shared: self.shared.clone(),
            sequence,
            flow_setpoint,
            gains,
            _guard: guard,
            sampler,
        };

        match thread::Builder::new()
            .name("gasmix-executor".into())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                Ok(())
            },
            Err(e) => {
                error!("Failed to spawn executor thread: {}", e);
                self.shared.shutdown(&self.rig);
                self.shared.state.set(RunState::Idle);
                Err(DriverError::Spawn(e).into())
            },
        }
    }

    /// 请求停止（任意线程），见 [`StopHandle::stop`]
    pub fn stop(&self) -> Option<ShutdownReport> {
        self.stop_handle().stop()
    }

    /// 等待当前运行结束
    pub fn wait(&self) -> Result<RunReport, ControlError> {
        let handle = self.worker.lock().take().ok_or(ControlError::NotStarted)?;
        match handle.join() {
            Ok(report) => Ok(report),
            Err(_) => {
                error!("Executor worker panicked");
                self.shared.shutdown(&self.rig);
                self.shared.state.set(RunState::Stopped);
                Err(ControlError::WorkerPanicked)
            },
        }
    }

    /// 终态 → Idle
    pub fn reset(&self) -> Result<(), ControlError> {
        match self.state() {
            RunState::Idle => Ok(()),
            RunState::Running => Err(ControlError::InvalidTransition {
                from: RunState::Running,
                to: RunState::Idle,
            }),
            RunState::Completed | RunState::Stopped => {
                if let Some(handle) = self.worker.lock().take() {
                    let _ = handle.join();
                }
                self.shared.state.set(RunState::Idle);
                Ok(())
            },
        }
    }
}

impl Drop for SequenceExecutor {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.lock().take() {
            if self.is_running() {
                self.stop();
            }
            let _ = handle.join();
        }
    }
}

/// 工作线程 unwind 时归零通道并进入 Stopped
struct UnwindGuard {
    rig: Rig,
    shared: Arc<Shared>,
}

impl Drop for UnwindGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Executor worker unwinding, zeroing both channels");
            self.shared.shutdown(&self.rig);
            self.shared.monitors.lock().clear();
            self.shared.state.set(RunState::Stopped);
        }
    }
}

/// 工作线程持有的运行上下文
struct RunWorker {
    rig: Rig,
    config: ExecutorConfig,
    events: EventSender,
    shared: Arc<Shared>,
    sequence: Sequence,
    flow_setpoint: f64,
    gains: PidGains,
    _guard: ActivityGuard,
    sampler: Option<TelemetrySampler>,
}

impl RunWorker {
    fn run(self) -> RunReport {
        let _unwind = UnwindGuard {
            rig: self.rig.clone(),
            shared: self.shared.clone(),
        };
        let started = Instant::now();
        let total_stages = self.sequence.len();
        let running = &self.shared.running;
        info!(
            stages = total_stages,
            flow_setpoint = self.flow_setpoint,
            gains = ?self.gains,
            "Sequence run started"
        );

        let countdown = Countdown::start(
            self.sequence.total_duration(),
            self.config.countdown_period,
            running.clone(),
            self.events.clone(),
        )
        .map_err(|e| warn!("Countdown not started: {}", e))
        .ok();

        // PID 状态每次运行重新开始，阶段之间保留
        let mut pid = PidController::new(self.gains);
        let mut ticks = 0u64;
        let mut stages_completed = 0usize;
        let mut error = None;

        'stages: for (index, stage) in self.sequence.iter().enumerate() {
            if !running.is_set() {
                break;
            }
            info!(
                stage = index + 1,
                total = total_stages,
                setpoint = stage.setpoint,
                duration_s = stage.duration_seconds,
                "Stage started"
            );
            self.events.send(RigEvent::StageStarted {
                index,
                total: total_stages,
                label: format!("{} ppm for {} s", stage.setpoint, stage.duration_seconds),
            });

            let stage_start = Instant::now();
            let stage_duration = stage.duration();
            while stage_start.elapsed() < stage_duration {
                if !running.is_set() {
                    break 'stages;
                }
                let tick_start = Instant::now();

                let measured = self.rig.read_ppm();
                let signal = pid.update(stage.setpoint, measured);
                let split = FlowSplit::from_signal(self.flow_setpoint, signal);
                if let Err(e) = self.write_split(split) {
                    error = Some(e);
                    break 'stages;
                }

                trace!(tick = ticks, measured, signal, ?split, "control tick");
                self.events.send(RigEvent::Control(ControlSample {
                    tick: ticks,
                    stage_index: index,
                    setpoint: stage.setpoint,
                    measured_ppm: measured,
                    control_signal: signal,
                    channel1_flow: split.channel1,
                    channel2_flow: split.channel2,
                }));
                ticks += 1;

                let spent = tick_start.elapsed();
                if spent < self.config.min_tick_period {
                    let stage_left = stage_duration.saturating_sub(stage_start.elapsed());
                    running.sleep((self.config.min_tick_period - spent).min(stage_left));
                }
            }

            if !running.is_set() {
                break;
            }
            stages_completed += 1;
        }

        let final_state = if error.is_none() && stages_completed == total_stages {
            RunState::Completed
        } else {
            RunState::Stopped
        };

        let shutdown_report = self.shared.shutdown(&self.rig);
        self.shared.monitors.lock().clear();
        if let Some(countdown) = countdown {
            countdown.stop();
        }
        let RunWorker {
            events,
            shared,
            sampler,
            _guard,
            ..
        } = self;
        drop(sampler);
        shared.state.set(final_state);
        drop(_guard);

        let report = RunReport {
            final_state,
            stages_completed,
            total_stages,
            ticks,
            elapsed: started.elapsed(),
            error,
            shutdown: shutdown_report,
        };
        match final_state {
            RunState::Completed => info!(ticks, "Sequence run completed"),
            _ => warn!(
                stages_completed,
                total_stages,
                error = ?report.error,
                "Sequence run stopped"
            ),
        }
        events.send(RigEvent::RunFinished(report.clone()));
        report
    }

    fn write_split(&self, split: FlowSplit) -> Result<(), DeviceCommandError> {
        let writes = [
            (ChannelId::Target, split.channel1),
            (ChannelId::Diluent, split.channel2),
        ];
        for (id, flow) in writes {
            match self.config.write_mode {
                WriteMode::BestEffort => {
                    if let Err(e) = self.rig.set_flow(id, flow) {
                        warn!(channel = %id, flow, "Flow write failed, continuing: {}", e);
                    }
                },
                WriteMode::Retry(policy) => {
                    let outcome =
                        self.rig
                            .command_flow(id, flow, policy, Some(&self.shared.running))?;
                    if let RetryOutcome::Cancelled { .. } = outcome {
                        return Ok(());
                    }
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event_channel;
    use gasmix_device::mock::{MockChannelProbe, MockFlowChannel, MockSensor, MockSensorProbe};
    use gasmix_device::{CalibrationStore, ConcentrationSensor, DeviceError};
    use gasmix_driver::RigBuilder;
    use gasmix_tools::validate_pairs;

    struct Fixture {
        rig: Rig,
        target: MockChannelProbe,
        diluent: MockChannelProbe,
        sensor: MockSensorProbe,
    }

    fn fixture() -> Fixture {
        let (ch1, target) = MockFlowChannel::new("mock0");
        let (ch2, diluent) = MockFlowChannel::new("mock1");
        let (sensor_dev, sensor) = MockSensor::new(CalibrationStore::default());
        let rig = RigBuilder::new()
            .target_channel(ch1)
            .diluent_channel(ch2)
            .sensor(sensor_dev)
            .build()
            .unwrap();
        rig.connect_all().unwrap();
        Fixture {
            rig,
            target,
            diluent,
            sensor,
        }
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            min_tick_period: Duration::from_millis(5),
            countdown_period: Duration::from_millis(50),
            ..ExecutorConfig::default()
        }
    }

    #[test]
    fn test_run_completes_and_zeroes() {
        let fx = fixture();
        fx.sensor.set_ppm(1_000.0);
        let executor = SequenceExecutor::new(fx.rig.clone(), fast_config(), EventSender::noop());

        executor
            .start(validate_pairs("0.05,5000,0.05,3000").unwrap(), 100.0, PidGains::default())
            .unwrap();
        assert_eq!(executor.state(), RunState::Running);
        assert!(fx.rig.is_busy());

        let report = executor.wait().unwrap();
        assert!(report.is_completed());
        assert_eq!(report.stages_completed, 2);
        assert!(report.ticks > 0);
        assert!(report.shutdown.is_clean());
        assert_eq!(executor.state(), RunState::Completed);
        assert_eq!(fx.target.setpoint(), 0.0);
        assert_eq!(fx.diluent.setpoint(), 0.0);
        assert!(!fx.rig.is_busy());
    }

    #[test]
    fn test_start_only_from_idle() {
        let fx = fixture();
        let executor = SequenceExecutor::new(fx.rig.clone(), fast_config(), EventSender::noop());
        let seq = validate_pairs("0.05,100").unwrap();

        executor.start(seq.clone(), 100.0, PidGains::default()).unwrap();
        assert!(matches!(
            executor.start(seq.clone(), 100.0, PidGains::default()),
            Err(ControlError::InvalidTransition {
                from: RunState::Running,
                ..
            })
        ));
        executor.wait().unwrap();

        // 终态需要 reset
        assert!(executor.start(seq.clone(), 100.0, PidGains::default()).is_err());
        executor.reset().unwrap();
        assert_eq!(executor.state(), RunState::Idle);
        executor.start(seq, 100.0, PidGains::default()).unwrap();
        executor.wait().unwrap();
    }

    #[test]
    fn test_invalid_flow_setpoint() {
        let fx = fixture();
        let executor = SequenceExecutor::new(fx.rig, fast_config(), EventSender::noop());
        let seq = validate_pairs("1,100").unwrap();
        for bad in [0.0, -5.0, 600.0, f64::NAN] {
            assert!(matches!(
                executor.start(seq.clone(), bad, PidGains::default()),
                Err(ControlError::InvalidFlowSetpoint(_))
            ));
        }
        assert_eq!(executor.state(), RunState::Idle);
    }

    #[test]
    fn test_busy_rig_rejected() {
        let fx = fixture();
        let _guard = fx.rig.try_acquire("calibration").unwrap();
        let executor = SequenceExecutor::new(fx.rig.clone(), fast_config(), EventSender::noop());
        let err = executor
            .start(validate_pairs("1,100").unwrap(), 100.0, PidGains::default())
            .unwrap_err();
        assert!(matches!(err, ControlError::Driver(DriverError::Busy { .. })));
        assert_eq!(executor.state(), RunState::Idle);
    }

    #[test]
    fn test_control_samples_published() {
        let fx = fixture();
        fx.sensor.set_ppm(2_000.0);
        let (events, rx) = event_channel(4096);
        let executor = SequenceExecutor::new(fx.rig.clone(), fast_config(), events);
        executor
            .start(validate_pairs("0.05,2000").unwrap(), 100.0, PidGains::default())
            .unwrap();
        let report = executor.wait().unwrap();

        let events: Vec<RigEvent> = rx.try_iter().collect();
        let samples: Vec<ControlSample> = events
            .iter()
            .filter_map(|e| match e {
                RigEvent::Control(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(samples.len() as u64, report.ticks);
        for s in &samples {
            // measured == setpoint → 信号为 0
            assert!((s.measured_ppm - 2_000.0).abs() < 1e-6);
            assert!(s.control_signal.abs() < 1e-6);
            assert!((s.channel1_flow + s.channel2_flow - 100.0).abs() < 1e-9);
        }
        assert!(matches!(events.last(), Some(RigEvent::RunFinished(_))));
    }

    #[test]
    fn test_telemetry_monitor_stops_with_run() {
        let fx = fixture();
        let (events, rx) = event_channel(4096);
        let config = ExecutorConfig {
            telemetry: Some(TelemetryConfig {
                interval: Duration::from_millis(10),
            }),
            ..fast_config()
        };
        let executor = SequenceExecutor::new(fx.rig.clone(), config, events);
        executor
            .start(validate_pairs("0.1,100").unwrap(), 100.0, PidGains::default())
            .unwrap();
        executor.wait().unwrap();

        let before = fx.rig.metrics().snapshot().telemetry_cycles;
        assert!(before > 0);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fx.rig.metrics().snapshot().telemetry_cycles, before);
        assert!(
            rx.try_iter()
                .any(|e| matches!(e, RigEvent::Telemetry(_)))
        );
    }

    /// 采样即 panic 的传感器
    struct PanickingSensor(CalibrationStore);

    impl ConcentrationSensor for PanickingSensor {
        fn sample_voltage(&mut self) -> Result<f64, DeviceError> {
            panic!("sensor driver bug");
        }

        fn calibration(&self) -> &CalibrationStore {
            &self.0
        }
    }

    #[test]
    fn test_worker_panic_zeroes_and_stops() {
        let (ch1, target) = MockFlowChannel::new("mock0");
        let (ch2, diluent) = MockFlowChannel::new("mock1");
        let rig = RigBuilder::new()
            .target_channel(ch1)
            .diluent_channel(ch2)
            .sensor(PanickingSensor(CalibrationStore::default()))
            .build()
            .unwrap();
        rig.connect_all().unwrap();
        rig.set_flow(ChannelId::Target, 40.0).unwrap();
        rig.set_flow(ChannelId::Diluent, 60.0).unwrap();

        let executor = SequenceExecutor::new(rig.clone(), fast_config(), EventSender::noop());
        executor
            .start(validate_pairs("5,1000").unwrap(), 100.0, PidGains::default())
            .unwrap();

        // 不经 wait()：工作线程自己完成关机
        let deadline = Instant::now() + Duration::from_secs(2);
        while executor.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(executor.state(), RunState::Stopped);
        assert!(!executor.stop_handle().is_running());
        assert_eq!(target.setpoint(), 0.0);
        assert_eq!(diluent.setpoint(), 0.0);

        assert!(matches!(executor.wait(), Err(ControlError::WorkerPanicked)));
        assert!(!rig.is_busy());
    }
}
