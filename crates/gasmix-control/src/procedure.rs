//! 分步流程（开环）
//!
//! 标定、冲洗、半手动时间表都是同一种结构：按顺序给两路通道写固定流量，
//! 保持一段时间，可选地在保持结束后采样传感器电压。
//!
//! 每一步的写入都走重试命令；任一通道重试耗尽则流程失败。
//! 流程可以协作式取消，无论成功、失败还是取消，结束时都执行关机例程。
//!
//! 标定流程只有在完整跑完、两个采样均值都有效时才提交新的标定区间。

use crate::error::ControlError;
use crate::events::{EventSender, RigEvent};
use gasmix_device::{CalibrationError, CalibrationRange};
use gasmix_driver::{
    ChannelId, DeviceCommandError, DriverError, RetryOutcome, RetryPolicy, Rig, RunFlag,
    ShutdownReport, TelemetryConfig, TelemetrySampler, shutdown,
};
use gasmix_tools::Schedule;
use gasmix_tools::statistics::mean;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 保持期间进度事件的周期
const PROGRESS_PERIOD: Duration = Duration::from_secs(1);

/// 采样用途
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRole {
    /// 零点气：均值作为 `voltage_min`
    VoltageMin,
    /// 量程气：均值作为 `voltage_max`
    VoltageMax,
    /// 仅记录
    Observe,
}

/// 采样参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingSpec {
    pub count: usize,
    pub interval: Duration,
    pub role: SampleRole,
}

impl SamplingSpec {
    /// 首末样本之间的时长（溢出时饱和到 `Duration::MAX`）
    pub fn duration(&self) -> Duration {
        u32::try_from(self.count.saturating_sub(1))
            .ok()
            .and_then(|gaps| self.interval.checked_mul(gaps))
            .unwrap_or(Duration::MAX)
    }
}

/// 流程中的一步
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureStep {
    pub label: String,
    pub channel1_flow: f64,
    pub channel2_flow: f64,
    pub hold: Duration,
    /// 保持结束后的采样
    pub sampling: Option<SamplingSpec>,
}

impl ProcedureStep {
    pub fn new(
        label: impl Into<String>,
        channel1_flow: f64,
        channel2_flow: f64,
        hold: Duration,
    ) -> Self {
        Self {
            label: label.into(),
            channel1_flow,
            channel2_flow,
            hold,
            sampling: None,
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingSpec) -> Self {
        self.sampling = Some(sampling);
        self
    }

    /// 保持 + 采样的总时长
    pub fn duration(&self) -> Duration {
        self.hold
            .saturating_add(self.sampling.map(|s| s.duration()).unwrap_or(Duration::ZERO))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Calibration,
    Flush,
    Schedule,
    Custom,
}

impl fmt::Display for ProcedureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcedureKind::Calibration => "calibration",
            ProcedureKind::Flush => "flush",
            ProcedureKind::Schedule => "schedule",
            ProcedureKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// 标定流程时序
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationTiming {
    /// 稀释气 500 sccm 吹扫
    pub initial_purge: Duration,
    /// 稀释气 100 sccm，结束后采样零点电压
    pub zero_hold: Duration,
    /// 目标气 100 sccm，结束后采样量程电压
    pub span_hold: Duration,
    pub final_purge: Duration,
    /// 两路 0 等待
    pub settle: Duration,
    pub sample_count: usize,
    pub sample_interval: Duration,
}

impl Default for CalibrationTiming {
    fn default() -> Self {
        Self {
            initial_purge: Duration::from_secs(30),
            zero_hold: Duration::from_secs(60),
            span_hold: Duration::from_secs(60),
            final_purge: Duration::from_secs(10),
            settle: Duration::from_secs(5),
            sample_count: 100,
            sample_interval: Duration::from_millis(100),
        }
    }
}

impl CalibrationTiming {
    /// 按比例缩放所有时长（采样次数不变）
    pub fn scaled(self, factor: f64) -> Self {
        let factor = factor.max(0.0);
        Self {
            initial_purge: self.initial_purge.mul_f64(factor),
            zero_hold: self.zero_hold.mul_f64(factor),
            span_hold: self.span_hold.mul_f64(factor),
            final_purge: self.final_purge.mul_f64(factor),
            settle: self.settle.mul_f64(factor),
            sample_count: self.sample_count,
            sample_interval: self.sample_interval.mul_f64(factor),
        }
    }
}

/// 冲洗流程时序
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushTiming {
    pub purge: Duration,
    pub settle: Duration,
}

impl Default for FlushTiming {
    fn default() -> Self {
        Self {
            purge: Duration::from_secs(15),
            settle: Duration::from_secs(5),
        }
    }
}

impl FlushTiming {
    pub fn scaled(self, factor: f64) -> Self {
        let factor = factor.max(0.0);
        Self {
            purge: self.purge.mul_f64(factor),
            settle: self.settle.mul_f64(factor),
        }
    }
}

/// 一步的采样结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSamples {
    /// 步骤序号（从 0 开始）
    pub step: usize,
    pub role: SampleRole,
    pub count: usize,
    pub mean: f64,
}

/// 流程结局
#[derive(Debug, Clone)]
pub enum ProcedureOutcome {
    Completed,
    Cancelled,
    Failed(DeviceCommandError),
    /// 采样均值不能构成有效标定区间，旧区间保留
    CalibrationRejected(CalibrationError),
}

/// 流程报告
#[derive(Debug, Clone)]
pub struct ProcedureReport {
    pub kind: ProcedureKind,
    pub name: String,
    pub outcome: ProcedureOutcome,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub samples: Vec<StepSamples>,
    /// 本次提交的标定区间
    pub committed_calibration: Option<CalibrationRange>,
    pub elapsed: Duration,
    pub shutdown: ShutdownReport,
}

impl ProcedureReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, ProcedureOutcome::Completed)
    }

    /// 失败结局转为错误；完成与取消都返回报告
    pub fn into_result(self) -> Result<Self, ControlError> {
        match self.outcome {
            ProcedureOutcome::Failed(e) => Err(ControlError::Command(e)),
            ProcedureOutcome::CalibrationRejected(e) => Err(ControlError::CalibrationRejected(e)),
            ProcedureOutcome::Completed | ProcedureOutcome::Cancelled => Ok(self),
        }
    }
}

/// 分步流程
///
/// # 示例
///
/// ```rust,no_run
/// use gasmix_control::{CalibrationTiming, EventSender, StagedProcedure};
/// use gasmix_driver::{CalibrationStore, RigBuilder};
/// use gasmix_device::SimulatedRig;
///
/// let sim = SimulatedRig::default();
/// let rig = RigBuilder::simulated(&sim, CalibrationStore::default()).build().unwrap();
/// rig.connect_all().unwrap();
///
/// let handle = StagedProcedure::calibration(CalibrationTiming::default())
///     .spawn(rig, EventSender::noop())
///     .unwrap();
/// let report = handle.wait().unwrap();
/// println!("{:?}", report.committed_calibration);
/// ```
#[derive(Debug, Clone)]
pub struct StagedProcedure {
    kind: ProcedureKind,
    name: String,
    steps: Vec<ProcedureStep>,
    retry: RetryPolicy,
    telemetry: Option<TelemetryConfig>,
}

impl StagedProcedure {
    pub fn new(kind: ProcedureKind, name: impl Into<String>, steps: Vec<ProcedureStep>) -> Self {
        Self {
            kind,
            name: name.into(),
            steps,
            retry: RetryPolicy::WRITE_DEFAULT,
            telemetry: None,
        }
    }

    /// 传感器标定：零点气 → 量程气，两次采样均值构成新的标定区间
    pub fn calibration(timing: CalibrationTiming) -> Self {
        let sampling = |role| SamplingSpec {
            count: timing.sample_count,
            interval: timing.sample_interval,
            role,
        };
        Self::new(
            ProcedureKind::Calibration,
            "calibration",
            vec![
                ProcedureStep::new("initial purge", 0.0, 500.0, timing.initial_purge),
                ProcedureStep::new("zero gas", 0.0, 100.0, timing.zero_hold)
                    .with_sampling(sampling(SampleRole::VoltageMin)),
                ProcedureStep::new("span gas", 100.0, 0.0, timing.span_hold)
                    .with_sampling(sampling(SampleRole::VoltageMax)),
                ProcedureStep::new("final purge", 0.0, 500.0, timing.final_purge),
                ProcedureStep::new("settle", 0.0, 0.0, timing.settle),
            ],
        )
    }

    /// 腔体冲洗
    pub fn flush(timing: FlushTiming) -> Self {
        Self::new(
            ProcedureKind::Flush,
            "flush",
            vec![
                ProcedureStep::new("purge", 0.0, 500.0, timing.purge),
                ProcedureStep::new("settle", 0.0, 0.0, timing.settle),
            ],
        )
    }

    /// 半手动时间表：每个条目在自己的起始偏移写入两路流量
    pub fn from_schedule(schedule: &Schedule) -> Self {
        let steps = schedule
            .entries()
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                ProcedureStep::new(
                    format!(
                        "set {} at +{}s: {} / {} sccm",
                        i + 1,
                        entry.start_offset.as_secs_f64(),
                        entry.channel1_flow,
                        entry.channel2_flow
                    ),
                    entry.channel1_flow,
                    entry.channel2_flow,
                    entry.duration,
                )
            })
            .collect();
        Self::new(ProcedureKind::Schedule, "schedule", steps)
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// 流程期间同时采样遥测
    pub fn with_telemetry(mut self, config: TelemetryConfig) -> Self {
        self.telemetry = Some(config);
        self
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[ProcedureStep] {
        &self.steps
    }

    pub fn total_duration(&self) -> Duration {
        self.steps
            .iter()
            .map(ProcedureStep::duration)
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// 在当前线程运行
    ///
    /// `running` 必须已置位；清除它即取消流程。
    pub fn run(
        &self,
        rig: &Rig,
        running: &RunFlag,
        events: &EventSender,
    ) -> Result<ProcedureReport, ControlError> {
        let _guard = rig.try_acquire(&self.name)?;
        Ok(self.execute(rig, running, events))
    }

    /// 在后台线程运行
    ///
    /// 混气台占用在调用线程上同步获取，忙时直接返回 `Busy`。
    pub fn spawn(self, rig: Rig, events: EventSender) -> Result<ProcedureHandle, ControlError> {
        let guard = rig.try_acquire(&self.name)?;
        let running = RunFlag::raised();
        let flag = running.clone();
        let kind = self.kind;
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name("gasmix-procedure".into())
            .spawn(move || {
                let _guard = guard;
                self.execute(&rig, &flag, &events)
            })
            .map_err(|e| ControlError::Driver(DriverError::Spawn(e)))?;

        Ok(ProcedureHandle {
            handle: Some(handle),
            running,
            kind,
            name,
        })
    }

    fn execute(&self, rig: &Rig, running: &RunFlag, events: &EventSender) -> ProcedureReport {
        let started = Instant::now();
        let total_duration = self.total_duration();
        let total_steps = self.steps.len();
        info!(
            procedure = %self.name,
            steps = total_steps,
            duration = ?total_duration,
            "Procedure started"
        );

        let monitor = RunFlag::new();
        let sampler = self.telemetry.clone().and_then(|cfg| {
            TelemetrySampler::start_with_flag(rig.clone(), cfg, events.clone(), monitor.clone())
                .map_err(|e| warn!("Telemetry sampler not started: {}", e))
                .ok()
        });

        let mut outcome = ProcedureOutcome::Completed;
        let mut steps_completed = 0usize;
        let mut samples = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            if !running.is_set() {
                outcome = ProcedureOutcome::Cancelled;
                break;
            }
            info!(
                step = index + 1,
                total = total_steps,
                channel1 = step.channel1_flow,
                channel2 = step.channel2_flow,
                hold = ?step.hold,
                "{}",
                step.label
            );
            events.send(RigEvent::StageStarted {
                index,
                total: total_steps,
                label: step.label.clone(),
            });

            match self.apply_flows(rig, step, running) {
                Ok(true) => {},
                Ok(false) => {
                    outcome = ProcedureOutcome::Cancelled;
                    break;
                },
                Err(e) => {
                    error!(step = index + 1, "Procedure step failed: {}", e);
                    outcome = ProcedureOutcome::Failed(e);
                    break;
                },
            }

            if !hold(step.hold, running, events, started, total_duration) {
                outcome = ProcedureOutcome::Cancelled;
                break;
            }

            if let Some(spec) = step.sampling {
                let Some(values) = collect_samples(rig, &spec, running) else {
                    outcome = ProcedureOutcome::Cancelled;
                    break;
                };
                if let Some(mean) = mean(&values) {
                    debug!(step = index + 1, role = ?spec.role, mean, "Samples collected");
                    samples.push(StepSamples {
                        step: index,
                        role: spec.role,
                        count: values.len(),
                        mean,
                    });
                }
            }

            steps_completed += 1;
        }

        let mut committed_calibration = None;
        if matches!(outcome, ProcedureOutcome::Completed) {
            match calibration_from_samples(&samples) {
                Some(Ok(range)) => {
                    rig.calibration().replace(range);
                    info!(
                        voltage_min = range.voltage_min,
                        voltage_max = range.voltage_max,
                        "Calibration committed"
                    );
                    committed_calibration = Some(range);
                },
                Some(Err(e)) => {
                    error!("Calibration rejected: {}", e);
                    outcome = ProcedureOutcome::CalibrationRejected(e);
                },
                None => {},
            }
        }

        let shutdown_report = shutdown(rig, &[running, &monitor]);
        drop(sampler);

        let report = ProcedureReport {
            kind: self.kind,
            name: self.name.clone(),
            outcome,
            steps_completed,
            total_steps,
            samples,
            committed_calibration,
            elapsed: started.elapsed(),
            shutdown: shutdown_report,
        };
        match &report.outcome {
            ProcedureOutcome::Completed => info!(procedure = %self.name, "Procedure completed"),
            other => warn!(procedure = %self.name, outcome = ?other, "Procedure ended early"),
        }
        events.send(RigEvent::ProcedureFinished(report.clone()));
        report
    }

    /// 写入一步的两路流量；`Ok(false)` 表示被取消
    fn apply_flows(
        &self,
        rig: &Rig,
        step: &ProcedureStep,
        running: &RunFlag,
    ) -> Result<bool, DeviceCommandError> {
        let writes = [
            (ChannelId::Target, step.channel1_flow),
            (ChannelId::Diluent, step.channel2_flow),
        ];
        for (id, flow) in writes {
            match rig.command_flow(id, flow, self.retry, Some(running))? {
                RetryOutcome::Completed { .. } => {},
                RetryOutcome::Cancelled { .. } => return Ok(false),
            }
        }
        Ok(true)
    }
}

/// 保持一段时间并投递进度；返回结束时是否仍在运行
fn hold(
    duration: Duration,
    running: &RunFlag,
    events: &EventSender,
    started: Instant,
    total: Duration,
) -> bool {
    let end = Instant::now() + duration;
    loop {
        let now = Instant::now();
        if now >= end {
            return running.is_set();
        }
        events.send(RigEvent::ProcedureProgress {
            elapsed: started.elapsed(),
            total,
        });
        if !running.sleep((end - now).min(PROGRESS_PERIOD)) {
            return false;
        }
    }
}

/// 按间隔读取原始电压；被取消返回 `None`
fn collect_samples(rig: &Rig, spec: &SamplingSpec, running: &RunFlag) -> Option<Vec<f64>> {
    let mut values = Vec::with_capacity(spec.count);
    for i in 0..spec.count {
        if !running.is_set() {
            return None;
        }
        values.push(rig.read_raw_voltage());
        if i + 1 < spec.count && !running.sleep(spec.interval) {
            return None;
        }
    }
    Some(values)
}

/// 零点 / 量程两个均值都存在时构造标定区间
fn calibration_from_samples(
    samples: &[StepSamples],
) -> Option<Result<CalibrationRange, CalibrationError>> {
    let find = |role| samples.iter().rev().find(|s| s.role == role).map(|s| s.mean);
    let min = find(SampleRole::VoltageMin)?;
    let max = find(SampleRole::VoltageMax)?;
    Some(CalibrationRange::new(min, max))
}

/// 后台流程句柄
///
/// Drop 时取消并等待线程结束（线程内部会执行关机例程）。
pub struct ProcedureHandle {
    handle: Option<thread::JoinHandle<ProcedureReport>>,
    running: RunFlag,
    kind: ProcedureKind,
    name: String,
}

impl ProcedureHandle {
    /// 请求取消（下一个检查点生效）
    pub fn cancel(&self) {
        info!(procedure = %self.name, "Procedure cancel requested");
        self.running.clear();
    }

    /// 运行标志（例如交给 Ctrl-C 处理函数）
    pub fn running_flag(&self) -> RunFlag {
        self.running.clone()
    }

    pub fn kind(&self) -> ProcedureKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }

    /// 等待流程结束
    pub fn wait(mut self) -> Result<ProcedureReport, ControlError> {
        let handle = self.handle.take().ok_or(ControlError::NotStarted)?;
        handle.join().map_err(|_| {
            error!(procedure = %self.name, "Procedure worker panicked");
            ControlError::WorkerPanicked
        })
    }
}

impl Drop for ProcedureHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.running.clear();
            let _ = handle.join();
        }
    }
}
