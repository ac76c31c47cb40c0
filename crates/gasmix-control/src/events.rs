//! 后台 → 前台事件队列
//!
//! 后台线程（执行器、分步流程、遥测、倒计时）只通过有界队列向前台投递事件，
//! 前台线程自行消费并更新界面。队列满时丢弃新事件并计数，后台永不阻塞。

use crate::executor::RunReport;
use crate::procedure::ProcedureReport;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use gasmix_driver::{TelemetrySink, TelemetrySnapshot};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// 执行器单个 tick 的控制记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlSample {
    pub tick: u64,
    /// 从 0 开始
    pub stage_index: usize,
    pub setpoint: f64,
    pub measured_ppm: f64,
    pub control_signal: f64,
    pub channel1_flow: f64,
    pub channel2_flow: f64,
}

/// 前台事件
#[derive(Debug, Clone)]
pub enum RigEvent {
    Telemetry(TelemetrySnapshot),
    Control(ControlSample),
    /// 阶段 / 步骤开始（`index` 从 0 开始）
    StageStarted {
        index: usize,
        total: usize,
        label: String,
    },
    /// 剩余时间（1 Hz，仅供显示）
    Countdown { remaining: Duration },
    /// 分步流程进度
    ProcedureProgress { elapsed: Duration, total: Duration },
    RunFinished(RunReport),
    ProcedureFinished(ProcedureReport),
}

/// 创建事件队列
pub fn event_channel(capacity: usize) -> (EventSender, Receiver<RigEvent>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (
        EventSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

/// 事件发送端（可克隆，跨线程共享）
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<RigEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    /// 无人接收的发送端（事件直接丢弃）
    pub fn noop() -> Self {
        let (sender, _rx) = event_channel(1);
        sender
    }

    /// 非阻塞投递
    ///
    /// 队列满时丢弃并计数；接收端已关闭时静默丢弃。
    pub fn send(&self, event: RigEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Event queue full, event dropped");
            },
            Err(TrySendError::Disconnected(_)) => {},
        }
    }

    /// 因队列满而丢弃的事件数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for EventSender {
    fn publish(&self, snapshot: TelemetrySnapshot) {
        self.send(RigEvent::Telemetry(snapshot));
    }
}
