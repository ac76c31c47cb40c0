//! 前台事件消费：后台线程只投递事件，打印全部在主线程完成

use crossbeam_channel::{Receiver, RecvTimeoutError};
use gasmix_sdk::prelude::*;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Text,
    /// 每个遥测快照一行 JSON
    Json,
}

/// 事件打印器
///
/// 倒计时和控制信号只记住最新值，随下一条遥测一并显示。
pub struct EventPrinter {
    mode: OutputMode,
    remaining: Option<Duration>,
    signal: Option<f64>,
    progress: Option<(Duration, Duration)>,
    telemetry_lines: u64,
}

impl EventPrinter {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            remaining: None,
            signal: None,
            progress: None,
            telemetry_lines: 0,
        }
    }

    pub fn telemetry_lines(&self) -> u64 {
        self.telemetry_lines
    }

    /// 处理一条事件，收到结束事件时返回 true
    pub fn handle(&mut self, event: RigEvent) -> bool {
        match event {
            RigEvent::StageStarted { index, total, label } => {
                if self.mode == OutputMode::Text {
                    println!("▶️  [{}/{}] {}", index + 1, total, label);
                }
                false
            },
            RigEvent::Countdown { remaining } => {
                self.remaining = Some(remaining);
                false
            },
            RigEvent::ProcedureProgress { elapsed, total } => {
                self.progress = Some((elapsed, total));
                false
            },
            RigEvent::Control(sample) => {
                debug!(
                    tick = sample.tick,
                    setpoint = sample.setpoint,
                    measured = sample.measured_ppm,
                    signal = sample.control_signal,
                    "control tick"
                );
                self.signal = Some(sample.control_signal);
                false
            },
            RigEvent::Telemetry(snapshot) => {
                self.print_telemetry(&snapshot);
                false
            },
            RigEvent::RunFinished(_) | RigEvent::ProcedureFinished(_) => true,
        }
    }

    fn print_telemetry(&mut self, snapshot: &TelemetrySnapshot) {
        self.telemetry_lines += 1;
        match self.mode {
            OutputMode::Json => match serde_json::to_string(snapshot) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize telemetry snapshot: {}", e),
            },
            OutputMode::Text => {
                let mut line = format!(
                    "📊 #{:<5} ch1 {:>7.2} sccm | ch2 {:>7.2} sccm | {:>8.1} ppm",
                    snapshot.tick_index,
                    snapshot.channel1_measured_flow,
                    snapshot.channel2_measured_flow,
                    snapshot.concentration_ppm,
                );
                if let Some(signal) = self.signal {
                    line.push_str(&format!(" | 信号 {:>5.1}%", signal));
                }
                if let Some(remaining) = self.remaining {
                    line.push_str(&format!(" | 剩余 {}s", remaining.as_secs()));
                }
                if let Some((elapsed, total)) = self.progress {
                    line.push_str(&format!(
                        " | 进度 {:.0}/{:.0}s",
                        elapsed.as_secs_f64(),
                        total.as_secs_f64()
                    ));
                }
                println!("{}", line);
            },
        }
    }
}

/// 消费事件，直到收到结束事件或 `finished()` 为真且队列已空
///
/// 队列满时结束事件可能被丢弃，所以还要轮询后台状态。
pub fn pump(rx: &Receiver<RigEvent>, printer: &mut EventPrinter, finished: impl Fn() -> bool) {
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                if printer.handle(event) {
                    return;
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                if finished() {
                    return;
                }
            },
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
