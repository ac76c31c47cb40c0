//! 监控命令：周期采样两路实测流量与浓度

use crate::events::{EventPrinter, OutputMode};
use crate::session::{Session, on_ctrl_c};
use anyhow::Result;
use clap::Args;
use crossbeam_channel::RecvTimeoutError;
use gasmix_sdk::prelude::*;
use std::time::{Duration, Instant};

#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 采样周期（毫秒，缺省取配置）
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// 监控时长（秒，缺省直到 Ctrl+C）
    #[arg(long, value_name = "SECS")]
    pub duration_s: Option<f64>,

    /// 每个快照输出一行 JSON
    #[arg(long)]
    pub json: bool,
}

impl MonitorCommand {
    /// 监控截止时刻；超出可表示范围按无限期处理
    fn deadline(&self, now: Instant) -> Option<Instant> {
        self.duration_s
            .filter(|s| *s > 0.0)
            .and_then(|s| Duration::try_from_secs_f64(s).ok())
            .and_then(|d| now.checked_add(d))
    }

    pub fn execute(&self, session: &Session) -> Result<()> {
        let interval = Duration::from_millis(
            self.interval_ms
                .unwrap_or(session.config.telemetry.interval_ms)
                .max(1),
        );
        let deadline = self.deadline(Instant::now());

        let rig = session.connect()?;
        let (events, rx) = session.event_channel();
        let sampler = TelemetrySampler::start(rig, TelemetryConfig { interval }, events.clone())?;

        let active = sampler.active_flag();
        on_ctrl_c(move || active.clear())?;

        let mode = if self.json { OutputMode::Json } else { OutputMode::Text };
        let mut printer = EventPrinter::new(mode);
        while sampler.is_running() && deadline.is_none_or(|d| Instant::now() < d) {
            match rx.recv_timeout(interval) {
                Ok(event) => {
                    printer.handle(event);
                },
                Err(RecvTimeoutError::Timeout) => {},
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        sampler.stop();
        let cycles = sampler.join();
        for event in rx.try_iter() {
            printer.handle(event);
        }
        if !self.json {
            println!(
                "✅ 监控结束: 采样 {} 次, 显示 {} 条, 丢弃 {} 条",
                cycles,
                printer.telemetry_lines(),
                events.dropped()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(duration_s: Option<f64>) -> MonitorCommand {
        MonitorCommand {
            interval_ms: None,
            duration_s,
            json: false,
        }
    }

    #[test]
    fn test_deadline_bounds() {
        let now = Instant::now();
        assert_eq!(command(Some(2.0)).deadline(now), Some(now + Duration::from_secs(2)));
        assert_eq!(command(None).deadline(now), None);
        assert_eq!(command(Some(0.0)).deadline(now), None);
        assert_eq!(command(Some(f64::NAN)).deadline(now), None);
        assert_eq!(command(Some(1e20)).deadline(now), None);
        assert_eq!(command(Some(f64::INFINITY)).deadline(now), None);
    }
}
