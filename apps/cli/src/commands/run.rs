//! 闭环运行命令
//!
//! 按 (秒, ppm) 序列逐阶段调节混合浓度，结束、失败或 Ctrl+C 时两路归零。

use super::{print_metrics, print_shutdown, secs};
use crate::events::{EventPrinter, OutputMode, pump};
use crate::input::InputArgs;
use crate::session::{Session, on_ctrl_c};
use anyhow::{Result, bail};
use clap::Args;
use gasmix_sdk::prelude::*;
use gasmix_sdk::tools::config::WriteModeSetting;

/// 闭环运行参数（未给出的取配置文件中的值）
#[derive(Args, Debug)]
pub struct RunCommand {
    #[command(flatten)]
    pub input: InputArgs,

    /// 两路总流量（sccm）
    #[arg(long)]
    pub flow: Option<f64>,

    #[arg(long)]
    pub kp: Option<f64>,

    #[arg(long)]
    pub ki: Option<f64>,

    #[arg(long)]
    pub kd: Option<f64>,

    /// 写入失败时按 [retry] 重试，耗尽则中止运行
    #[arg(long)]
    pub retry: bool,

    /// 控制循环最小周期（毫秒）
    #[arg(long, value_name = "MS")]
    pub tick_ms: Option<u64>,
}

impl RunCommand {
    /// 命令行参数覆盖配置
    pub fn apply_overrides(&self, config: &mut RigConfig) {
        if let Some(flow) = self.flow {
            config.flow.total_setpoint_sccm = flow;
        }
        if let Some(kp) = self.kp {
            config.pid.kp = kp;
        }
        if let Some(ki) = self.ki {
            config.pid.ki = ki;
        }
        if let Some(kd) = self.kd {
            config.pid.kd = kd;
        }
        if self.retry {
            config.flow.write_mode = WriteModeSetting::Retry;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.flow.min_tick_ms = tick_ms;
        }
    }

    pub fn execute(&self, session: &Session) -> Result<()> {
        let sequence = self.input.source().pairs()?;
        let mut config = session.config.clone();
        self.apply_overrides(&mut config);
        config.validate()?;

        let gains = settings::pid_gains(&config);
        let flow = config.flow.total_setpoint_sccm;
        println!(
            "📋 {} 个阶段, 共 {}, 总流量 {} sccm, PID ({}, {}, {})",
            sequence.len(),
            secs(sequence.total_duration()),
            flow,
            gains.kp,
            gains.ki,
            gains.kd
        );

        let rig = session.connect()?;
        let (events, rx) = session.event_channel();
        let executor =
            SequenceExecutor::new(rig.clone(), settings::executor_config(&config), events.clone());

        let stop = executor.stop_handle();
        on_ctrl_c(move || {
            println!("\n🛑 收到中断信号，停止运行...");
            stop.stop();
        })?;

        executor.start(sequence, flow, gains)?;
        let mut printer = EventPrinter::new(OutputMode::Text);
        pump(&rx, &mut printer, || !executor.is_running());
        let report = executor.wait()?;

        print_run_report(&report);
        print_metrics(&rig, events.dropped());

        if let Some(err) = report.error {
            bail!("运行中止: {}", err);
        }
        Ok(())
    }
}

fn print_run_report(report: &RunReport) {
    let icon = if report.is_completed() { "✅" } else { "⚠️ " };
    println!(
        "{} 运行结束 ({:?}): 完成 {}/{} 个阶段, {} 个 tick, 用时 {}",
        icon,
        report.final_state,
        report.stages_completed,
        report.total_stages,
        report.ticks,
        secs(report.elapsed)
    );
    print_shutdown(&report.shutdown);
}
