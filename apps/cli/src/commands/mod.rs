//! 命令定义和实现

pub mod calibrate;
pub mod config;
pub mod flush;
pub mod monitor;
pub mod run;
pub mod schedule;
pub mod stop;
pub mod validate;

pub use calibrate::CalibrateCommand;
pub use config::ConfigCommand;
pub use flush::FlushCommand;
pub use monitor::MonitorCommand;
pub use run::RunCommand;
pub use schedule::ScheduleCommand;
pub use stop::StopCommand;
pub use validate::ValidateCommand;

use crate::events::{EventPrinter, OutputMode, pump};
use crate::session::{Session, on_ctrl_c};
use anyhow::Result;
use gasmix_sdk::prelude::*;
use std::time::Duration;

/// 打印分步流程的步骤表
fn print_steps(procedure: &StagedProcedure) {
    println!(
        "📋 {} ({} 步, 共 {}):",
        procedure.name(),
        procedure.steps().len(),
        secs(procedure.total_duration())
    );
    for (i, step) in procedure.steps().iter().enumerate() {
        println!(
            "   {:>2}. {:<24} ch1 {:>6.1} sccm  ch2 {:>6.1} sccm  {}",
            i + 1,
            step.label,
            step.channel1_flow,
            step.channel2_flow,
            secs(step.duration()),
        );
    }
}

/// 在后台运行分步流程，Ctrl+C 取消
fn run_procedure(session: &Session, procedure: StagedProcedure) -> Result<ProcedureReport> {
    let rig = session.connect()?;
    let (events, rx) = session.event_channel();
    let handle = procedure.spawn(rig.clone(), events.clone())?;

    let flag = handle.running_flag();
    on_ctrl_c(move || {
        println!("\n🛑 收到中断信号，取消流程...");
        flag.clear();
    })?;

    let mut printer = EventPrinter::new(OutputMode::Text);
    pump(&rx, &mut printer, || handle.is_finished());
    let report = handle.wait()?;

    print_procedure_report(&report);
    print_metrics(&rig, events.dropped());
    Ok(report)
}

fn print_procedure_report(report: &ProcedureReport) {
    match &report.outcome {
        ProcedureOutcome::Completed => println!(
            "✅ {} 完成: {}/{} 步, 用时 {}",
            report.name,
            report.steps_completed,
            report.total_steps,
            secs(report.elapsed)
        ),
        ProcedureOutcome::Cancelled => println!(
            "⚠️  {} 已取消: 完成 {}/{} 步",
            report.name, report.steps_completed, report.total_steps
        ),
        ProcedureOutcome::Failed(e) => println!("❌ {} 失败: {}", report.name, e),
        ProcedureOutcome::CalibrationRejected(e) => {
            println!("❌ {} 结果无效，保留原标定区间: {}", report.name, e)
        },
    }
    for samples in &report.samples {
        println!(
            "   步骤 {} {:?}: {} 次采样, 均值 {:.4} V",
            samples.step + 1,
            samples.role,
            samples.count,
            samples.mean
        );
    }
    print_shutdown(&report.shutdown);
}

fn print_shutdown(report: &ShutdownReport) {
    for id in ChannelId::ALL {
        match report.channel(id) {
            Ok(()) => println!("   {} → 0 sccm ✅", id),
            Err(e) => println!("   {} 归零失败 ❌: {}", id, e),
        }
    }
}

fn print_metrics(rig: &Rig, dropped_events: u64) {
    let m = rig.metrics().snapshot();
    println!(
        "📈 写入 成功 {} / 失败 {} (重试 {}, 耗尽 {}, 取消 {}), 遥测 {} 次, 丢弃事件 {}",
        m.writes_ok,
        m.writes_failed,
        m.write_retries,
        m.commands_exhausted,
        m.commands_cancelled,
        m.telemetry_cycles,
        dropped_events
    );
}

fn secs(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}
