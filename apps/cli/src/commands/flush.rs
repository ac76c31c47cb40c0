//! 冲洗命令：稀释气满量程吹扫后两路归零

use super::{print_steps, run_procedure};
use crate::session::{Session, confirm};
use anyhow::{Result, bail};
use clap::Args;
use gasmix_sdk::prelude::*;

#[derive(Args, Debug)]
pub struct FlushCommand {
    /// 跳过确认
    #[arg(short, long)]
    pub yes: bool,

    /// 按比例缩短各步时长（仿真演示用）
    #[arg(long)]
    pub fast: bool,
}

impl FlushCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let timing = if self.fast {
            FlushTiming::default().scaled(0.1)
        } else {
            FlushTiming::default()
        };
        let procedure = StagedProcedure::flush(timing)
            .with_retry_policy(settings::retry_policy(&session.config))
            .with_telemetry(settings::telemetry_config(&session.config));
        print_steps(&procedure);

        if !confirm("是否开始冲洗？", self.yes)? {
            println!("❌ 操作已取消");
            return Ok(());
        }

        let report = run_procedure(session, procedure)?;
        if let ProcedureOutcome::Failed(e) = report.outcome {
            bail!("冲洗中止: {}", e);
        }
        Ok(())
    }
}
