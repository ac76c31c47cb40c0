//! 半手动时间表命令
//!
//! 每组 (分钟, 通道1 sccm, 通道2 sccm) 按累计偏移依次写入两路流量。

use super::{print_steps, run_procedure};
use crate::input::InputArgs;
use crate::session::Session;
use anyhow::{Result, bail};
use clap::Args;
use gasmix_sdk::prelude::*;

#[derive(Args, Debug)]
pub struct ScheduleCommand {
    #[command(flatten)]
    pub input: InputArgs,

    /// 只打印时间表，不连接设备
    #[arg(long)]
    pub dry_run: bool,
}

impl ScheduleCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let triples = self.input.source().triples()?;
        let schedule = build_schedule(&triples)?;
        let procedure = StagedProcedure::from_schedule(&schedule)
            .with_retry_policy(settings::retry_policy(&session.config))
            .with_telemetry(settings::telemetry_config(&session.config));

        print_steps(&procedure);
        if self.dry_run {
            return Ok(());
        }

        let report = run_procedure(session, procedure)?;
        if let ProcedureOutcome::Failed(e) = report.outcome {
            bail!("时间表中止: {}", e);
        }
        Ok(())
    }
}
