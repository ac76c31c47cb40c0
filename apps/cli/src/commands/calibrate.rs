//! 传感器标定命令
//!
//! 零点气、量程气各采样一组电压，均值构成新的标定区间。
//! 区间只在本进程内生效，`--save` 写回配置文件。

use super::{print_steps, run_procedure};
use crate::session::{Session, confirm};
use anyhow::{Context, Result, bail};
use clap::Args;
use gasmix_sdk::prelude::*;

/// `--fast` 的时长缩放系数
const FAST_FACTOR: f64 = 0.05;

#[derive(Args, Debug)]
pub struct CalibrateCommand {
    /// 跳过确认
    #[arg(short, long)]
    pub yes: bool,

    /// 按比例缩短各步时长（仿真演示用）
    #[arg(long)]
    pub fast: bool,

    /// 标定成功后把新区间写入配置文件
    #[arg(long)]
    pub save: bool,
}

impl CalibrateCommand {
    pub fn timing(&self, config: &RigConfig) -> CalibrationTiming {
        let timing = settings::calibration_timing(config);
        if self.fast { timing.scaled(FAST_FACTOR) } else { timing }
    }

    pub fn execute(&self, session: &Session) -> Result<()> {
        let procedure = StagedProcedure::calibration(self.timing(&session.config))
            .with_retry_policy(settings::retry_policy(&session.config))
            .with_telemetry(settings::telemetry_config(&session.config));

        let current = settings::calibration_range(&session.config)?;
        println!(
            "📐 当前标定区间: {:.3} V ~ {:.3} V",
            current.voltage_min, current.voltage_max
        );
        print_steps(&procedure);

        if !confirm("标定期间两路通道按固定流量输出，是否开始？", self.yes)? {
            println!("❌ 操作已取消");
            return Ok(());
        }

        let report = run_procedure(session, procedure)?;
        let range = match report.outcome {
            ProcedureOutcome::Completed => report
                .committed_calibration
                .context("标定完成但未产生新区间")?,
            ProcedureOutcome::Cancelled => {
                println!("⚠️  标定已取消，区间保持不变");
                return Ok(());
            },
            _ => {
                report.into_result()?;
                bail!("标定失败");
            },
        };

        println!(
            "✅ 新标定区间: {:.3} V ~ {:.3} V",
            range.voltage_min, range.voltage_max
        );
        if self.save {
            let mut config = session.config.clone();
            config.calibration.voltage_min = range.voltage_min;
            config.calibration.voltage_max = range.voltage_max;
            config
                .save_to_file(&session.path)
                .with_context(|| format!("保存配置失败: {}", session.path.display()))?;
            println!("💾 已写入 {}", session.path.display());
        }
        Ok(())
    }
}
