//! 序列校验命令（不连接设备）

use crate::input::InputArgs;
use anyhow::Result;
use clap::{Args, ValueEnum};
use gasmix_sdk::prelude::*;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceFormat {
    /// (秒, ppm) 对，用于闭环运行
    Pairs,
    /// (分钟, 通道1 sccm, 通道2 sccm) 三元组，用于时间表
    Triples,
}

#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// 输入格式
    #[arg(value_enum)]
    pub format: SequenceFormat,

    #[command(flatten)]
    pub input: InputArgs,
}

impl ValidateCommand {
    pub fn execute(&self) -> Result<()> {
        let source = self.input.source();
        match self.format {
            SequenceFormat::Pairs => {
                let sequence = source.pairs()?;
                println!(
                    "✅ 序列有效: {} 个阶段, 共 {:.1}s",
                    sequence.len(),
                    sequence.total_duration().as_secs_f64()
                );
                for (i, stage) in sequence.iter().enumerate() {
                    println!(
                        "   {:>2}. {:>8.1}s → {:>8.1} ppm",
                        i + 1,
                        stage.duration_seconds,
                        stage.setpoint
                    );
                }
            },
            SequenceFormat::Triples => {
                let triples = source.triples()?;
                let schedule = build_schedule(&triples)?;
                println!(
                    "✅ 时间表有效: {} 段, 共 {:.1}s",
                    schedule.len(),
                    schedule.total_duration().as_secs_f64()
                );
                for (i, entry) in schedule.entries().iter().enumerate() {
                    println!(
                        "   {:>2}. +{:>8.1}s  持续 {:>8.1}s  ch1 {:>6.1} sccm  ch2 {:>6.1} sccm",
                        i + 1,
                        entry.start_offset.as_secs_f64(),
                        entry.duration.as_secs_f64(),
                        entry.channel1_flow,
                        entry.channel2_flow
                    );
                }
            },
        }
        Ok(())
    }
}
