//! 停止命令：两路通道写 0

use super::print_shutdown;
use crate::session::Session;
use anyhow::{Result, bail};
use clap::Args;
use gasmix_sdk::prelude::*;

#[derive(Args, Debug)]
pub struct StopCommand {}

impl StopCommand {
    pub fn execute(&self, session: &Session) -> Result<()> {
        let rig = session.connect()?;

        println!("🛑 两路通道归零...");
        let report = shutdown(&rig, &[]);
        print_shutdown(&report);

        if !report.is_clean() {
            bail!("至少一路通道未能归零");
        }
        println!("✅ 已停止");
        Ok(())
    }
}
