//! # Gasmix CLI
//!
//! 双路混气台命令行工具（仿真后端）。
//!
//! ```bash
//! # 校验序列
//! gasmix-cli validate pairs --input 10,5000,5,3000
//!
//! # 闭环运行：每对 (秒, ppm) 为一个阶段
//! gasmix-cli run --input 10,5000,5,3000 --flow 100
//!
//! # 半手动时间表：每组 (分钟, 通道1 sccm, 通道2 sccm)
//! gasmix-cli schedule --input 1,100,0,2,50,50
//!
//! # 标定 / 冲洗
//! gasmix-cli calibrate --yes
//! gasmix-cli flush --fast
//! ```
//!
//! 运行期间按 Ctrl+C 停止：两路通道立即归零。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod events;
mod input;
mod session;

use commands::{
    CalibrateCommand, ConfigCommand, FlushCommand, MonitorCommand, RunCommand, ScheduleCommand,
    StopCommand, ValidateCommand,
};
use session::Session;

/// Gasmix CLI - 混气台命令行工具
#[derive(Parser, Debug)]
#[command(name = "gasmix-cli")]
#[command(about = "Command-line interface for two-channel gas mixing rigs", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认位于用户配置目录）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 校验序列输入
    Validate(ValidateCommand),

    /// 闭环运行浓度序列
    Run(RunCommand),

    /// 按半手动时间表设置两路流量
    Schedule(ScheduleCommand),

    /// 传感器标定
    Calibrate(CalibrateCommand),

    /// 冲洗混合腔
    Flush(FlushCommand),

    /// 监控流量与浓度
    Monitor(MonitorCommand),

    /// 两路通道归零
    Stop(StopCommand),

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "gasmix_cli=debug,gasmix_control=debug,gasmix_driver=debug"
    } else {
        "gasmix_cli=info,gasmix_control=warn,gasmix_driver=warn"
    };
    gasmix_sdk::init_logger(default_level);

    let config_path = match cli.config {
        Some(path) => path,
        None => session::default_config_path()?,
    };

    match cli.command {
        // 不需要设备的命令
        Commands::Validate(cmd) => cmd.execute(),
        Commands::Config(cmd) => cmd.execute(&config_path),

        Commands::Run(cmd) => cmd.execute(&Session::load(&config_path)?),
        Commands::Schedule(cmd) => cmd.execute(&Session::load(&config_path)?),
        Commands::Calibrate(cmd) => cmd.execute(&Session::load(&config_path)?),
        Commands::Flush(cmd) => cmd.execute(&Session::load(&config_path)?),
        Commands::Monitor(cmd) => cmd.execute(&Session::load(&config_path)?),
        Commands::Stop(cmd) => cmd.execute(&Session::load(&config_path)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "gasmix-cli", "run", "--input", "10,5000", "--flow", "120", "--retry",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(cmd) => {
                assert_eq!(cmd.input.input.as_deref(), Some("10,5000"));
                assert_eq!(cmd.flow, Some(120.0));
                assert!(cmd.retry);
            },
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_input_and_file_are_exclusive() {
        let result = Cli::try_parse_from([
            "gasmix-cli", "run", "--input", "10,5000", "--file", "seq.txt",
        ]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["gasmix-cli", "schedule"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["gasmix-cli", "stop", "--config", "/tmp/gasmix.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/gasmix.toml")));
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
