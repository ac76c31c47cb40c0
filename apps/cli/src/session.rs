//! 单次命令的运行环境：配置 + 已连接的仿真混气台

use anyhow::{Context, Result};
use gasmix_sdk::prelude::*;
use std::path::{Path, PathBuf};

/// 默认配置文件路径
pub fn default_config_path() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("gasmix");
    path.push("config.toml");
    Ok(path)
}

pub struct Session {
    pub path: PathBuf,
    pub config: RigConfig,
}

impl Session {
    /// 加载配置（文件不存在时使用默认值）
    pub fn load(path: &Path) -> Result<Self> {
        let config = RigConfig::load_or_default(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// 装配并连接混气台
    pub fn connect(&self) -> Result<Rig> {
        println!("⏳ 连接混气台（仿真后端）...");
        let rig = settings::simulated_rig(&self.config).context("装配混气台失败")?;
        rig.connect_all().context("连接设备失败")?;
        println!("✅ 已连接: {} / {}", rig.port(ChannelId::Target), rig.port(ChannelId::Diluent));
        Ok(rig)
    }

    pub fn event_channel(&self) -> (EventSender, crossbeam_channel::Receiver<RigEvent>) {
        event_channel(self.config.telemetry.event_queue_capacity)
    }
}

/// 安装 Ctrl+C 处理函数
pub fn on_ctrl_c(handler: impl FnMut() + Send + 'static) -> Result<()> {
    ctrlc::set_handler(handler).context("安装 Ctrl+C 处理函数失败")
}

/// 执行前确认（`--yes` 跳过）
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    inquire::Confirm::new(prompt)
        .with_default(false)
        .prompt()
        .map_err(|e| anyhow::anyhow!("用户交互失败: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(session.config, RigConfig::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();
        assert!(Session::load(&path).is_err());
    }

    #[test]
    fn test_confirm_skipped_with_yes() {
        assert!(confirm("continue?", true).unwrap());
    }
}
