//! 配置管理命令

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use gasmix_sdk::prelude::*;
use std::path::Path;
use toml::Value;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示生效的配置
    Show,

    /// 显示配置文件路径
    Path,

    /// 写入默认配置
    Init {
        /// 覆盖已有文件
        #[arg(long)]
        force: bool,
    },

    /// 修改单个配置项，如 `set pid.kp 0.4`
    Set {
        /// `段.字段`
        key: String,
        value: String,
    },
}

impl ConfigCommand {
    pub fn execute(&self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Show => {
                let config = RigConfig::load_or_default(path)?;
                if !path.exists() {
                    println!("# {} 不存在，显示默认值", path.display());
                }
                print!("{}", config.to_toml_string()?);
            },
            ConfigCommand::Path => println!("{}", path.display()),
            ConfigCommand::Init { force } => {
                if path.exists() && !force {
                    bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
                }
                RigConfig::default().save_to_file(path)?;
                println!("✅ 已写入默认配置: {}", path.display());
            },
            ConfigCommand::Set { key, value } => {
                let config = RigConfig::load_or_default(path)?;
                let updated = set_value(&config, key, value)?;
                updated.save_to_file(path)?;
                println!("✅ {} = {}", key, value);
            },
        }
        Ok(())
    }
}

/// 按 `段.字段` 修改配置，新值沿用原值的类型
pub fn set_value(config: &RigConfig, key: &str, raw: &str) -> Result<RigConfig> {
    let (section, field) = key
        .split_once('.')
        .with_context(|| format!("配置项格式应为 段.字段，收到 {}", key))?;

    let mut doc = Value::try_from(config)?;
    let table = doc
        .get_mut(section)
        .and_then(Value::as_table_mut)
        .with_context(|| format!("未知配置段: {}", section))?;
    let current = table
        .get(field)
        .with_context(|| format!("未知配置项: {}", key))?;

    let value = match current {
        Value::Boolean(_) => Value::Boolean(
            raw.parse()
                .with_context(|| format!("{} 需要 true 或 false", key))?,
        ),
        Value::Integer(_) => Value::Integer(
            raw.parse()
                .with_context(|| format!("{} 需要整数", key))?,
        ),
        Value::Float(_) => Value::Float(
            raw.parse()
                .with_context(|| format!("{} 需要数值", key))?,
        ),
        Value::String(_) => Value::String(raw.to_string()),
        _ => bail!("{} 不是单值配置项", key),
    };
    table.insert(field.to_string(), value);

    let updated: RigConfig = doc
        .try_into()
        .with_context(|| format!("{} 的取值无效: {}", key, raw))?;
    updated.validate()?;
    Ok(updated)
}
