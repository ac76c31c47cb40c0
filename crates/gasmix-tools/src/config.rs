//! # 混气台配置
//!
//! TOML 配置文件，各字段缺省值即混气台出厂参数：
//!
//! ```toml
//! [pid]
//! kp = 0.395
//! ki = 0.035
//! kd = 0.1
//!
//! [flow]
//! total_setpoint_sccm = 100.0
//! write_mode = "best-effort"
//!
//! [retry]
//! max_attempts = 3
//! backoff_ms = 1000
//! ```
//!
//! 配置文件路径（由 CLI 决定）：
//! - Linux: `~/.config/gasmix/config.toml`
//! - macOS: `~/Library/Application Support/gasmix/config.toml`
//! - Windows: `%APPDATA%\gasmix\config.toml`

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// 混气台配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RigConfig {
    pub pid: PidSettings,
    pub flow: FlowSettings,
    pub retry: RetrySettings,
    pub telemetry: TelemetrySettings,
    pub calibration: CalibrationSettings,
    pub filter: FilterSettings,
    pub sim: SimSettings,
}

/// PID 增益
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidSettings {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidSettings {
    fn default() -> Self {
        Self {
            kp: 0.395,
            ki: 0.035,
            kd: 0.1,
        }
    }
}

/// 执行器写入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WriteModeSetting {
    /// 单次尝试，失败记录后继续
    #[default]
    BestEffort,
    /// 按 `[retry]` 重试，耗尽则中止运行
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// 两路总流量（sccm）
    pub total_setpoint_sccm: f64,
    /// 控制循环最小周期（ms，0 = 仅受设备 IO 限制）
    pub min_tick_ms: u64,
    pub write_mode: WriteModeSetting,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            total_setpoint_sccm: 100.0,
            min_tick_ms: 0,
            write_mode: WriteModeSetting::BestEffort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub interval_ms: u64,
    /// 前台事件队列容量
    pub event_queue_capacity: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            event_queue_capacity: 256,
        }
    }
}

/// 标定参数（区间本身不持久化，这里只是启动时的初始值）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub voltage_min: f64,
    pub voltage_max: f64,
    pub sample_count: usize,
    pub sample_interval_ms: u64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            voltage_min: 0.821,
            voltage_max: 2.763,
            sample_count: 100,
            sample_interval_ms: 100,
        }
    }
}

/// 浓度读数平滑
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub enabled: bool,
    pub process_variance: f64,
    pub measurement_variance: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            process_variance: 1.0,
            measurement_variance: 100.0,
        }
    }
}

/// 仿真后端参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    pub source_ppm: f64,
    pub time_constant_ms: u64,
    pub io_latency_ms: u64,
    pub sensor_noise_ppm: f64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            source_ppm: 20_000.0,
            time_constant_ms: 8_000,
            io_latency_ms: 20,
            sensor_noise_ppm: 15.0,
        }
    }
}

impl RigConfig {
    /// 创建默认配置
    pub fn default_config() -> Self {
        Self::default()
    }

    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RigConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// 文件不存在时返回默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }

    /// 保存配置到文件（自动创建父目录）
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        self.validate()?;
        let content = self.to_toml_string()?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, content).map_err(io_err)
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let pid = &self.pid;
        if ![pid.kp, pid.ki, pid.kd].iter().all(|g| g.is_finite()) {
            return invalid("pid gains must be finite".into());
        }
        let total = self.flow.total_setpoint_sccm;
        if !(total > 0.0 && total <= 500.0) {
            return invalid(format!(
                "flow.total_setpoint_sccm must be in (0, 500], got {}",
                total
            ));
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".into());
        }
        if self.telemetry.interval_ms == 0 {
            return invalid("telemetry.interval_ms must be greater than 0".into());
        }
        if self.telemetry.event_queue_capacity == 0 {
            return invalid("telemetry.event_queue_capacity must be greater than 0".into());
        }
        let cal = &self.calibration;
        if !(cal.voltage_min.is_finite()
            && cal.voltage_max.is_finite()
            && cal.voltage_min < cal.voltage_max)
        {
            return invalid(format!(
                "calibration requires voltage_min < voltage_max, got {} / {}",
                cal.voltage_min, cal.voltage_max
            ));
        }
        if cal.sample_count == 0 {
            return invalid("calibration.sample_count must be at least 1".into());
        }
        let filter = &self.filter;
        if filter.process_variance < 0.0 || filter.measurement_variance < 0.0 {
            return invalid("filter variances must not be negative".into());
        }
        if self.sim.source_ppm <= 0.0 {
            return invalid("sim.source_ppm must be greater than 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RigConfig::default_config();
        assert_eq!(config.pid.kp, 0.395);
        assert_eq!(config.pid.ki, 0.035);
        assert_eq!(config.pid.kd, 0.1);
        assert_eq!(config.flow.total_setpoint_sccm, 100.0);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_ms, 1000);
        assert_eq!(config.telemetry.interval_ms, 500);
        assert_eq!(config.calibration.sample_count, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = RigConfig::from_toml_str(
            r#"
[pid]
kp = 0.5

[flow]
write_mode = "retry"
"#,
        )
        .unwrap();
        assert_eq!(config.pid.kp, 0.5);
        assert_eq!(config.pid.ki, 0.035);
        assert_eq!(config.flow.write_mode, WriteModeSetting::Retry);
        assert_eq!(config.flow.total_setpoint_sccm, 100.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            RigConfig::from_toml_str("[retry]\nmax_attempts = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RigConfig::from_toml_str("[calibration]\nvoltage_min = 3.0\nvoltage_max = 1.0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RigConfig::from_toml_str("[flow]\ntotal_setpoint_sccm = 800.0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RigConfig::from_toml_str("[pid\nkp = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = RigConfig::default();
        config.pid.kd = 0.25;
        config.telemetry.interval_ms = 250;
        config.save_to_file(&path).unwrap();

        let loaded = RigConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = RigConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, RigConfig::default());

        assert!(matches!(
            RigConfig::load_from_file(dir.path().join("absent.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
