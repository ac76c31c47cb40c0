//! 配置文件 → 运行时参数
//!
//! [`RigConfig`] 只描述数值；这里把它转换为各层使用的类型。

use gasmix_control::{CalibrationTiming, ExecutorConfig, PidGains, WriteMode};
use gasmix_device::{CalibrationError, CalibrationRange};
use gasmix_driver::{RetryPolicy, TelemetryConfig};
#[cfg(feature = "sim")]
use gasmix_driver::{DriverError, Rig};
use gasmix_tools::config::WriteModeSetting;
use gasmix_tools::{KalmanFilter, RigConfig};
use std::time::Duration;

pub fn pid_gains(config: &RigConfig) -> PidGains {
    PidGains::new(config.pid.kp, config.pid.ki, config.pid.kd)
}

pub fn retry_policy(config: &RigConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.retry.max_attempts,
        Duration::from_millis(config.retry.backoff_ms),
    )
}

pub fn telemetry_config(config: &RigConfig) -> TelemetryConfig {
    TelemetryConfig {
        interval: Duration::from_millis(config.telemetry.interval_ms),
    }
}

/// 执行器配置（运行期间同时采样遥测）
pub fn executor_config(config: &RigConfig) -> ExecutorConfig {
    let write_mode = match config.flow.write_mode {
        WriteModeSetting::BestEffort => WriteMode::BestEffort,
        WriteModeSetting::Retry => WriteMode::Retry(retry_policy(config)),
    };
    ExecutorConfig {
        write_mode,
        min_tick_period: Duration::from_millis(config.flow.min_tick_ms),
        telemetry: Some(telemetry_config(config)),
        ..ExecutorConfig::default()
    }
}

/// 启动时的标定区间
pub fn calibration_range(config: &RigConfig) -> Result<CalibrationRange, CalibrationError> {
    CalibrationRange::new(config.calibration.voltage_min, config.calibration.voltage_max)
}

pub fn calibration_timing(config: &RigConfig) -> CalibrationTiming {
    CalibrationTiming {
        sample_count: config.calibration.sample_count,
        sample_interval: Duration::from_millis(config.calibration.sample_interval_ms),
        ..CalibrationTiming::default()
    }
}

/// 启用时返回浓度滤波器
pub fn kalman_filter(config: &RigConfig) -> Option<KalmanFilter> {
    let filter = &config.filter;
    filter
        .enabled
        .then(|| KalmanFilter::new(filter.process_variance, filter.measurement_variance))
}

#[cfg(feature = "sim")]
pub fn sim_config(config: &RigConfig) -> gasmix_device::SimConfig {
    let sim = &config.sim;
    gasmix_device::SimConfig {
        source_ppm: sim.source_ppm,
        time_constant: Duration::from_millis(sim.time_constant_ms),
        io_latency: Duration::from_millis(sim.io_latency_ms),
        sensor_noise_ppm: sim.sensor_noise_ppm,
        ..gasmix_device::SimConfig::default()
    }
}

/// 按配置装配仿真混气台（未连接）
#[cfg(feature = "sim")]
pub fn simulated_rig(config: &RigConfig) -> Result<Rig, DriverError> {
    use gasmix_control::FilteredSensor;
    use gasmix_device::{CalibrationStore, SimulatedRig};
    use gasmix_driver::RigBuilder;

    let range =
        calibration_range(config).map_err(|e| DriverError::InvalidConfig(e.to_string()))?;
    let sim = SimulatedRig::new(sim_config(config));
    let store = CalibrationStore::new(range);

    let builder = RigBuilder::new()
        .target_channel(sim.target_channel("sim://channel1"))
        .diluent_channel(sim.diluent_channel("sim://channel2"));
    let builder = match kalman_filter(config) {
        Some(filter) => builder.sensor(FilteredSensor::new(sim.sensor(store), filter)),
        None => builder.sensor(sim.sensor(store)),
    };
    builder.build()
}
