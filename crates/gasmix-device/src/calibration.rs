//! 传感器标定区间
//!
//! 电压 → 浓度的线性映射：
//! - `v < voltage_min` 时为 0 ppm
//! - 否则 `(v - voltage_min) * 20000 / (voltage_max - voltage_min)`
//!
//! 区间在进程内共享：标定流程是唯一写者，传感器映射是读者。
//! 使用 `ArcSwap` 整体替换，读者永远看到一致的 `(min, max)` 组合。

use arc_swap::ArcSwap;
use std::sync::Arc;
use thiserror::Error;

/// 传感器满量程（ppm）
pub const FULL_SCALE_PPM: f64 = 20_000.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("Calibration voltage is not finite (min={min}, max={max})")]
    NonFinite { min: f64, max: f64 },
    #[error("Calibration range requires min < max (min={min}, max={max})")]
    Inverted { min: f64, max: f64 },
}

/// 标定区间（V）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationRange {
    pub voltage_min: f64,
    pub voltage_max: f64,
}

impl CalibrationRange {
    pub const DEFAULT_VOLTAGE_MIN: f64 = 0.821;
    pub const DEFAULT_VOLTAGE_MAX: f64 = 2.763;

    /// 创建并校验标定区间
    pub fn new(voltage_min: f64, voltage_max: f64) -> Result<Self, CalibrationError> {
        if !voltage_min.is_finite() || !voltage_max.is_finite() {
            return Err(CalibrationError::NonFinite {
                min: voltage_min,
                max: voltage_max,
            });
        }
        if voltage_min >= voltage_max {
            return Err(CalibrationError::Inverted {
                min: voltage_min,
                max: voltage_max,
            });
        }
        Ok(Self {
            voltage_min,
            voltage_max,
        })
    }

    /// 电压 → 浓度（ppm）
    pub fn voltage_to_ppm(&self, voltage: f64) -> f64 {
        if voltage < self.voltage_min {
            return 0.0;
        }
        (voltage - self.voltage_min) * FULL_SCALE_PPM / (self.voltage_max - self.voltage_min)
    }

    /// 浓度 → 电压（仿真与测试用的反向映射）
    pub fn ppm_to_voltage(&self, ppm: f64) -> f64 {
        self.voltage_min + ppm.max(0.0) * (self.voltage_max - self.voltage_min) / FULL_SCALE_PPM
    }
}

impl Default for CalibrationRange {
    fn default() -> Self {
        Self {
            voltage_min: Self::DEFAULT_VOLTAGE_MIN,
            voltage_max: Self::DEFAULT_VOLTAGE_MAX,
        }
    }
}

/// 共享标定存储
///
/// Clone 只复制 `Arc`，所有副本指向同一份区间。
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    inner: Arc<ArcSwap<CalibrationRange>>,
}

impl CalibrationStore {
    pub fn new(range: CalibrationRange) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(range)),
        }
    }

    /// 读取当前区间（无锁）
    pub fn current(&self) -> CalibrationRange {
        **self.inner.load()
    }

    /// 整体替换区间
    pub fn replace(&self, range: CalibrationRange) {
        self.inner.store(Arc::new(range));
    }

    pub fn voltage_to_ppm(&self, voltage: f64) -> f64 {
        self.inner.load().voltage_to_ppm(voltage)
    }
}

impl Default for CalibrationStore {
    fn default() -> Self {
        Self::new(CalibrationRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_mapping() {
        let range = CalibrationRange::default();
        assert_eq!(range.voltage_to_ppm(0.5), 0.0);
        assert_eq!(range.voltage_to_ppm(0.821), 0.0);
        assert!((range.voltage_to_ppm(2.763) - 20_000.0).abs() < 1e-9);
        let mid = (0.821 + 2.763) / 2.0;
        assert!((range.voltage_to_ppm(mid) - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_new_rejects_inverted_and_nan() {
        assert!(matches!(
            CalibrationRange::new(2.0, 1.0),
            Err(CalibrationError::Inverted { .. })
        ));
        assert!(matches!(
            CalibrationRange::new(1.0, 1.0),
            Err(CalibrationError::Inverted { .. })
        ));
        assert!(matches!(
            CalibrationRange::new(f64::NAN, 1.0),
            Err(CalibrationError::NonFinite { .. })
        ));
        assert!(CalibrationRange::new(0.5, 3.0).is_ok());
    }

    #[test]
    fn test_store_shared_between_clones() {
        let store = CalibrationStore::default();
        let reader = store.clone();
        let new_range = CalibrationRange::new(1.0, 3.0).unwrap();
        store.replace(new_range);
        assert_eq!(reader.current(), new_range);
        assert!((reader.voltage_to_ppm(2.0) - 10_000.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_ppm_voltage_inverse(ppm in 0.0f64..20_000.0) {
            let range = CalibrationRange::default();
            let v = range.ppm_to_voltage(ppm);
            prop_assert!((range.voltage_to_ppm(v) - ppm).abs() < 1e-6);
        }
    }
}
