//! 浓度读数平滑
//!
//! 包装任意 [`ConcentrationSensor`]，对 `read_ppm` 的结果做一维卡尔曼滤波。
//! 原始电压不经过滤波，标定采样看到的仍是真实读数。

use gasmix_device::{CalibrationStore, ConcentrationSensor, DeviceError};
use gasmix_tools::KalmanFilter;

/// 带卡尔曼滤波的传感器
#[derive(Debug)]
pub struct FilteredSensor<S> {
    inner: S,
    filter: KalmanFilter,
}

impl<S: ConcentrationSensor> FilteredSensor<S> {
    pub fn new(inner: S, filter: KalmanFilter) -> Self {
        Self { inner, filter }
    }

    pub fn filter(&self) -> &KalmanFilter {
        &self.filter
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ConcentrationSensor> ConcentrationSensor for FilteredSensor<S> {
    fn connect(&mut self) -> Result<(), DeviceError> {
        self.inner.connect()
    }

    fn sample_voltage(&mut self) -> Result<f64, DeviceError> {
        self.inner.sample_voltage()
    }

    fn calibration(&self) -> &CalibrationStore {
        self.inner.calibration()
    }

    fn read_raw_voltage(&mut self) -> f64 {
        self.inner.read_raw_voltage()
    }

    fn read_ppm(&mut self) -> f64 {
        let ppm = self.inner.read_ppm();
        self.filter.update(ppm)
    }
}
