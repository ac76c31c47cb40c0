//! # 标量卡尔曼滤波
//!
//! 用于平滑浓度读数：
//!
//! ```text
//! K = P / (P + R)
//! x = x + K * (z - x)
//! P = (1 - K) * P + Q
//! ```

use serde::{Deserialize, Serialize};

/// 一维卡尔曼滤波器
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KalmanFilter {
    /// Q：过程噪声方差
    pub process_variance: f64,
    /// R：测量噪声方差
    pub measurement_variance: f64,
    /// 当前估计
    pub estimate: f64,
    /// P：估计不确定度
    pub estimate_uncertainty: f64,
}

impl KalmanFilter {
    /// 创建滤波器（初始估计 0，不确定度 1）
    pub fn new(process_variance: f64, measurement_variance: f64) -> Self {
        Self::with_initial(process_variance, measurement_variance, 0.0, 1.0)
    }

    pub fn with_initial(
        process_variance: f64,
        measurement_variance: f64,
        initial_estimate: f64,
        initial_uncertainty: f64,
    ) -> Self {
        Self {
            process_variance,
            measurement_variance,
            estimate: initial_estimate,
            estimate_uncertainty: initial_uncertainty,
        }
    }

    /// 输入一个测量值，返回新的估计
    pub fn update(&mut self, measurement: f64) -> f64 {
        let denom = self.estimate_uncertainty + self.measurement_variance;
        let gain = if denom > 0.0 {
            self.estimate_uncertainty / denom
        } else {
            1.0
        };
        self.estimate += gain * (measurement - self.estimate);
        self.estimate_uncertainty =
            (1.0 - gain) * self.estimate_uncertainty + self.process_variance;
        self.estimate
    }

    /// 重置估计（保留噪声参数）
    pub fn reset(&mut self, estimate: f64, uncertainty: f64) {
        self.estimate = estimate;
        self.estimate_uncertainty = uncertainty;
    }
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new(1e-3, 0.1)
    }
}
