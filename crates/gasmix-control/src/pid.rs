//! PID Controller - 浓度闭环控制器
//!
//! # 算法
//!
//! ```text
//! error          = setpoint - measured
//! integral      += error
//! raw            = Kp * error + Ki * integral + Kd * (error - previous_error)
//! control_signal = clamp(raw / 200, 0, 100)
//! ```
//!
//! 积分项不做抗饱和限制；状态只在整次序列运行开始时清零，阶段之间保留。
//!
//! 控制信号是目标气在总流量中的百分比：
//!
//! ```text
//! channel1 = F / 100 * control_signal
//! channel2 = F - channel1
//! ```

/// 原始输出的缩放除数
pub const OUTPUT_SCALE: f64 = 200.0;

/// 控制信号下限
pub const SIGNAL_MIN: f64 = 0.0;

/// 控制信号上限（百分比）
pub const SIGNAL_MAX: f64 = 100.0;

/// PID 增益
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd }
    }
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.395,
            ki: 0.035,
            kd: 0.1,
        }
    }
}

/// PID 内部状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidState {
    /// 误差累积（无上限）
    pub integral: f64,
    pub previous_error: f64,
}

/// PID 控制器
///
/// # 示例
///
/// ```rust
/// use gasmix_control::{FlowSplit, PidController};
///
/// let mut pid = PidController::default().with_gains(0.395, 0.035, 0.1);
/// let signal = pid.update(5000.0, 4000.0);
/// let split = FlowSplit::from_signal(100.0, signal);
/// assert!((split.channel1 + split.channel2 - 100.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PidController {
    gains: PidGains,
    state: PidState,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            state: PidState::default(),
        }
    }

    /// 设置 PID 增益
    pub fn with_gains(mut self, kp: f64, ki: f64, kd: f64) -> Self {
        self.gains = PidGains::new(kp, ki, kd);
        self
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn state(&self) -> PidState {
        self.state
    }

    /// 清零积分与上次误差
    pub fn reset(&mut self) {
        self.state = PidState::default();
    }

    /// 计算一次控制信号（0 ~ 100）
    pub fn update(&mut self, setpoint: f64, measured: f64) -> f64 {
        let error = setpoint - measured;

        let proportional = self.gains.kp * error;

        self.state.integral += error;
        let integral_term = self.gains.ki * self.state.integral;

        let derivative = self.gains.kd * (error - self.state.previous_error);
        self.state.previous_error = error;

        let raw = proportional + integral_term + derivative;
        (raw / OUTPUT_SCALE).clamp(SIGNAL_MIN, SIGNAL_MAX)
    }
}

/// 两路流量分配
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowSplit {
    /// 目标气（sccm）
    pub channel1: f64,
    /// 稀释气（sccm）
    pub channel2: f64,
}

impl FlowSplit {
    /// 按控制信号拆分总流量，`channel1 + channel2 == total`
    ///
    /// 浮点舍入可能让 `channel2` 出现 -1e-14 之类的值，截到 0。
    pub fn from_signal(total: f64, signal: f64) -> Self {
        let channel1 = total / 100.0 * signal;
        Self {
            channel1,
            channel2: (total - channel1).max(0.0),
        }
    }

    pub fn total(&self) -> f64 {
        self.channel1 + self.channel2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_gains() {
        let gains = PidGains::default();
        assert_eq!(gains, PidGains::new(0.395, 0.035, 0.1));
    }

    #[test]
    fn test_single_update_matches_formula() {
        let mut pid = PidController::new(PidGains::default());
        // error = 1000
        // raw = 0.395*1000 + 0.035*1000 + 0.1*1000 = 530
        let signal = pid.update(5000.0, 4000.0);
        assert!((signal - 530.0 / 200.0).abs() < 1e-12);
        assert_eq!(pid.state().integral, 1000.0);
        assert_eq!(pid.state().previous_error, 1000.0);
    }

    #[test]
    fn test_output_clamped() {
        let mut pid = PidController::new(PidGains::default());
        // raw = (0.395 + 0.035 + 0.1) * 20000 = 10600
        assert!((pid.update(20_000.0, 0.0) - 53.0).abs() < 1e-9);

        let mut pid = PidController::new(PidGains::default());
        assert_eq!(pid.update(0.0, 5000.0), 0.0);
    }

    #[test]
    fn test_saturates_at_100() {
        let mut pid = PidController::new(PidGains::new(1.0, 0.0, 0.0));
        assert_eq!(pid.update(50_000.0, 0.0), 100.0);
    }

    #[test]
    fn test_integral_unbounded() {
        let mut pid = PidController::new(PidGains::default());
        for _ in 0..10_000 {
            pid.update(20_000.0, 0.0);
        }
        // 积分项无上限
        assert_eq!(pid.state().integral, 20_000.0 * 10_000.0);
    }

    #[test]
    fn test_reset() {
        let mut pid = PidController::new(PidGains::default());
        pid.update(100.0, 0.0);
        pid.reset();
        assert_eq!(pid.state(), PidState::default());
    }

    #[test]
    fn test_flow_split_examples() {
        let split = FlowSplit::from_signal(100.0, 25.0);
        assert_eq!(split.channel1, 25.0);
        assert_eq!(split.channel2, 75.0);

        let split = FlowSplit::from_signal(200.0, 0.0);
        assert_eq!(split.channel1, 0.0);
        assert_eq!(split.channel2, 200.0);
    }

    proptest! {
        #[test]
        fn prop_flow_sum_equals_total(
            total in 0.1f64..=500.0,
            setpoints in prop::collection::vec(0.0f64..=20_000.0, 1..50),
            measured in prop::collection::vec(0.0f64..=20_000.0, 1..50),
        ) {
            let mut pid = PidController::new(PidGains::default());
            for (sp, m) in setpoints.iter().zip(measured.iter()) {
                let signal = pid.update(*sp, *m);
                prop_assert!((SIGNAL_MIN..=SIGNAL_MAX).contains(&signal));
                let split = FlowSplit::from_signal(total, signal);
                prop_assert!((split.total() - total).abs() < 1e-9);
                prop_assert!(split.channel1 >= 0.0 && split.channel2 >= 0.0);
            }
        }

        #[test]
        fn prop_zero_error_gives_zero_signal(
            setpoint in 0.0f64..=20_000.0,
            ticks in 1usize..100,
        ) {
            let mut pid = PidController::new(PidGains::default());
            for _ in 0..ticks {
                prop_assert_eq!(pid.update(setpoint, setpoint), 0.0);
            }
        }
    }
}
