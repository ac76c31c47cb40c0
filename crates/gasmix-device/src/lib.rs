//! # Gasmix Device Layer
//!
//! 混气台设备抽象层：流量通道（MFC）与浓度传感器的统一接口。
//!
//! 串口帧格式由具体驱动负责，本层只定义：
//! - [`FlowChannel`]：单路质量流量控制器（写设定值、读实测流量）
//! - [`ConcentrationSensor`]：浓度传感器（读原始电压，经标定映射为 ppm）
//! - [`DeviceError`]：设备错误分类
//! - [`CalibrationStore`]：进程内共享的标定区间（单写多读）

use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

pub mod calibration;

#[cfg(feature = "sim")]
pub mod sim;

#[cfg(feature = "mock")]
pub mod mock;

pub use calibration::{CalibrationError, CalibrationRange, CalibrationStore};

#[cfg(feature = "sim")]
pub use sim::{SimConfig, SimFlowChannel, SimSensor, SimulatedRig};

/// 单路流量控制器的满量程（sccm）
pub const MAX_CHANNEL_FLOW_SCCM: f64 = 500.0;

/// 设备层统一错误类型
///
/// 需要 `Clone`：通道进入 `Faulted` 状态时会保存最后一次错误。
#[derive(Error, Debug, Clone)]
pub enum DeviceError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),
    #[error("Device Error: {0}")]
    Device(#[from] DeviceFault),
    #[error("Device timeout")]
    Timeout,
    #[error("Device not connected")]
    NotConnected,
    #[error("Value {value} out of range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        DeviceError::Io(Arc::new(err))
    }
}

/// 设备故障的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFaultKind {
    Unknown,
    NotFound,
    AccessDenied,
    Busy,
    InvalidResponse,
    Rejected,
    Backend,
}

/// 结构化设备故障
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceFault {
    pub kind: DeviceFaultKind,
    pub message: String,
}

impl DeviceFault {
    pub fn new(kind: DeviceFaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 是否为不可恢复的故障（重试无意义）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            DeviceFaultKind::NotFound | DeviceFaultKind::AccessDenied
        )
    }
}

impl From<String> for DeviceFault {
    fn from(message: String) -> Self {
        Self::new(DeviceFaultKind::Unknown, message)
    }
}

impl From<&str> for DeviceFault {
    fn from(message: &str) -> Self {
        Self::new(DeviceFaultKind::Unknown, message)
    }
}

/// 单路质量流量控制器
///
/// 实现者只需提供可失败的 `read_*` 方法；
/// `get_measured_flow` / `get_current_setpoint` 是读边界：失败时记录日志并返回 0。
pub trait FlowChannel: Send {
    /// 设备端口（日志与诊断用）
    fn port(&self) -> &str;

    fn connect(&mut self) -> Result<(), DeviceError>;

    /// 写入流量设定值（sccm）
    fn set_flow_rate(&mut self, sccm: f64) -> Result<(), DeviceError>;

    fn read_measured_flow(&mut self) -> Result<f64, DeviceError>;

    fn read_setpoint(&mut self) -> Result<f64, DeviceError>;

    fn get_measured_flow(&mut self) -> f64 {
        match self.read_measured_flow() {
            Ok(flow) => flow,
            Err(e) => {
                warn!(port = self.port(), "Failed to read measured flow: {}", e);
                0.0
            },
        }
    }

    fn get_current_setpoint(&mut self) -> f64 {
        match self.read_setpoint() {
            Ok(sp) => sp,
            Err(e) => {
                warn!(port = self.port(), "Failed to read setpoint: {}", e);
                0.0
            },
        }
    }
}

/// 浓度传感器
///
/// `read_ppm` 通过共享的 [`CalibrationStore`] 把电压映射为浓度；
/// 读失败时电压退化为 0，映射结果也就是 0 ppm。
pub trait ConcentrationSensor: Send {
    fn connect(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    /// 采集一次原始电压（V）
    fn sample_voltage(&mut self) -> Result<f64, DeviceError>;

    fn calibration(&self) -> &CalibrationStore;

    fn read_raw_voltage(&mut self) -> f64 {
        match self.sample_voltage() {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to read sensor voltage: {}", e);
                0.0
            },
        }
    }

    fn read_ppm(&mut self) -> f64 {
        let voltage = self.read_raw_voltage();
        self.calibration().voltage_to_ppm(voltage)
    }
}

impl<T: FlowChannel + ?Sized> FlowChannel for Box<T> {
    fn port(&self) -> &str {
        (**self).port()
    }
    fn connect(&mut self) -> Result<(), DeviceError> {
        (**self).connect()
    }
    fn set_flow_rate(&mut self, sccm: f64) -> Result<(), DeviceError> {
        (**self).set_flow_rate(sccm)
    }
    fn read_measured_flow(&mut self) -> Result<f64, DeviceError> {
        (**self).read_measured_flow()
    }
    fn read_setpoint(&mut self) -> Result<f64, DeviceError> {
        (**self).read_setpoint()
    }
    fn get_measured_flow(&mut self) -> f64 {
        (**self).get_measured_flow()
    }
    fn get_current_setpoint(&mut self) -> f64 {
        (**self).get_current_setpoint()
    }
}

impl<T: ConcentrationSensor + ?Sized> ConcentrationSensor for Box<T> {
    fn connect(&mut self) -> Result<(), DeviceError> {
        (**self).connect()
    }
    fn sample_voltage(&mut self) -> Result<f64, DeviceError> {
        (**self).sample_voltage()
    }
    fn calibration(&self) -> &CalibrationStore {
        (**self).calibration()
    }
    fn read_raw_voltage(&mut self) -> f64 {
        (**self).read_raw_voltage()
    }
    fn read_ppm(&mut self) -> f64 {
        (**self).read_ppm()
    }
}

/// 检查设定值是否在通道量程内
pub fn check_flow_range(sccm: f64) -> Result<(), DeviceError> {
    if sccm.is_finite() && (0.0..=MAX_CHANNEL_FLOW_SCCM).contains(&sccm) {
        Ok(())
    } else {
        Err(DeviceError::OutOfRange {
            value: sccm,
            min: 0.0,
            max: MAX_CHANNEL_FLOW_SCCM,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyChannel {
        fail: bool,
    }

    impl FlowChannel for FlakyChannel {
        fn port(&self) -> &str {
            "flaky"
        }
        fn connect(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }
        fn set_flow_rate(&mut self, _sccm: f64) -> Result<(), DeviceError> {
            Ok(())
        }
        fn read_measured_flow(&mut self) -> Result<f64, DeviceError> {
            if self.fail {
                Err(DeviceError::Timeout)
            } else {
                Ok(42.0)
            }
        }
        fn read_setpoint(&mut self) -> Result<f64, DeviceError> {
            Err(DeviceFault::new(DeviceFaultKind::InvalidResponse, "garbled").into())
        }
    }

    #[test]
    fn test_read_failure_degrades_to_zero() {
        let mut ch = FlakyChannel { fail: true };
        assert_eq!(ch.get_measured_flow(), 0.0);
        assert_eq!(ch.get_current_setpoint(), 0.0);

        let mut ch = FlakyChannel { fail: false };
        assert_eq!(ch.get_measured_flow(), 42.0);
    }

    #[test]
    fn test_boxed_channel_delegates() {
        let mut ch: Box<dyn FlowChannel> = Box::new(FlakyChannel { fail: false });
        assert_eq!(ch.port(), "flaky");
        assert_eq!(ch.get_measured_flow(), 42.0);
    }

    #[test]
    fn test_device_fault_fatality() {
        assert!(DeviceFault::new(DeviceFaultKind::NotFound, "no port").is_fatal());
        assert!(!DeviceFault::new(DeviceFaultKind::Busy, "busy").is_fatal());
        let fault: DeviceFault = "oops".into();
        assert_eq!(fault.kind, DeviceFaultKind::Unknown);
    }

    #[test]
    fn test_check_flow_range() {
        assert!(check_flow_range(0.0).is_ok());
        assert!(check_flow_range(500.0).is_ok());
        assert!(matches!(
            check_flow_range(500.1),
            Err(DeviceError::OutOfRange { .. })
        ));
        assert!(check_flow_range(-1.0).is_err());
        assert!(check_flow_range(f64::NAN).is_err());
    }

    #[test]
    fn test_io_error_is_cloneable() {
        let err: DeviceError = std::io::Error::other("port closed").into();
        let cloned = err.clone();
        assert!(cloned.to_string().contains("port closed"));
    }
}
