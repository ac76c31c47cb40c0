//! 混气台运行指标
//!
//! 原子计数器，任意线程可读，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 混气台实时指标
///
/// # 使用示例
///
/// ```rust
/// use gasmix_driver::RigMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = RigMetrics::default();
/// metrics.writes_ok.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.writes_ok, 1);
/// ```
#[derive(Debug, Default)]
pub struct RigMetrics {
    /// 成功的写入次数（按设备调用计）
    pub writes_ok: AtomicU64,

    /// 失败的写入次数（按设备调用计，包括被重试掉的失败）
    pub writes_failed: AtomicU64,

    /// 重试次数（尝试次数 - 1 的累计）
    pub write_retries: AtomicU64,

    /// 重试耗尽的命令数
    pub commands_exhausted: AtomicU64,

    /// 重试期间被取消的命令数
    pub commands_cancelled: AtomicU64,

    /// 遥测采样周期数
    pub telemetry_cycles: AtomicU64,

    /// 关机例程执行次数
    pub shutdowns: AtomicU64,
}

impl RigMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes_ok: self.writes_ok.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
            write_retries: self.write_retries.load(Ordering::Relaxed),
            commands_exhausted: self.commands_exhausted.load(Ordering::Relaxed),
            commands_cancelled: self.commands_cancelled.load(Ordering::Relaxed),
            telemetry_cycles: self.telemetry_cycles.load(Ordering::Relaxed),
            shutdowns: self.shutdowns.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.writes_ok.store(0, Ordering::Relaxed);
        self.writes_failed.store(0, Ordering::Relaxed);
        self.write_retries.store(0, Ordering::Relaxed);
        self.commands_exhausted.store(0, Ordering::Relaxed);
        self.commands_cancelled.store(0, Ordering::Relaxed);
        self.telemetry_cycles.store(0, Ordering::Relaxed);
        self.shutdowns.store(0, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricsSnapshot {
    pub writes_ok: u64,
    pub writes_failed: u64,
    pub write_retries: u64,
    pub commands_exhausted: u64,
    pub commands_cancelled: u64,
    pub telemetry_cycles: u64,
    pub shutdowns: u64,
}

impl MetricsSnapshot {
    /// 写入失败率（0.0 ~ 1.0）
    pub fn write_failure_rate(&self) -> f64 {
        let total = self.writes_ok + self.writes_failed;
        if total == 0 {
            0.0
        } else {
            self.writes_failed as f64 / total as f64
        }
    }
}
