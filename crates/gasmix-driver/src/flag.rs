//! 协作式取消标志
//!
//! 后台循环在每个 tick 顶部、每个阶段边界检查标志；
//! 任意线程清除标志即请求停止。正在进行的设备调用不会被打断。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 可中断休眠的检查粒度
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// 运行标志（set = 继续运行）
#[derive(Debug, Clone, Default)]
pub struct RunFlag {
    inner: Arc<AtomicBool>,
}

impl RunFlag {
    /// 创建处于清除状态的标志
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建已置位的标志
    pub fn raised() -> Self {
        let flag = Self::new();
        flag.raise();
        flag
    }

    pub fn raise(&self) {
        self.inner.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.inner.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }

    /// 可中断休眠
    ///
    /// 按 20ms 粒度检查标志，被清除时提前返回。
    /// 返回休眠结束时标志是否仍然置位。
    pub fn sleep(&self, duration: Duration) -> bool {
        sleep_while(duration, || self.is_set())
    }

    /// 同 [`sleep`](Self::sleep)，`other` 被清除时也提前返回
    ///
    /// 返回休眠结束时两个标志是否都仍然置位。
    pub fn sleep_with(&self, other: &RunFlag, duration: Duration) -> bool {
        sleep_while(duration, || self.is_set() && other.is_set())
    }
}

fn sleep_while(duration: Duration, keep: impl Fn() -> bool) -> bool {
    let deadline = Instant::now().checked_add(duration);
    loop {
        if !keep() {
            return false;
        }
        let now = Instant::now();
        let left = match deadline {
            Some(deadline) if now >= deadline => return true,
            Some(deadline) => deadline - now,
            None => SLEEP_SLICE,
        };
        std::thread::sleep(left.min(SLEEP_SLICE));
    }
}
