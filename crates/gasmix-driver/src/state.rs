//! 运行状态定义
//!
//! `Idle → Running → {Completed, Stopped}`，两个终态都经过关机例程。

use std::sync::atomic::{AtomicU8, Ordering};

/// 序列运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RunState {
    #[default]
    Idle = 0,
    Running = 1,
    /// 所有阶段自然结束
    Completed = 2,
    /// 被停止（用户请求或命令失败）
    Stopped = 3,
}

impl RunState {
    /// 从 u8 转换，无效值视为 Idle
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }
}

/// 运行状态（原子版本，用于线程间共享）
#[derive(Debug, Default)]
pub struct AtomicRunState {
    inner: AtomicU8,
}

impl AtomicRunState {
    pub fn new(state: RunState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> RunState {
        RunState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: RunState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }

    /// 比较并交换
    ///
    /// 当前值等于 `current` 时设置为 `new` 并返回 true。
    pub fn compare_exchange(&self, current: RunState, new: RunState) -> bool {
        self.inner
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
