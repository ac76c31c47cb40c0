//! 写命令的有界重试
//!
//! 尝试 → 失败则等待 `backoff_delay` → 再尝试，最多 `max_attempts` 次。
//! 耗尽后返回 [`DeviceCommandError`]（携带最后一次错误与尝试次数）。
//!
//! 若提供了取消标志，在两次尝试之间（包括退避等待期间）观察到标志被清除，
//! 立即停止重试并返回 [`RetryOutcome::Cancelled`]，不视为错误。
//!
//! 读操作不走这里：读失败在读边界直接退化为 0。

use crate::error::DeviceCommandError;
use crate::flag::RunFlag;
use crate::link::ChannelId;
use gasmix_device::DeviceError;
use std::time::Duration;
use tracing::{debug, error, warn};

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（≥ 1）
    pub max_attempts: u32,
    /// 两次尝试之间的等待
    pub backoff_delay: Duration,
}

impl RetryPolicy {
    /// 写命令默认策略：3 次尝试，间隔 1 秒
    pub const WRITE_DEFAULT: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        backoff_delay: Duration::from_secs(1),
    };

    /// 创建策略，`max_attempts` 至少为 1
    pub fn new(max_attempts: u32, backoff_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_delay,
        }
    }

    /// 单次尝试（关机例程、best-effort 写入）
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::WRITE_DEFAULT
    }
}

/// 重试结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// 第 `attempts` 次尝试成功
    Completed { attempts: u32 },
    /// 重试期间被取消（已尝试 `attempts` 次）
    Cancelled { attempts: u32 },
}

impl RetryOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RetryOutcome::Completed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            RetryOutcome::Completed { attempts } | RetryOutcome::Cancelled { attempts } => attempts,
        }
    }
}

/// 带重试的设备命令
///
/// # 示例
///
/// ```rust
/// use gasmix_driver::{ChannelId, RetryPolicy, RetryingDeviceCommand};
/// use std::time::Duration;
///
/// let mut calls = 0;
/// let outcome = RetryingDeviceCommand::new(ChannelId::Target, RetryPolicy::new(3, Duration::ZERO))
///     .execute(|_attempt| {
///         calls += 1;
///         if calls < 2 {
///             Err(gasmix_driver::DeviceError::Timeout)
///         } else {
///             Ok(())
///         }
///     })
///     .unwrap();
/// assert_eq!(outcome.attempts(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RetryingDeviceCommand<'a> {
    channel: ChannelId,
    policy: RetryPolicy,
    cancel: Option<&'a RunFlag>,
}

impl<'a> RetryingDeviceCommand<'a> {
    pub fn new(channel: ChannelId, policy: RetryPolicy) -> Self {
        Self {
            channel,
            policy,
            cancel: None,
        }
    }

    /// 绑定取消标志
    pub fn with_cancel(mut self, flag: &'a RunFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// 执行命令
    ///
    /// `op` 的参数是当前尝试序号（从 1 开始）。
    pub fn execute<F>(&self, mut op: F) -> Result<RetryOutcome, DeviceCommandError>
    where
        F: FnMut(u32) -> Result<(), DeviceError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(()) => {
                    if attempt > 1 {
                        debug!(channel = %self.channel, attempt, "Command succeeded after retry");
                    }
                    return Ok(RetryOutcome::Completed { attempts: attempt });
                },
                Err(e) if attempt >= max_attempts => {
                    error!(
                        channel = %self.channel,
                        attempts = attempt,
                        "Command failed, retries exhausted: {}",
                        e
                    );
                    return Err(DeviceCommandError {
                        channel: self.channel,
                        attempts: attempt,
                        last: e,
                    });
                },
                Err(e) => {
                    warn!(
                        channel = %self.channel,
                        attempt,
                        max_attempts,
                        "Command failed, retrying in {:?}: {}",
                        self.policy.backoff_delay,
                        e
                    );
                },
            }

            // 退避等待（可被取消）
            match self.cancel {
                Some(flag) => {
                    if !flag.sleep(self.policy.backoff_delay) {
                        debug!(channel = %self.channel, attempt, "Retry cancelled");
                        return Ok(RetryOutcome::Cancelled { attempts: attempt });
                    }
                },
                None => std::thread::sleep(self.policy.backoff_delay),
            }
            attempt += 1;
        }
    }
}
