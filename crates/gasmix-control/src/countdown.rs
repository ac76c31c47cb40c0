//! 倒计时任务
//!
//! 以固定周期（默认 1 秒）投递剩余时间，仅供显示；
//! 停止控制只看运行标志，倒计时归零不会结束运行。

use crate::error::ControlError;
use crate::events::{EventSender, RigEvent};
use gasmix_driver::{DriverError, RunFlag};
use std::thread;
use std::time::{Duration, Instant};

/// 倒计时线程
pub struct Countdown {
    handle: Option<thread::JoinHandle<()>>,
    own: RunFlag,
}

impl Countdown {
    /// 启动倒计时
    ///
    /// `run` 被清除或倒计时结束时线程退出。
    pub fn start(
        total: Duration,
        period: Duration,
        run: RunFlag,
        events: EventSender,
    ) -> Result<Self, ControlError> {
        let own = RunFlag::raised();
        let own_clone = own.clone();
        let handle = thread::Builder::new()
            .name("gasmix-countdown".into())
            .spawn(move || Self::countdown_loop(total, period, run, own_clone, events))
            .map_err(|e| ControlError::Driver(DriverError::Spawn(e)))?;

        Ok(Self {
            handle: Some(handle),
            own,
        })
    }

    fn countdown_loop(
        total: Duration,
        period: Duration,
        run: RunFlag,
        own: RunFlag,
        events: EventSender,
    ) {
        let start = Instant::now();
        let period = period.max(Duration::from_millis(10));
        loop {
            if !run.is_set() || !own.is_set() {
                return;
            }
            let remaining = total.saturating_sub(start.elapsed());
            events.send(RigEvent::Countdown { remaining });
            if remaining.is_zero() {
                return;
            }

            // 两个标志任一被清除都提前返回
            if !own.sleep_with(&run, period.min(remaining)) {
                return;
            }
        }
    }

    /// 停止并等待线程结束
    pub fn stop(mut self) {
        self.own.clear();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.own.clear();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
