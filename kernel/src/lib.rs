//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! Rux 硬实时调度与同步核心
//!
//! 运行在通用操作系统之下，让被选中的任务获得确定的、按优先级排序的执行，
//! 同时与非实时负载共享机器。
//!
//! 组成（从叶子到根）：
//! - [`list`]: 基于任务索引的侵入式双向循环链表
//! - [`task`]: 任务控制块、任务表、生命周期
//! - [`sched`]: 每 CPU 就绪/定时队列、调度入口、tick 处理
//! - [`sync`]: 阻塞队列、优先级继承、信号量、会合消息
//! - [`mode`]: 硬实时/软实时模式切换
//! - [`bridge`]: 用户态请求分发表
//! - [`shared`]: SMP 下加锁的调度器入口
//!
//! 硬件、宿主调度器和内存池都通过 [`hal`] 中的 trait 接入。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

/// 队列操作级别的跟踪日志，只在 `debug_log` 特性打开时输出
#[cfg(feature = "debug_log")]
#[macro_export]
macro_rules! sched_trace {
    ($($arg:tt)*) => ({
        ::log::trace!($($arg)*);
    });
}

#[cfg(not(feature = "debug_log"))]
#[macro_export]
macro_rules! sched_trace {
    ($($arg:tt)*) => ({
        // 未启用 debug_log
    });
}

pub mod arena;
pub mod bridge;
pub mod config;
pub mod errno;
pub mod hal;
pub mod list;
pub mod mode;
pub mod sched;
pub mod shared;
pub mod sync;
pub mod task;

pub use errno::{Errno, SchedError, WaitStatus};
pub use hal::{Hal, HeapBlock, HostScheduler, KernelHeap, RegionHeap};
pub use mode::ModeChange;
pub use sched::Scheduler;
pub use shared::SharedScheduler;
pub use sync::{ObjectId, Wait};
pub use task::{ExecMode, Priority, SchedPolicy, TaskId, TaskSpec, Ticks};

#[cfg(test)]
mod tests;
