//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! 对应 Linux 的 kernel/sched/，每个 CPU 一个运行队列，没有全局就绪队列；
//! 跨 CPU 的影响通过 IPI 传递。

mod dispatch;
pub mod percpu;
pub mod ready;
pub mod timed;

pub use dispatch::Scheduler;
pub use percpu::{CpuRq, CpuStats};
pub use ready::{outranks, Placement, ReadyQueue};
pub use timed::TimedQueue;
