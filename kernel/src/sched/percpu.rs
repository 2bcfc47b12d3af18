//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 每 CPU 运行队列
//!
//! 对应 Linux 的 `struct rq`：就绪队列、定时队列、当前任务、need_resched 标志。
//! 所有 CPU 的运行队列都归 [`Scheduler`](super::Scheduler) 实例所有，不使用全局静态数组。

use alloc::vec::Vec;

use crate::task::{TaskId, Ticks};

use super::ready::ReadyQueue;
use super::timed::TimedQueue;

/// 每 CPU 统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuStats {
    /// 上下文切换次数
    pub switches: u64,
    /// 本 CPU 发出的 IPI 数
    pub ipis_sent: u64,
    /// 处理的 tick 数
    pub ticks: u64,
    /// 超时唤醒的任务数
    pub timeouts: u64,
}

pub struct CpuRq {
    pub(crate) cpu: usize,
    pub(crate) ready: ReadyQueue,
    pub(crate) timed: TimedQueue,
    pub(crate) current: Option<TaskId>,
    pub(crate) need_resched: bool,
    /// 已经发出、尚未被处理的 IPI
    pub(crate) ipi_pending: bool,
    /// 等待在调度点完成 SoftReturning -> Hard 的任务
    pub(crate) mode_pending: Vec<TaskId>,
    /// 最近一次 tick 的时间
    pub(crate) clock: Option<Ticks>,
    pub(crate) stats: CpuStats,
}

impl CpuRq {
    pub fn new(cpu: usize, max_tasks: usize) -> Self {
        Self {
            cpu,
            ready: ReadyQueue::new(),
            timed: TimedQueue::new(),
            current: None,
            need_resched: false,
            ipi_pending: false,
            mode_pending: Vec::with_capacity(max_tasks),
            clock: None,
            stats: CpuStats::default(),
        }
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn need_resched(&self) -> bool {
        self.need_resched
    }

    pub fn ready(&self) -> &ReadyQueue {
        &self.ready
    }

    pub fn timed(&self) -> &TimedQueue {
        &self.timed
    }

    pub fn stats(&self) -> CpuStats {
        self.stats
    }

    /// 本 CPU 的当前时间
    pub fn now(&self) -> Ticks {
        self.clock.unwrap_or(0)
    }
}
