//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! SMP 下的调度器入口
//!
//! 所有 CPU 共用一把自旋锁，持锁期间关本地中断（先 `irq_save` 再加锁，
//! 解锁后 `irq_restore`），对应 Linux 的 `raw_spin_lock_irqsave`。
//! 就绪/定时队列的链接存放在共享的任务表中，所以队列操作都在这把锁内完成；
//! 每个 CPU 只切换自己的当前任务，对其他 CPU 只设置 need_resched 并发 IPI。

use spin::Mutex;

use crate::hal::{Hal, HostScheduler};
use crate::sched::Scheduler;
use crate::task::{TaskId, Ticks};

pub struct SharedScheduler<H: Hal + Clone, G: HostScheduler> {
    /// 锁外使用的 HAL 副本（关中断、取 CPU 号）
    hal: H,
    inner: Mutex<Scheduler<H, G>>,
}

impl<H: Hal + Clone, G: HostScheduler> SharedScheduler<H, G> {
    pub fn new(sched: Scheduler<H, G>) -> Self {
        Self {
            hal: sched.hal().clone(),
            inner: Mutex::new(sched),
        }
    }

    /// 关中断并持锁执行 `f`
    pub fn with<R>(&self, f: impl FnOnce(&mut Scheduler<H, G>) -> R) -> R {
        let flags = self.hal.irq_save();
        let ret = {
            let mut sched = self.inner.lock();
            f(&mut sched)
        };
        self.hal.irq_restore(flags);
        ret
    }

    /// 在调用 CPU 上调度
    pub fn schedule(&self) -> Option<TaskId> {
        self.with(|s| s.schedule())
    }

    /// 定时器中断入口：处理 tick，需要时立即在本 CPU 上调度
    pub fn tick(&self, now: Ticks) -> usize {
        self.with(|s| {
            let woken = s.tick(now);
            let cpu = s.this_cpu();
            if s.cpu(cpu).need_resched() {
                s.schedule_cpu(cpu);
            }
            woken
        })
    }

    /// 重新调度 IPI 的处理函数
    pub fn handle_ipi(&self) -> Option<TaskId> {
        self.with(|s| s.schedule())
    }

    pub fn into_inner(self) -> Scheduler<H, G> {
        self.inner.into_inner()
    }
}
