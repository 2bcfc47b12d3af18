//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 优先级继承
//!
//! 对应 Linux 的 kernel/locking/rtmutex.c 中的优先级链调整 (`rt_mutex_adjust_prio_chain`)。
//!
//! 每个任务记录 `prio_passed_to`：它最后一次把优先级传给了谁。沿这条边可以走完整条
//! 继承链：等待者 -> 持有者 -> 持有者等待的资源的持有者 -> ...
//! 遍历深度受 `max_donation_depth` 限制，并检测环。

use log::{error, warn};

use crate::hal::{Hal, HostScheduler};
use crate::sched::Scheduler;
use crate::task::{Priority, TaskId};

impl<H: Hal, G: HostScheduler> Scheduler<H, G> {
    /// `from` 把自己的优先级传给 `to`，并沿继承链继续传递
    ///
    /// 链上每个优先级低于 `from` 的任务被抬高到 `from` 的优先级（就绪的重新排队，
    /// 阻塞在按优先级排序的队列里的调整位置），遇到已经不低于它的任务时停止。
    pub fn donate_priority(&mut self, to: TaskId, from: TaskId) {
        let Some(donor) = self.tasks.get_mut(from) else {
            return;
        };
        let prio = donor.priority;
        donor.prio_passed_to = Some(to);

        let mut next = Some(to);
        let mut depth = 0;
        while let Some(t) = next {
            if t == from {
                error!("sched: priority donation cycle through task {}", from);
                debug_assert!(false, "priority donation cycle through task {}", from);
                break;
            }
            if depth >= self.config.max_donation_depth {
                warn!("sched: donation chain from task {} exceeds depth {}", from, depth);
                break;
            }
            let Some(task) = self.tasks.get(t) else {
                break;
            };
            if !prio.outranks(task.priority) {
                break;
            }
            next = task.prio_passed_to;
            self.requeue(t, prio);
            depth += 1;
        }
    }

    /// 任务应有的优先级：基础优先级和它持有的所有对象上等待者优先级中的最高者
    pub fn inherited_priority(&self, id: TaskId) -> Priority {
        let task = self.tasks.tcb(id);
        task.owned
            .iter()
            .chain(core::iter::once(&task.port))
            .filter_map(|obj| self.objects.get(*obj))
            .filter_map(|obj| obj.top_waiter_priority(&self.tasks))
            .fold(task.base_priority, Priority::max)
    }

    /// 重新计算任务的优先级并沿继承链向下传播
    ///
    /// 用于撤销继承（等待者离开、资源释放）以及基础优先级变化。
    /// 某一环的优先级没有变化时停止。
    pub fn restore_priority(&mut self, id: TaskId) {
        let mut next = Some(id);
        let mut depth = 0;
        while let Some(t) = next {
            if depth > self.config.max_donation_depth {
                warn!("sched: priority restore from task {} exceeds depth {}", id, depth);
                break;
            }
            if !self.tasks.contains(t) {
                break;
            }
            let prio = self.inherited_priority(t);
            if !self.requeue(t, prio) {
                break;
            }
            next = self.tasks.tcb(t).prio_passed_to;
            depth += 1;
        }
    }
}
