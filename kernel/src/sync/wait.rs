//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 阻塞队列与等待/唤醒原语
//!
//! 对应 Linux 的 `wait_queue_head`，但按对象的配置可以是 FIFO 或按优先级排序。
//! 等待结果通过 [`WaitStatus`] 返回：授予、超时、取消、对象删除。
//!
//! 阻塞原语不会真的挂起调用者（挂起只发生在 `schedule()` 里），而是返回
//! [`Wait::Blocked`]；调用者随后调用 `schedule()`，被唤醒后用
//! [`Scheduler::take_wait_status`] 取结果。

use log::debug;

use crate::errno::{SchedError, WaitStatus};
use crate::hal::{Hal, HostScheduler};
use crate::list::{LinkKind, ListHead};
use crate::sched::Scheduler;
use crate::task::{BlockReasons, Priority, TaskId, TaskTable, Ticks};

use super::object::ObjectId;

/// 阻塞原语的即时结果
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// 立即完成（获得、或零超时立即超时）
    Done(WaitStatus),
    /// 已阻塞，调度后再取结果
    Blocked,
}

impl Wait {
    pub fn is_blocked(self) -> bool {
        self == Wait::Blocked
    }
}

/// 等待队列的排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOrder {
    Fifo,
    /// 按优先级降序，同优先级先来先服务
    Priority,
}

pub struct WaitQueue {
    list: ListHead,
    order: WaitOrder,
}

impl WaitQueue {
    pub const fn new(order: WaitOrder) -> Self {
        Self {
            list: ListHead::new(LinkKind::Block),
            order,
        }
    }

    pub fn order(&self) -> WaitOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn first(&self) -> Option<TaskId> {
        self.list.first()
    }

    pub fn next(&self, tasks: &TaskTable, id: TaskId) -> Option<TaskId> {
        self.list.next(tasks, id)
    }

    pub fn insert(&mut self, tasks: &mut TaskTable, id: TaskId) {
        match self.order {
            WaitOrder::Fifo => self.list.add_tail(tasks, id),
            WaitOrder::Priority => {
                let prio = tasks.tcb(id).priority;
                let pos = self
                    .list
                    .find(&*tasks, |t| prio.outranks(tasks.tcb(t).priority));
                self.list.insert_before(tasks, pos, id);
            }
        }
    }

    pub fn remove(&mut self, tasks: &mut TaskTable, id: TaskId) {
        self.list.del(tasks, id);
    }

    /// 优先级变化后调整位置（FIFO 队列不动）
    pub fn reposition(&mut self, tasks: &mut TaskTable, id: TaskId) {
        if self.order == WaitOrder::Priority {
            self.list.del(tasks, id);
            self.insert(tasks, id);
        }
    }

    pub fn iter<'a>(&'a self, tasks: &'a TaskTable) -> impl Iterator<Item = TaskId> + 'a {
        self.list.iter(tasks)
    }

    /// 等待者中的最高优先级
    pub fn top_priority(&self, tasks: &TaskTable) -> Option<Priority> {
        match self.order {
            WaitOrder::Priority => self.list.first().map(|t| tasks.tcb(t).priority),
            WaitOrder::Fifo => self.list.iter(tasks).map(|t| tasks.tcb(t).priority).max(),
        }
    }

    pub fn is_consistent(&self, tasks: &TaskTable) -> bool {
        self.list.is_consistent(tasks)
    }
}

impl<H: Hal, G: HostScheduler> Scheduler<H, G> {
    /// 把任务挂到对象 `obj` 的等待队列上
    ///
    /// `reason` 选择队列（SEMAPHORE / SEND / RPC / RETURN），排序方式由队列决定。
    /// 给定 `deadline` 时同时进入定时队列。对象有继承者时向它传递优先级。
    pub fn block_on(
        &mut self,
        obj: ObjectId,
        id: TaskId,
        reason: BlockReasons,
        deadline: Option<Ticks>,
    ) -> Result<(), SchedError> {
        if !self.tasks.contains(id) {
            return Err(SchedError::NoSuchTask);
        }
        let object = self.objects.get(obj).ok_or(SchedError::NoSuchObject)?;
        if object.queue(reason).is_none() {
            return Err(SchedError::WrongKind);
        }
        let owner = object.inherit_owner();
        debug_assert!(BlockReasons::WAIT.contains(reason));

        self.block_task(id, reason);
        {
            let task = self.tasks.tcb_mut(id);
            task.blocked_on = Some(obj);
            task.wait_status = None;
        }
        if let Some(queue) = self.objects.queue_mut(obj, reason) {
            queue.insert(&mut self.tasks, id);
        }
        if let Some(wake) = deadline {
            self.block_task(id, BlockReasons::DELAYED);
            self.enqueue_timed(id, wake);
        }

        sched_trace!("sched: task {} blocked on {} ({:?})", id, obj, reason);

        if let Some(owner) = owner {
            if owner != id {
                self.donate_priority(owner, id);
            }
        }
        Ok(())
    }

    /// 唤醒对象等待队列的队首，返回被唤醒的任务
    pub fn unblock_one(&mut self, obj: ObjectId) -> Option<TaskId> {
        let head = self.objects.get(obj)?.first_waiter()?;
        self.complete_wait(head, WaitStatus::Granted);
        Some(head)
    }

    /// 清空对象的所有等待队列，每个任务都以 `status` 结束等待，返回唤醒数
    pub fn unblock_all(&mut self, obj: ObjectId, status: WaitStatus) -> usize {
        let mut woken = 0;
        while let Some(head) = self.objects.get(obj).and_then(|o| o.first_waiter()) {
            self.complete_wait(head, status);
            woken += 1;
        }
        woken
    }

    /// 结束任务的等待
    ///
    /// 从阻塞队列和定时队列摘下，清除等待原因，撤销它传出的优先级，
    /// 记录结果并在没有其他阻塞原因时重新就绪。
    pub(crate) fn complete_wait(&mut self, id: TaskId, status: WaitStatus) {
        let Some(task) = self.tasks.get_mut(id) else {
            return;
        };
        let reasons = task.reasons;
        let cpu = task.cpu;
        let edge = task.prio_passed_to.take();
        if let Some(obj) = task.blocked_on.take() {
            if let Some(queue) = self.objects.queue_mut(obj, reasons) {
                queue.remove(&mut self.tasks, id);
            }
        }

        let task = self.tasks.tcb_mut(id);
        task.reasons.remove(BlockReasons::WAIT | BlockReasons::DELAYED);
        task.recv_from = None;
        task.wait_status = Some(status);
        self.cpus[cpu].timed.remove(&mut self.tasks, id);

        if let Some(owner) = edge {
            self.restore_priority(owner);
        }
        sched_trace!("sched: task {} wait done: {:?}", id, status);
        self.wake_task(id);
    }

    /// 取消任务的等待（包括睡眠），等待结果为 `Cancelled`
    ///
    /// 对应 RTAI 的 `rt_task_masked_unblock()`
    pub fn unblock(&mut self, id: TaskId) -> Result<(), SchedError> {
        let task = self.tasks.get(id).ok_or(SchedError::NoSuchTask)?;
        if !task
            .reasons
            .intersects(BlockReasons::WAIT | BlockReasons::DELAYED)
        {
            return Err(SchedError::NotWaiting);
        }
        debug!("sched: cancel wait of task {}", id);
        self.complete_wait(id, WaitStatus::Cancelled);
        Ok(())
    }

    /// 取出（并清除）最近一次等待的结果
    pub fn take_wait_status(&mut self, id: TaskId) -> Option<WaitStatus> {
        self.tasks.get_mut(id).and_then(|t| t.wait_status.take())
    }

    /// 任务是否挂在某个阻塞队列中
    pub fn is_waiting(&self, id: TaskId) -> bool {
        self.tasks
            .get(id)
            .map_or(false, |t| t.is_linked(LinkKind::Block))
    }

    /// 对象等待队列当前的任务（按队列顺序）
    pub fn waiters(&self, obj: ObjectId, reason: BlockReasons) -> alloc::vec::Vec<TaskId> {
        self.objects
            .get(obj)
            .and_then(|o| o.queue(reason))
            .map(|q| q.iter(&self.tasks).collect())
            .unwrap_or_default()
    }
}
