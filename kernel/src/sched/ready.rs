//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 每 CPU 就绪队列
//!
//! 两个子队列：
//! - EDF 子队列：按绝对截止期升序，整体排在固定优先级任务之前
//! - 固定优先级子队列：按优先级降序，同优先级 FIFO
//!
//! 同一优先级（或同一截止期）内：
//! - 普通入队和时间片用完：排到同级末尾
//! - 被抢占的任务：排到同级最前，时间片没用完的部分下次继续用

use crate::list::{LinkKind, ListHead};
use crate::task::{Priority, Task, TaskId, TaskTable};

/// 入队位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// 同级末尾
    Back,
    /// 同级最前
    Front,
}

/// `a` 是否应该比 `b` 先运行
///
/// EDF 任务总是先于固定优先级任务；EDF 之间比截止期，固定优先级之间比优先级
pub fn outranks(a: &Task, b: &Task) -> bool {
    match (a.policy.is_deadline(), b.policy.is_deadline()) {
        (true, false) => true,
        (false, true) => false,
        (true, true) => a.abs_deadline < b.abs_deadline,
        (false, false) => a.priority.outranks(b.priority),
    }
}

pub struct ReadyQueue {
    edf: ListHead,
    fixed: ListHead,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self {
            edf: ListHead::new(LinkKind::Ready),
            fixed: ListHead::new(LinkKind::Ready),
        }
    }

    pub fn len(&self) -> usize {
        self.edf.len() + self.fixed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edf.is_empty() && self.fixed.is_empty()
    }

    /// 队首（下一个要运行的任务）
    pub fn peek(&self) -> Option<TaskId> {
        self.edf.first().or_else(|| self.fixed.first())
    }

    /// 按顺序插入
    ///
    /// # Panics
    /// 任务已在某个就绪队列中
    pub fn enqueue(&mut self, tasks: &mut TaskTable, id: TaskId, at: Placement) {
        let task = tasks.tcb(id);
        if task.policy.is_deadline() {
            let deadline = task.abs_deadline;
            let pos = self.edf.find(&*tasks, |t| {
                let other = tasks.tcb(t).abs_deadline;
                match at {
                    Placement::Back => other > deadline,
                    Placement::Front => other >= deadline,
                }
            });
            self.edf.insert_before(tasks, pos, id);
        } else {
            let prio = task.priority;
            let pos = self.fixed.find(&*tasks, |t| {
                let other = tasks.tcb(t).priority;
                match at {
                    Placement::Back => prio.outranks(other),
                    Placement::Front => !other.outranks(prio),
                }
            });
            self.fixed.insert_before(tasks, pos, id);
        }
    }

    /// 从队列中删除
    ///
    /// # Panics
    /// 任务不在就绪队列中
    pub fn remove(&mut self, tasks: &mut TaskTable, id: TaskId) {
        if tasks.tcb(id).policy.is_deadline() {
            self.edf.del(tasks, id);
        } else {
            self.fixed.del(tasks, id);
        }
    }

    /// 摘下队首
    pub fn pop(&mut self, tasks: &mut TaskTable) -> Option<TaskId> {
        self.edf.pop_front(tasks).or_else(|| self.fixed.pop_front(tasks))
    }

    /// 改变优先级并重新排队，返回优先级是否真的变了
    pub fn requeue(&mut self, tasks: &mut TaskTable, id: TaskId, prio: Priority) -> bool {
        if tasks.tcb(id).priority == prio {
            return false;
        }
        self.remove(tasks, id);
        tasks.tcb_mut(id).priority = prio;
        self.enqueue(tasks, id, Placement::Back);
        true
    }

    /// 按调度顺序遍历（先 EDF，后固定优先级）
    pub fn iter<'a>(&'a self, tasks: &'a TaskTable) -> impl Iterator<Item = TaskId> + 'a {
        self.edf.iter(tasks).chain(self.fixed.iter(tasks))
    }

    /// 两个子队列都完整且有序
    pub fn is_consistent(&self, tasks: &TaskTable) -> bool {
        if !self.edf.is_consistent(tasks) || !self.fixed.is_consistent(tasks) {
            return false;
        }
        let edf_sorted = self
            .edf
            .iter(tasks)
            .zip(self.edf.iter(tasks).skip(1))
            .all(|(a, b)| tasks.tcb(a).abs_deadline <= tasks.tcb(b).abs_deadline);
        let fixed_sorted = self
            .fixed
            .iter(tasks)
            .zip(self.fixed.iter(tasks).skip(1))
            .all(|(a, b)| tasks.tcb(a).priority >= tasks.tcb(b).priority);
        edf_sorted && fixed_sorted
    }
}

impl Default for ReadyQueue {
    fn default() -> Self {
        Self::new()
    }
}
