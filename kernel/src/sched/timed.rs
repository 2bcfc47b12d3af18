//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 每 CPU 定时队列，按唤醒时间升序，同一时间按入队顺序

use crate::list::{LinkKind, ListHead};
use crate::task::{TaskId, TaskTable, Ticks};

pub struct TimedQueue {
    list: ListHead,
}

impl TimedQueue {
    pub const fn new() -> Self {
        Self {
            list: ListHead::new(LinkKind::Timed),
        }
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn enqueue(&mut self, tasks: &mut TaskTable, id: TaskId, wake_time: Ticks) {
        tasks.tcb_mut(id).wake_time = wake_time;
        let pos = self.list.find(&*tasks, |t| tasks.tcb(t).wake_time > wake_time);
        self.list.insert_before(tasks, pos, id);
    }

    /// 不在队列中时什么也不做
    pub fn remove(&mut self, tasks: &mut TaskTable, id: TaskId) -> bool {
        if !tasks.tcb(id).is_linked(LinkKind::Timed) {
            return false;
        }
        self.list.del(tasks, id);
        true
    }

    /// 摘下一个 `wake_time <= now` 的任务
    pub fn pop_expired(&mut self, tasks: &mut TaskTable, now: Ticks) -> Option<TaskId> {
        let first = self.list.first()?;
        if tasks.tcb(first).wake_time > now {
            return None;
        }
        self.list.del(tasks, first);
        Some(first)
    }

    /// 最早的唤醒时间
    pub fn next_expiry(&self, tasks: &TaskTable) -> Option<Ticks> {
        self.list.first().map(|t| tasks.tcb(t).wake_time)
    }

    pub fn iter<'a>(&'a self, tasks: &'a TaskTable) -> impl Iterator<Item = TaskId> + 'a {
        self.list.iter(tasks)
    }

    pub fn is_consistent(&self, tasks: &TaskTable) -> bool {
        self.list.is_consistent(tasks)
            && self
                .list
                .iter(tasks)
                .zip(self.list.iter(tasks).skip(1))
                .all(|(a, b)| tasks.tcb(a).wake_time <= tasks.tcb(b).wake_time)
    }
}

impl Default for TimedQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ObjectId;
    use crate::task::{Task, TaskSpec};
    use alloc::format;
    use alloc::vec::Vec;

    fn add(tasks: &mut TaskTable) -> TaskId {
        let name = format!("t{}", tasks.len());
        let spec = TaskSpec::new(&name, 1);
        tasks
            .insert(&name, |id| Task::new(id, &spec, ObjectId::from_parts(0, 0), 1))
            .unwrap()
    }

    #[test]
    fn test_timed_ascending_fifo() {
        let mut tasks = TaskTable::with_capacity(4);
        let mut tq = TimedQueue::new();
        let a = add(&mut tasks);
        let b = add(&mut tasks);
        let c = add(&mut tasks);
        tq.enqueue(&mut tasks, a, 30);
        tq.enqueue(&mut tasks, b, 10);
        tq.enqueue(&mut tasks, c, 30);

        let order: Vec<_> = tq.iter(&tasks).collect();
        assert_eq!(order, [b, a, c]);
        assert!(tq.is_consistent(&tasks));
        assert_eq!(tq.next_expiry(&tasks), Some(10));
    }

    #[test]
    fn test_timed_pop_expired() {
        let mut tasks = TaskTable::with_capacity(4);
        let mut tq = TimedQueue::new();
        let a = add(&mut tasks);
        let b = add(&mut tasks);
        tq.enqueue(&mut tasks, a, 100);
        tq.enqueue(&mut tasks, b, 100);

        assert_eq!(tq.pop_expired(&mut tasks, 99), None);
        assert_eq!(tq.pop_expired(&mut tasks, 100), Some(a));
        assert_eq!(tq.pop_expired(&mut tasks, 100), Some(b));
        assert_eq!(tq.pop_expired(&mut tasks, 1000), None);
    }

    #[test]
    fn test_timed_remove_idempotent() {
        let mut tasks = TaskTable::with_capacity(2);
        let mut tq = TimedQueue::new();
        let a = add(&mut tasks);
        assert!(!tq.remove(&mut tasks, a));
        tq.enqueue(&mut tasks, a, 5);
        assert!(tq.remove(&mut tasks, a));
        assert!(!tq.remove(&mut tasks, a));
        assert!(tq.is_empty());
    }
}
