//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 信号量 (Semaphore)
//!
//! 参考 Linux:
//! - `kernel/locking/semaphore.c` - 计数信号量
//! - `kernel/locking/rtmutex.c` - 带优先级继承的互斥
//!
//! 三种信号量：
//! - 计数信号量：P 操作计数减 1，为 0 时阻塞；V 操作优先唤醒等待者，否则计数加 1
//! - 二值信号量：计数最多为 1
//! - 资源信号量：有持有者，可递归获取，等待者把优先级传给持有者；
//!   释放时直接把所有权交给最高优先级的等待者

use core::alloc::Layout;

use log::{debug, warn};

use crate::errno::{SchedError, WaitStatus};
use crate::hal::{Hal, HostScheduler};
use crate::sched::Scheduler;
use crate::task::{BlockReasons, TaskId, Ticks};

use super::object::{ObjectId, ObjectKind};
use super::wait::{Wait, WaitOrder, WaitQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemKind {
    Counting,
    Binary,
    /// 带持有者和优先级继承的资源信号量
    Resource,
}

pub struct Semaphore {
    pub(crate) kind: SemKind,
    pub(crate) count: u32,
    pub(crate) owner: Option<TaskId>,
    /// 持有者的递归获取深度
    pub(crate) depth: u32,
    pub(crate) waiters: WaitQueue,
}

impl Semaphore {
    pub fn new(kind: SemKind, initial: u32, order: WaitOrder) -> Self {
        let (count, order) = match kind {
            SemKind::Counting => (initial, order),
            SemKind::Binary => (initial.min(1), order),
            // 资源信号量总是按优先级排队
            SemKind::Resource => (0, WaitOrder::Priority),
        };
        Self {
            kind,
            count,
            owner: None,
            depth: 0,
            waiters: WaitQueue::new(order),
        }
    }

    pub fn kind(&self) -> SemKind {
        self.kind
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn owner(&self) -> Option<TaskId> {
        self.owner
    }

    pub fn waiters(&self) -> &WaitQueue {
        &self.waiters
    }
}

impl<H: Hal, G: HostScheduler> Scheduler<H, G> {
    /// 创建信号量，控制块从实时内存池分配
    pub fn sem_create(
        &mut self,
        kind: SemKind,
        initial: u32,
        order: WaitOrder,
    ) -> Result<ObjectId, SchedError> {
        if self.objects.is_full() {
            return Err(SchedError::TableFull);
        }
        let block = self
            .heap
            .alloc(Layout::new::<Semaphore>())
            .ok_or(SchedError::NoMemory)?;
        let sem = Semaphore::new(kind, initial, order);
        let id = self.objects.insert(ObjectKind::Semaphore(sem), Some(block));
        debug!("sem: create {} ({:?}, initial {})", id, kind, initial);
        Ok(id)
    }

    /// 删除信号量，所有等待者以 `ObjectDeleted` 唤醒，返回唤醒数
    pub fn sem_delete(&mut self, sem: ObjectId) -> Result<usize, SchedError> {
        let owner = self
            .objects
            .semaphore(sem)
            .ok_or(SchedError::NoSuchObject)?
            .owner;

        let woken = self.unblock_all(sem, WaitStatus::ObjectDeleted);
        if let Some(owner) = owner {
            if let Some(task) = self.tasks.get_mut(owner) {
                task.owned.retain(|&o| o != sem);
            }
            self.restore_priority(owner);
        }

        if let Some(object) = self.objects.remove(sem) {
            if let Some(block) = object.block {
                self.heap.free(block);
            }
        }
        debug!("sem: delete {}, {} waiters woken", sem, woken);
        Ok(woken)
    }

    /// P 操作，可能阻塞
    pub fn sem_wait(&mut self, sem: ObjectId, id: TaskId) -> Result<Wait, SchedError> {
        self.sem_acquire(sem, id, None)
    }

    /// 带超时的 P 操作，`timeout` 为相对 tick 数；为 0 时不阻塞
    pub fn sem_wait_timed(
        &mut self,
        sem: ObjectId,
        id: TaskId,
        timeout: Ticks,
    ) -> Result<Wait, SchedError> {
        let cpu = self.tasks.get(id).ok_or(SchedError::NoSuchTask)?.cpu;
        let deadline = self.cpus[cpu].now().saturating_add(timeout);
        self.sem_acquire(sem, id, Some(deadline))
    }

    /// 不阻塞的 P 操作
    pub fn sem_try_wait(&mut self, sem: ObjectId, id: TaskId) -> Result<(), SchedError> {
        if !self.tasks.contains(id) {
            return Err(SchedError::NoSuchTask);
        }
        if self.sem_try_acquire(sem, id)? {
            Ok(())
        } else {
            Err(SchedError::WouldBlock)
        }
    }

    /// V 操作
    ///
    /// 资源信号量只能由持有者释放，递归深度归零时所有权交给最高优先级的等待者
    pub fn sem_signal(&mut self, sem: ObjectId, id: TaskId) -> Result<(), SchedError> {
        let s = self
            .objects
            .semaphore_mut(sem)
            .ok_or(SchedError::NoSuchObject)?;

        match s.kind {
            SemKind::Resource => {
                if s.owner != Some(id) {
                    warn!("sem: task {} releasing {} it does not own", id, sem);
                    return Err(SchedError::NotOwner);
                }
                s.depth -= 1;
                if s.depth == 0 {
                    self.release_resource(sem, id);
                }
            }
            SemKind::Counting | SemKind::Binary => {
                if s.waiters.is_empty() {
                    if s.kind == SemKind::Binary {
                        s.count = 1;
                    } else {
                        s.count = s.count.checked_add(1).ok_or(SchedError::Overflow)?;
                    }
                } else {
                    self.unblock_one(sem);
                }
            }
        }
        Ok(())
    }

    pub fn sem_count(&self, sem: ObjectId) -> Result<u32, SchedError> {
        self.objects
            .semaphore(sem)
            .map(|s| s.count)
            .ok_or(SchedError::NoSuchObject)
    }

    pub fn sem_owner(&self, sem: ObjectId) -> Result<Option<TaskId>, SchedError> {
        self.objects
            .semaphore(sem)
            .map(|s| s.owner)
            .ok_or(SchedError::NoSuchObject)
    }

    fn sem_acquire(
        &mut self,
        sem: ObjectId,
        id: TaskId,
        deadline: Option<Ticks>,
    ) -> Result<Wait, SchedError> {
        let cpu = self.tasks.get(id).ok_or(SchedError::NoSuchTask)?.cpu;
        if self.sem_try_acquire(sem, id)? {
            return Ok(Wait::Done(WaitStatus::Granted));
        }
        if let Some(deadline) = deadline {
            if deadline <= self.cpus[cpu].now() {
                return Ok(Wait::Done(WaitStatus::TimedOut));
            }
        }
        self.block_on(sem, id, BlockReasons::SEMAPHORE, deadline)?;
        Ok(Wait::Blocked)
    }

    /// 立即获取，成功返回 true
    fn sem_try_acquire(&mut self, sem: ObjectId, id: TaskId) -> Result<bool, SchedError> {
        let max_owned = self.config.max_owned;
        let s = self
            .objects
            .semaphore_mut(sem)
            .ok_or(SchedError::NoSuchObject)?;

        match s.kind {
            SemKind::Counting | SemKind::Binary => {
                if s.count > 0 {
                    s.count -= 1;
                    return Ok(true);
                }
                Ok(false)
            }
            SemKind::Resource => match s.owner {
                Some(owner) if owner == id => {
                    s.depth = s.depth.checked_add(1).ok_or(SchedError::Overflow)?;
                    Ok(true)
                }
                Some(_) => {
                    if self.tasks.tcb(id).owned.len() >= max_owned {
                        return Err(SchedError::Overflow);
                    }
                    Ok(false)
                }
                None => {
                    let task = self.tasks.tcb_mut(id);
                    if task.owned.len() >= max_owned {
                        return Err(SchedError::Overflow);
                    }
                    s.owner = Some(id);
                    s.depth = 1;
                    task.owned.push(sem);
                    Ok(true)
                }
            },
        }
    }

    /// 释放资源信号量：所有权交给等待队首，其余等待者改为向新持有者传递优先级
    pub(crate) fn release_resource(&mut self, sem: ObjectId, old: TaskId) {
        if let Some(task) = self.tasks.get_mut(old) {
            task.owned.retain(|&o| o != sem);
        }

        let next = self.objects.semaphore(sem).and_then(|s| s.waiters.first());
        match next {
            Some(next) => {
                if let Some(s) = self.objects.semaphore_mut(sem) {
                    s.owner = Some(next);
                    s.depth = 1;
                }
                self.tasks.tcb_mut(next).owned.push(sem);
                self.complete_wait(next, WaitStatus::Granted);

                let mut cursor = self.objects.semaphore(sem).and_then(|s| s.waiters.first());
                while let Some(w) = cursor {
                    self.tasks.tcb_mut(w).prio_passed_to = Some(next);
                    cursor = self
                        .objects
                        .semaphore(sem)
                        .and_then(|s| s.waiters.next(&self.tasks, w));
                }
                self.restore_priority(next);
                debug!("sem: {} handed from task {} to task {}", sem, old, next);
            }
            None => {
                if let Some(s) = self.objects.semaphore_mut(sem) {
                    s.owner = None;
                    s.depth = 0;
                }
            }
        }
        self.restore_priority(old);
    }
}
