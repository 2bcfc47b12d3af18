//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 同步对象表
//!
//! 每个同步对象拥有自己的阻塞队列，以及一个持有者（资源信号量、会合端口）
//! 或一个计数（计数/二值信号量）。对象删除时，所有等待者以 `ObjectDeleted` 被唤醒。

use core::fmt;

use crate::arena::{Arena, Key};
use crate::hal::HeapBlock;
use crate::task::{BlockReasons, Priority, TaskId, TaskTable};

use super::msg::Port;
use super::semaphore::{SemKind, Semaphore};
use super::wait::WaitQueue;

/// 同步对象标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub(crate) Key);

impl ObjectId {
    pub const fn from_parts(index: u32, gen: u32) -> Self {
        ObjectId(Key { index, gen })
    }

    pub const fn as_raw(self) -> u64 {
        self.0.as_raw()
    }

    pub const fn from_raw(raw: u64) -> Self {
        ObjectId(Key::from_raw(raw))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj{}.{}", self.0.index, self.0.gen)
    }
}

pub enum ObjectKind {
    Semaphore(Semaphore),
    Port(Port),
}

pub struct SyncObject {
    pub(crate) id: ObjectId,
    pub(crate) kind: ObjectKind,
    pub(crate) block: Option<HeapBlock>,
}

impl SyncObject {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// 按阻塞原因找到任务所在的等待队列
    ///
    /// - SEMAPHORE: 信号量等待队列
    /// - SEND / RPC: 端口的发送者队列
    /// - RETURN: 端口的等待回复队列
    pub fn queue(&self, reasons: BlockReasons) -> Option<&WaitQueue> {
        match &self.kind {
            ObjectKind::Semaphore(sem) if reasons.contains(BlockReasons::SEMAPHORE) => {
                Some(&sem.waiters)
            }
            ObjectKind::Port(port) if reasons.intersects(BlockReasons::SEND | BlockReasons::RPC) => {
                Some(&port.senders)
            }
            ObjectKind::Port(port) if reasons.contains(BlockReasons::RETURN) => {
                Some(&port.returns)
            }
            _ => None,
        }
    }

    pub fn queue_mut(&mut self, reasons: BlockReasons) -> Option<&mut WaitQueue> {
        match &mut self.kind {
            ObjectKind::Semaphore(sem) if reasons.contains(BlockReasons::SEMAPHORE) => {
                Some(&mut sem.waiters)
            }
            ObjectKind::Port(port) => {
                if reasons.intersects(BlockReasons::SEND | BlockReasons::RPC) {
                    Some(&mut port.senders)
                } else if reasons.contains(BlockReasons::RETURN) {
                    Some(&mut port.returns)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// 所有等待队列中的第一个任务
    pub fn first_waiter(&self) -> Option<TaskId> {
        match &self.kind {
            ObjectKind::Semaphore(sem) => sem.waiters.first(),
            ObjectKind::Port(port) => port.senders.first().or_else(|| port.returns.first()),
        }
    }

    /// 等待者把优先级传给谁
    ///
    /// 只有资源信号量的持有者和端口的主人会继承优先级
    pub fn inherit_owner(&self) -> Option<TaskId> {
        match &self.kind {
            ObjectKind::Semaphore(sem) if sem.kind == SemKind::Resource => sem.owner,
            ObjectKind::Semaphore(_) => None,
            ObjectKind::Port(port) => Some(port.owner),
        }
    }

    /// 等待者中的最高优先级（只对会继承优先级的对象有意义）
    pub fn top_waiter_priority(&self, tasks: &TaskTable) -> Option<Priority> {
        match &self.kind {
            ObjectKind::Semaphore(sem) if sem.kind == SemKind::Resource => {
                sem.waiters.top_priority(tasks)
            }
            ObjectKind::Semaphore(_) => None,
            ObjectKind::Port(port) => {
                match (port.senders.top_priority(tasks), port.returns.top_priority(tasks)) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                }
            }
        }
    }
}

pub struct ObjectTable {
    arena: Arena<SyncObject>,
}

impl ObjectTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: Arena::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.arena.is_full()
    }

    pub fn get(&self, id: ObjectId) -> Option<&SyncObject> {
        self.arena.get(id.0)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SyncObject> {
        self.arena.get_mut(id.0)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.arena.contains(id.0)
    }

    /// 插入新对象，调用前需确认表未满
    ///
    /// # Panics
    /// 对象表已满
    pub fn insert(&mut self, kind: ObjectKind, block: Option<HeapBlock>) -> ObjectId {
        let key = self.arena.insert_with(|key| SyncObject {
            id: ObjectId(key),
            kind,
            block,
        });
        match key {
            Some(key) => ObjectId(key),
            None => panic!("sync: object table full"),
        }
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<SyncObject> {
        self.arena.remove(id.0)
    }

    pub fn queue_mut(&mut self, id: ObjectId, reasons: BlockReasons) -> Option<&mut WaitQueue> {
        self.get_mut(id).and_then(|obj| obj.queue_mut(reasons))
    }

    pub fn semaphore(&self, id: ObjectId) -> Option<&Semaphore> {
        match self.get(id).map(|obj| &obj.kind) {
            Some(ObjectKind::Semaphore(sem)) => Some(sem),
            _ => None,
        }
    }

    pub fn semaphore_mut(&mut self, id: ObjectId) -> Option<&mut Semaphore> {
        match self.get_mut(id).map(|obj| &mut obj.kind) {
            Some(ObjectKind::Semaphore(sem)) => Some(sem),
            _ => None,
        }
    }

    pub fn port(&self, id: ObjectId) -> Option<&Port> {
        match self.get(id).map(|obj| &obj.kind) {
            Some(ObjectKind::Port(port)) => Some(port),
            _ => None,
        }
    }

    pub fn port_mut(&mut self, id: ObjectId) -> Option<&mut Port> {
        match self.get_mut(id).map(|obj| &mut obj.kind) {
            Some(ObjectKind::Port(port)) => Some(port),
            _ => None,
        }
    }
}
