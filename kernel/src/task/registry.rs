//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 任务表
//!
//! 所有 TCB 都归任务表所有，队列里只保存 [`TaskId`]。
//! 名字到 id 的映射在注册时建立、删除时撤销。

use alloc::collections::BTreeMap;
use alloc::string::String;

use crate::arena::Arena;
use crate::errno::SchedError;
use crate::list::{LinkKind, LinkStore, ListLink};

use super::tcb::{Task, TaskId};

pub struct TaskTable {
    arena: Arena<Task>,
    names: BTreeMap<String, TaskId>,
}

impl TaskTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arena: Arena::with_capacity(capacity),
            names: BTreeMap::new(),
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

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.arena.get(id.0)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.arena.get_mut(id.0)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.arena.contains(id.0)
    }

    /// 取 TCB，id 失效时 panic
    ///
    /// 只用于队列内部：挂在队列上的 id 一定有效
    #[track_caller]
    pub fn tcb(&self, id: TaskId) -> &Task {
        match self.arena.get(id.0) {
            Some(task) => task,
            None => panic!("sched: stale task id {}", id),
        }
    }

    #[track_caller]
    pub fn tcb_mut(&mut self, id: TaskId) -> &mut Task {
        match self.arena.get_mut(id.0) {
            Some(task) => task,
            None => panic!("sched: stale task id {}", id),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<TaskId> {
        self.names.get(name).copied()
    }

    /// 注册新任务
    pub fn insert<F>(&mut self, name: &str, f: F) -> Result<TaskId, SchedError>
    where
        F: FnOnce(TaskId) -> Task,
    {
        if self.names.contains_key(name) {
            return Err(SchedError::NameExists);
        }
        let key = self
            .arena
            .insert_with(|key| f(TaskId(key)))
            .ok_or(SchedError::TableFull)?;
        let id = TaskId(key);
        self.names.insert(String::from(name), id);
        Ok(id)
    }

    /// 注销任务并交出 TCB
    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let task = self.arena.remove(id.0)?;
        self.names.remove(task.name.as_str());
        Some(task)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.arena.iter().map(|(_, task)| task)
    }
}

impl LinkStore for TaskTable {
    fn link(&self, id: TaskId, kind: LinkKind) -> &ListLink {
        &self.tcb(id).links[kind as usize]
    }

    fn link_mut(&mut self, id: TaskId, kind: LinkKind) -> &mut ListLink {
        &mut self.tcb_mut(id).links[kind as usize]
    }
}
