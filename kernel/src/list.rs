//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 双向循环链表实现
//!
//! 参考 Linux: include/linux/list.h
//!
//! 用途：
//! - 就绪队列: ReadyQueue 的 EDF 子队列与固定优先级子队列
//! - 定时队列: TimedQueue
//! - 阻塞队列: WaitQueue
//!
//! 设计特点：
//! - 侵入式链表：链接节点 [`ListLink`] 直接嵌入 TCB 中，每个 TCB 有三个（就绪/定时/阻塞）
//! - 节点用任务索引 [`TaskId`] 而不是裸指针表示，哨兵头用 [`Node::Head`] 表示
//! - 空链表的头节点前后都指向自己，和 `INIT_LIST_HEAD` 一致
//! - 重复插入、删除不在链表中的节点都会 panic

use crate::task::TaskId;

/// 链表中的一个位置：哨兵头或某个任务的链接节点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Head,
    Task(TaskId),
}

/// 嵌入在 TCB 中的链接节点
#[derive(Debug, Clone, Copy)]
pub struct ListLink {
    /// 下一个节点
    pub next: Node,
    /// 前一个节点
    pub prev: Node,
    linked: bool,
}

impl ListLink {
    pub const fn new() -> Self {
        Self {
            next: Node::Head,
            prev: Node::Head,
            linked: false,
        }
    }

    /// 节点当前是否挂在某个链表上
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

impl Default for ListLink {
    fn default() -> Self {
        Self::new()
    }
}

/// TCB 中三个链接节点的选择器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ready = 0,
    Timed = 1,
    Block = 2,
}

/// 链接节点的存储者（任务表）
///
/// 链表本身只保存头尾索引，节点内容由存储者按任务 id 提供
pub trait LinkStore {
    fn link(&self, id: TaskId, kind: LinkKind) -> &ListLink;
    fn link_mut(&mut self, id: TaskId, kind: LinkKind) -> &mut ListLink;
}

/// 链表头（哨兵）
#[derive(Debug)]
pub struct ListHead {
    next: Node,
    prev: Node,
    kind: LinkKind,
    len: usize,
}

impl ListHead {
    /// 创建一个空链表，头节点指向自己
    pub const fn new(kind: LinkKind) -> Self {
        Self {
            next: Node::Head,
            prev: Node::Head,
            kind,
            len: 0,
        }
    }

    #[inline]
    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.next == Node::Head
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn first(&self) -> Option<TaskId> {
        match self.next {
            Node::Head => None,
            Node::Task(id) => Some(id),
        }
    }

    pub fn last(&self) -> Option<TaskId> {
        match self.prev {
            Node::Head => None,
            Node::Task(id) => Some(id),
        }
    }

    fn next_of<S: LinkStore>(&self, store: &S, node: Node) -> Node {
        match node {
            Node::Head => self.next,
            Node::Task(id) => store.link(id, self.kind).next,
        }
    }

    fn prev_of<S: LinkStore>(&self, store: &S, node: Node) -> Node {
        match node {
            Node::Head => self.prev,
            Node::Task(id) => store.link(id, self.kind).prev,
        }
    }

    fn set_next<S: LinkStore>(&mut self, store: &mut S, node: Node, to: Node) {
        match node {
            Node::Head => self.next = to,
            Node::Task(id) => store.link_mut(id, self.kind).next = to,
        }
    }

    fn set_prev<S: LinkStore>(&mut self, store: &mut S, node: Node, to: Node) {
        match node {
            Node::Head => self.prev = to,
            Node::Task(id) => store.link_mut(id, self.kind).prev = to,
        }
    }

    /// 在 `pos` 之前插入 `id`（`pos == Node::Head` 即尾插）
    ///
    /// # Panics
    /// 节点已经挂在链表上
    pub fn insert_before<S: LinkStore>(&mut self, store: &mut S, pos: Node, id: TaskId) {
        assert!(
            !store.link(id, self.kind).is_linked(),
            "list: task {} already linked in {:?} list",
            id,
            self.kind
        );

        let prev = self.prev_of(store, pos);
        {
            let link = store.link_mut(id, self.kind);
            link.next = pos;
            link.prev = prev;
            link.linked = true;
        }
        self.set_next(store, prev, Node::Task(id));
        self.set_prev(store, pos, Node::Task(id));
        self.len += 1;
    }

    /// 头插，对应 `list_add`
    pub fn add<S: LinkStore>(&mut self, store: &mut S, id: TaskId) {
        let first = self.next;
        self.insert_before(store, first, id);
    }

    /// 尾插，对应 `list_add_tail`
    pub fn add_tail<S: LinkStore>(&mut self, store: &mut S, id: TaskId) {
        self.insert_before(store, Node::Head, id);
    }

    /// 删除节点，对应 `list_del`
    ///
    /// # Panics
    /// 节点不在链表上
    pub fn del<S: LinkStore>(&mut self, store: &mut S, id: TaskId) {
        let (next, prev) = {
            let link = store.link(id, self.kind);
            assert!(
                link.is_linked(),
                "list: task {} is not linked in {:?} list",
                id,
                self.kind
            );
            (link.next, link.prev)
        };

        self.set_next(store, prev, next);
        self.set_prev(store, next, prev);
        *store.link_mut(id, self.kind) = ListLink::new();
        self.len -= 1;
    }

    /// 摘下第一个节点
    pub fn pop_front<S: LinkStore>(&mut self, store: &mut S) -> Option<TaskId> {
        let id = self.first()?;
        self.del(store, id);
        Some(id)
    }

    /// `id` 的后继
    pub fn next<S: LinkStore>(&self, store: &S, id: TaskId) -> Option<TaskId> {
        match self.next_of(store, Node::Task(id)) {
            Node::Head => None,
            Node::Task(next) => Some(next),
        }
    }

    /// 找到第一个满足条件的节点位置；都不满足时返回 `Node::Head`
    ///
    /// 有序插入用它找插入点：`insert_before(find(..))`
    pub fn find<S, F>(&self, store: &S, mut pred: F) -> Node
    where
        S: LinkStore,
        F: FnMut(TaskId) -> bool,
    {
        let mut pos = self.next;
        while let Node::Task(id) = pos {
            if pred(id) {
                return pos;
            }
            pos = store.link(id, self.kind).next;
        }
        Node::Head
    }

    pub fn iter<'a, S: LinkStore>(&'a self, store: &'a S) -> Iter<'a, S> {
        Iter {
            store,
            kind: self.kind,
            pos: self.next,
            remaining: self.len,
        }
    }

    /// 线性查找，仅用于断言和测试
    pub fn contains<S: LinkStore>(&self, store: &S, id: TaskId) -> bool {
        self.iter(store).any(|t| t == id)
    }

    /// 检查链表是否完整：前后指针互相一致，且恰好 `len` 步回到头节点
    pub fn is_consistent<S: LinkStore>(&self, store: &S) -> bool {
        let mut prev = Node::Head;
        let mut pos = self.next;
        let mut steps = 0;
        while let Node::Task(id) = pos {
            let link = store.link(id, self.kind);
            if !link.is_linked() || link.prev != prev || steps >= self.len {
                return false;
            }
            steps += 1;
            prev = pos;
            pos = link.next;
        }
        steps == self.len && self.prev == prev
    }
}

/// 正向遍历迭代器
pub struct Iter<'a, S: LinkStore> {
    store: &'a S,
    kind: LinkKind,
    pos: Node,
    remaining: usize,
}

impl<S: LinkStore> Iterator for Iter<'_, S> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        match self.pos {
            Node::Task(id) if self.remaining > 0 => {
                self.remaining -= 1;
                self.pos = self.store.link(id, self.kind).next;
                Some(id)
            }
            _ => None,
        }
    }
}
