//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 信号量测试

use super::*;
use crate::errno::{SchedError, WaitStatus};
use crate::sync::{SemKind, Wait, WaitOrder};
use crate::task::BlockReasons;

#[test]
fn test_counting_semaphore() {
    let (mut s, _hal) = new_sched(1);
    let a = spawn(&mut s, "a", 10);
    let sem = s.sem_create(SemKind::Counting, 2, WaitOrder::Fifo).unwrap();

    assert_eq!(s.sem_wait(sem, a).unwrap(), Wait::Done(WaitStatus::Granted));
    s.sem_try_wait(sem, a).unwrap();
    assert_eq!(s.sem_count(sem), Ok(0));
    assert_eq!(s.sem_try_wait(sem, a), Err(SchedError::WouldBlock));

    s.sem_signal(sem, a).unwrap();
    s.sem_signal(sem, a).unwrap();
    s.sem_signal(sem, a).unwrap();
    assert_eq!(s.sem_count(sem), Ok(3));
}

#[test]
fn test_binary_semaphore_saturates() {
    let (mut s, _hal) = new_sched(1);
    let a = spawn(&mut s, "a", 10);
    let sem = s.sem_create(SemKind::Binary, 5, WaitOrder::Fifo).unwrap();
    assert_eq!(s.sem_count(sem), Ok(1));

    s.sem_signal(sem, a).unwrap();
    assert_eq!(s.sem_count(sem), Ok(1));
}

/// FIFO 队列按到达顺序唤醒，优先级队列按优先级唤醒
#[test]
fn test_wake_order() {
    let (mut s, _hal) = new_sched(1);
    let lo = spawn(&mut s, "lo", 1);
    let hi = spawn(&mut s, "hi", 9);
    let fifo = s.sem_create(SemKind::Counting, 0, WaitOrder::Fifo).unwrap();
    let by_prio = s.sem_create(SemKind::Counting, 0, WaitOrder::Priority).unwrap();

    assert!(s.sem_wait(fifo, lo).unwrap().is_blocked());
    assert!(s.sem_wait(fifo, hi).unwrap().is_blocked());
    assert_eq!(s.unblock_one(fifo), Some(lo));
    assert_eq!(s.unblock_one(fifo), Some(hi));
    assert_eq!(s.unblock_one(fifo), None);

    assert!(s.sem_wait(by_prio, lo).unwrap().is_blocked());
    assert!(s.sem_wait(by_prio, hi).unwrap().is_blocked());
    s.sem_signal(by_prio, hi).unwrap();
    assert_eq!(s.take_wait_status(hi), Some(WaitStatus::Granted));
    assert!(s.is_waiting(lo));
    // 有等待者时 signal 不增加计数
    assert_eq!(s.sem_count(by_prio), Ok(0));
}

/// 删除信号量，所有等待者以 ObjectDeleted 唤醒
#[test]
fn test_delete_wakes_waiters() {
    let (mut s, hal) = new_sched(1);
    let a = spawn(&mut s, "a", 10);
    let b = spawn(&mut s, "b", 10);
    let used = s.heap_used();
    let sem = s.sem_create(SemKind::Counting, 0, WaitOrder::Fifo).unwrap();
    assert!(s.heap_used() > used);

    assert!(s.sem_wait(sem, a).unwrap().is_blocked());
    assert!(s.sem_wait_timed(sem, b, 50).unwrap().is_blocked());

    assert_eq!(s.sem_delete(sem), Ok(2));
    for id in [a, b] {
        assert_eq!(s.take_wait_status(id), Some(WaitStatus::ObjectDeleted));
        assert!(s.task(id).unwrap().reasons().is_empty());
    }
    assert!(s.cpu(0).timed().is_empty());
    assert_eq!(s.heap_used(), used);
    assert_eq!(ready_order(&s, 0), [a, b]);

    assert_eq!(s.sem_signal(sem, a), Err(SchedError::NoSuchObject));
    assert_eq!(s.sem_delete(sem), Err(SchedError::NoSuchObject));
    assert_eq!(hal.ipi_count(), 0);
}

/// 删除资源信号量时撤销持有者继承到的优先级
#[test]
fn test_delete_resource_restores_owner() {
    let (mut s, _hal) = new_sched(1);
    let owner = spawn(&mut s, "owner", 3);
    let waiter = spawn(&mut s, "waiter", 30);
    let r = s.sem_create(SemKind::Resource, 0, WaitOrder::Fifo).unwrap();
    assert!(!s.sem_wait(r, owner).unwrap().is_blocked());
    assert!(s.sem_wait(r, waiter).unwrap().is_blocked());
    assert_eq!(s.task(owner).unwrap().priority().0, 30);

    s.sem_delete(r).unwrap();
    assert_eq!(s.task(owner).unwrap().priority().0, 3);
    assert!(s.task(owner).unwrap().owned().is_empty());
    assert_eq!(s.take_wait_status(waiter), Some(WaitStatus::ObjectDeleted));
}

#[test]
fn test_wrong_object_kind() {
    let (mut s, _hal) = new_sched(1);
    let a = spawn(&mut s, "a", 10);
    let b = spawn(&mut s, "b", 10);
    let port = s.task(b).unwrap().port();

    assert_eq!(s.sem_wait(port, a), Err(SchedError::NoSuchObject));
    assert_eq!(
        s.block_on(port, a, BlockReasons::SEMAPHORE, None),
        Err(SchedError::WrongKind)
    );
    assert!(s.task(a).unwrap().reasons().is_empty());
}
