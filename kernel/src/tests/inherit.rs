//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 优先级继承测试

use super::*;
use crate::errno::WaitStatus;
use crate::sync::{ObjectId, SemKind, Wait, WaitOrder};
use crate::task::{BlockReasons, Priority};

fn prio(s: &TestSched, id: TaskId) -> u32 {
    s.task(id).unwrap().priority().0
}

fn resource(s: &mut TestSched) -> ObjectId {
    s.sem_create(SemKind::Resource, 0, WaitOrder::Priority)
        .unwrap()
}

/// 两个等待者（10、20）等待优先级 5 的任务持有的资源：
/// 持有者被抬到 20，释放后回到 5，20 先于 10 获得资源
#[test]
fn test_inherit_and_release_order() {
    let (mut s, _hal) = new_sched(1);
    let owner = spawn(&mut s, "owner", 5);
    assert_eq!(s.schedule(), Some(owner));
    let r = resource(&mut s);
    assert_eq!(s.sem_wait(r, owner).unwrap(), Wait::Done(WaitStatus::Granted));

    let w10 = spawn(&mut s, "w10", 10);
    assert_eq!(s.schedule(), Some(w10));
    assert!(s.sem_wait(r, w10).unwrap().is_blocked());
    assert_eq!(prio(&s, owner), 10);
    assert_eq!(s.task(w10).unwrap().prio_passed_to(), Some(owner));

    let w20 = spawn(&mut s, "w20", 20);
    assert_eq!(s.schedule(), Some(w20));
    assert!(s.sem_wait(r, w20).unwrap().is_blocked());
    assert_eq!(prio(&s, owner), 20);
    assert_eq!(s.task(owner).unwrap().base_priority(), Priority(5));
    assert_eq!(s.waiters(r, BlockReasons::SEMAPHORE), [w20, w10]);

    assert_eq!(s.schedule(), Some(owner));
    s.sem_signal(r, owner).unwrap();
    assert_eq!(prio(&s, owner), 5);
    assert_eq!(s.sem_owner(r).unwrap(), Some(w20));
    assert_eq!(s.take_wait_status(w20), Some(WaitStatus::Granted));
    // 剩下的等待者改为向新持有者传递
    assert_eq!(s.task(w10).unwrap().prio_passed_to(), Some(w20));
    assert!(s.is_waiting(w10));

    assert_eq!(s.schedule(), Some(w20));
    s.sem_signal(r, w20).unwrap();
    assert_eq!(s.sem_owner(r).unwrap(), Some(w10));
    assert_eq!(s.take_wait_status(w10), Some(WaitStatus::Granted));
    assert!(s.check_invariants());
}

/// 沿长度 1..=N 的链传递后完全撤销，每个任务恢复到传递前的优先级
#[test]
fn test_donation_chain_round_trip() {
    for n in 1..=6 {
        let (mut s, _hal) = new_sched(1);
        let tasks: Vec<TaskId> = (0..n)
            .map(|i| spawn(&mut s, &format!("t{}", i), i as u32 + 1))
            .collect();
        let sems: Vec<ObjectId> = (0..n).map(|_| resource(&mut s)).collect();

        for i in 0..n {
            assert!(!s.sem_wait(sems[i], tasks[i]).unwrap().is_blocked());
        }
        for i in 1..n {
            assert!(s.sem_wait(sems[i - 1], tasks[i]).unwrap().is_blocked());
        }
        let before: Vec<u32> = tasks.iter().map(|&t| prio(&s, t)).collect();

        let donor = spawn(&mut s, "donor", 100);
        assert!(s.sem_wait(sems[n - 1], donor).unwrap().is_blocked());
        for &t in &tasks {
            assert_eq!(prio(&s, t), 100, "chain length {}", n);
        }

        s.unblock(donor).unwrap();
        assert_eq!(s.take_wait_status(donor), Some(WaitStatus::Cancelled));
        let after: Vec<u32> = tasks.iter().map(|&t| prio(&s, t)).collect();
        assert_eq!(before, after, "chain length {}", n);
        assert!(s.check_invariants());
    }
}

/// 等待超时也会撤销传出的优先级
#[test]
fn test_timeout_revokes_donation() {
    let (mut s, _hal) = new_sched(1);
    let owner = spawn(&mut s, "owner", 5);
    let waiter = spawn(&mut s, "waiter", 50);
    let r = resource(&mut s);
    assert!(!s.sem_wait(r, owner).unwrap().is_blocked());

    assert!(s.sem_wait_timed(r, waiter, 3).unwrap().is_blocked());
    assert_eq!(prio(&s, owner), 50);

    s.tick_cpu(0, 3);
    assert_eq!(s.take_wait_status(waiter), Some(WaitStatus::TimedOut));
    assert_eq!(prio(&s, owner), 5);
    assert_eq!(s.task(waiter).unwrap().prio_passed_to(), None);
}

/// 修改基础优先级时保留继承来的优先级
#[test]
fn test_base_priority_change_keeps_donation() {
    let (mut s, _hal) = new_sched(1);
    let owner = spawn(&mut s, "owner", 5);
    let waiter = spawn(&mut s, "waiter", 20);
    let r = resource(&mut s);
    assert!(!s.sem_wait(r, owner).unwrap().is_blocked());
    assert!(s.sem_wait(r, waiter).unwrap().is_blocked());

    s.set_base_priority(owner, Priority(30)).unwrap();
    assert_eq!(prio(&s, owner), 30);
    s.set_base_priority(owner, Priority(1)).unwrap();
    assert_eq!(prio(&s, owner), 20);

    // 等待者自己的优先级变化沿边传下去
    s.set_base_priority(waiter, Priority(40)).unwrap();
    assert_eq!(prio(&s, owner), 40);
    s.set_base_priority(waiter, Priority(15)).unwrap();
    assert_eq!(prio(&s, owner), 15);
}

/// 资源信号量：递归获取与非持有者释放
#[test]
fn test_resource_recursion_and_ownership() {
    let (mut s, _hal) = new_sched(1);
    let a = spawn(&mut s, "a", 10);
    let b = spawn(&mut s, "b", 10);
    let r = resource(&mut s);

    assert!(!s.sem_wait(r, a).unwrap().is_blocked());
    assert!(!s.sem_wait(r, a).unwrap().is_blocked());
    assert_eq!(s.sem_signal(r, b), Err(crate::errno::SchedError::NotOwner));

    s.sem_signal(r, a).unwrap();
    assert_eq!(s.sem_owner(r).unwrap(), Some(a));
    s.sem_signal(r, a).unwrap();
    assert_eq!(s.sem_owner(r).unwrap(), None);
    assert!(s.task(a).unwrap().owned().is_empty());
}

/// 持有关系成环时检测到并报错
#[test]
#[should_panic(expected = "priority donation cycle")]
fn test_donation_cycle_detected() {
    let (mut s, _hal) = new_sched(1);
    let hi = spawn(&mut s, "hi", 5);
    let lo = spawn(&mut s, "lo", 2);
    let r_hi = resource(&mut s);
    let r_lo = resource(&mut s);
    assert!(!s.sem_wait(r_hi, hi).unwrap().is_blocked());
    assert!(!s.sem_wait(r_lo, lo).unwrap().is_blocked());

    assert!(s.sem_wait(r_hi, lo).unwrap().is_blocked());
    // 死锁：hi 等待 lo 持有的资源
    let _ = s.sem_wait(r_lo, hi);
}
