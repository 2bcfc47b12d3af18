//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 会合消息测试

use super::*;
use crate::errno::{SchedError, WaitStatus};
use crate::sync::Wait;
use crate::task::BlockReasons;

fn prio(s: &TestSched, id: TaskId) -> u32 {
    s.task(id).unwrap().priority().0
}

#[test]
fn test_send_to_waiting_receiver() {
    let (mut s, _hal) = new_sched(1);
    let srv = spawn(&mut s, "srv", 10);
    let cli = spawn(&mut s, "cli", 10);

    assert!(s.receive(srv, None, None).unwrap().is_blocked());
    assert_eq!(s.task(srv).unwrap().reasons(), BlockReasons::RECEIVE);

    assert_eq!(
        s.send(cli, srv, 42, None).unwrap(),
        Wait::Done(WaitStatus::Granted)
    );
    assert_eq!(s.message(srv), Ok((42, Some(cli))));
    assert_eq!(s.take_wait_status(srv), Some(WaitStatus::Granted));
    assert!(s.task(srv).unwrap().is_runnable());
}

/// 发送者先到：挂在接收者端口上并把优先级传给接收者
#[test]
fn test_send_before_receive_donates() {
    let (mut s, _hal) = new_sched(1);
    let srv = spawn(&mut s, "srv", 10);
    let cli = spawn(&mut s, "cli", 30);
    let port = s.task(srv).unwrap().port();

    assert!(s.send(cli, srv, 42, None).unwrap().is_blocked());
    assert_eq!(s.waiters(port, BlockReasons::SEND), [cli]);
    assert_eq!(prio(&s, srv), 30);

    assert_eq!(
        s.receive(srv, None, None).unwrap(),
        Wait::Done(WaitStatus::Granted)
    );
    assert_eq!(s.message(srv), Ok((42, Some(cli))));
    assert_eq!(s.take_wait_status(cli), Some(WaitStatus::Granted));
    assert_eq!(prio(&s, srv), 10);
}

/// rpc：消息被接收后调用者转入回复队列，回复后结束等待
#[test]
fn test_rpc_round_trip() {
    let (mut s, _hal) = new_sched(1);
    let srv = spawn(&mut s, "srv", 10);
    let cli = spawn(&mut s, "cli", 30);
    let port = s.task(srv).unwrap().port();

    assert_eq!(s.reply(srv, cli, 1), Err(SchedError::NotWaiting));
    assert!(s.rpc(cli, srv, 7, None).unwrap().is_blocked());
    assert_eq!(prio(&s, srv), 30);

    assert!(!s.receive(srv, None, None).unwrap().is_blocked());
    assert_eq!(s.message(srv), Ok((7, Some(cli))));
    assert_eq!(s.task(cli).unwrap().reasons(), BlockReasons::RETURN);
    assert_eq!(s.waiters(port, BlockReasons::RETURN), [cli]);
    assert!(s.waiters(port, BlockReasons::SEND).is_empty());
    // 回复之前仍然继承 rpc 调用者的优先级
    assert_eq!(prio(&s, srv), 30);

    s.reply(srv, cli, 99).unwrap();
    assert_eq!(s.message(cli), Ok((99, Some(srv))));
    assert_eq!(s.take_wait_status(cli), Some(WaitStatus::Granted));
    assert_eq!(prio(&s, srv), 10);
    assert!(s.check_invariants());
}

#[test]
fn test_rpc_to_waiting_receiver() {
    let (mut s, _hal) = new_sched(1);
    let srv = spawn(&mut s, "srv", 10);
    let cli = spawn(&mut s, "cli", 20);

    assert!(s.receive(srv, None, None).unwrap().is_blocked());
    assert!(s.rpc(cli, srv, 5, None).unwrap().is_blocked());
    assert_eq!(s.message(srv), Ok((5, Some(cli))));
    assert!(s.task(srv).unwrap().is_runnable());
    assert_eq!(s.task(cli).unwrap().reasons(), BlockReasons::RETURN);
    assert_eq!(prio(&s, srv), 20);

    s.reply(srv, cli, 6).unwrap();
    assert_eq!(s.message(cli), Ok((6, Some(srv))));
}

/// 指定发送者接收时跳过其他发送者
#[test]
fn test_receive_from_specific_sender() {
    let (mut s, _hal) = new_sched(1);
    let srv = spawn(&mut s, "srv", 10);
    let a = spawn(&mut s, "a", 20);
    let b = spawn(&mut s, "b", 20);
    let port = s.task(srv).unwrap().port();

    assert!(s.send(a, srv, 1, None).unwrap().is_blocked());
    assert!(s.send(b, srv, 2, None).unwrap().is_blocked());
    assert!(!s.receive(srv, Some(b), None).unwrap().is_blocked());
    assert_eq!(s.message(srv), Ok((2, Some(b))));
    assert_eq!(s.waiters(port, BlockReasons::SEND), [a]);

    // 只等 b 的时候 a 的消息不会被交付
    assert!(s.receive(srv, Some(b), None).unwrap().is_blocked());
    assert!(s.is_waiting(a));
}

#[test]
fn test_send_timeout() {
    let (mut s, _hal) = new_sched(1);
    let srv = spawn(&mut s, "srv", 10);
    let cli = spawn(&mut s, "cli", 30);

    assert_eq!(
        s.send(cli, srv, 1, Some(0)).unwrap(),
        Wait::Done(WaitStatus::TimedOut)
    );
    assert!(s.send(cli, srv, 1, Some(3)).unwrap().is_blocked());
    assert_eq!(prio(&s, srv), 30);

    s.tick_cpu(0, 3);
    assert_eq!(s.take_wait_status(cli), Some(WaitStatus::TimedOut));
    assert_eq!(prio(&s, srv), 10);
    assert_eq!(s.send(cli, cli, 1, None), Err(SchedError::InvalidArgument));
}

/// 删除接收者，端口上的发送者以 ObjectDeleted 唤醒
#[test]
fn test_delete_receiver_wakes_senders() {
    let (mut s, _hal) = new_sched(1);
    let srv = spawn(&mut s, "srv", 10);
    let cli = spawn(&mut s, "cli", 30);
    let port = s.task(srv).unwrap().port();

    assert!(s.send(cli, srv, 1, None).unwrap().is_blocked());
    s.task_delete(srv).unwrap();
    assert_eq!(s.take_wait_status(cli), Some(WaitStatus::ObjectDeleted));
    assert!(s.task(cli).unwrap().is_runnable());
    assert!(s.waiters(port, BlockReasons::SEND).is_empty());
    assert_eq!(s.send(cli, srv, 1, None), Err(SchedError::NoSuchTask));
}
