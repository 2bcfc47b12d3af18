//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 多 CPU 调度测试：IPI、任务迁移、共享调度器

use std::thread;

use super::*;
use crate::errno::SchedError;
use crate::mode::ModeChange;
use crate::shared::SharedScheduler;
use crate::task::ExecMode;

/// 跨 CPU 就绪只在会抢占时发 IPI，且对方处理之前不会重复发送
#[test]
fn test_cross_cpu_enqueue_ipi() {
    let (mut s, hal) = new_sched(2);

    let b = spawn_on(&mut s, "b", 10, 1);
    assert_eq!(hal.log().ipis, [1]);
    assert_eq!(s.stats(0).ipis_sent, 1);
    assert!(s.cpu(1).need_resched());

    // 对方还没响应
    let c = spawn_on(&mut s, "c", 20, 1);
    assert_eq!(hal.ipi_count(), 1);

    on_cpu(1);
    assert_eq!(s.schedule(), Some(c));
    assert_eq!(ready_order(&s, 1), [b]);

    on_cpu(0);
    spawn_on(&mut s, "d", 5, 1);
    assert_eq!(hal.ipi_count(), 1);
    assert!(!s.cpu(1).need_resched());

    spawn_on(&mut s, "e", 30, 1);
    assert_eq!(hal.log().ipis, [1, 1]);
    assert_eq!(s.stats(0).ipis_sent, 2);

    // 本地就绪不发 IPI
    spawn(&mut s, "a", 10);
    assert_eq!(hal.ipi_count(), 2);
    assert!(s.cpu(0).need_resched());
    assert_eq!(s.stats(1).ipis_sent, 0);
}

#[test]
fn test_migrate_ready_task() {
    let (mut s, hal) = new_sched(2);
    let a = spawn(&mut s, "a", 10);
    assert_eq!(s.set_cpu(a, 2), Err(SchedError::InvalidArgument));
    // 同一个 CPU 什么也不做
    s.set_cpu(a, 0).unwrap();
    assert_eq!(ready_order(&s, 0), [a]);

    s.set_cpu(a, 1).unwrap();
    assert!(s.cpu(0).ready().is_empty());
    assert_eq!(ready_order(&s, 1), [a]);
    assert_eq!(s.task(a).unwrap().cpu(), 1);
    assert_eq!(hal.log().ipis, [1]);
    assert!(s.check_invariants());
}

/// 睡眠中的任务迁移后由新 CPU 的 tick 唤醒
#[test]
fn test_migrate_sleeping_task() {
    let (mut s, _hal) = new_sched(2);
    let a = spawn(&mut s, "a", 10);
    assert_eq!(s.schedule(), Some(a));
    assert!(s.sleep(a, 10).unwrap().is_blocked());
    assert_eq!(s.schedule(), None);

    s.set_cpu(a, 1).unwrap();
    assert!(s.cpu(0).timed().is_empty());
    assert!(!s.cpu(1).timed().is_empty());

    assert_eq!(s.tick_cpu(0, 10), 0);
    assert_eq!(s.tick_cpu(1, 10), 1);
    assert_eq!(ready_order(&s, 1), [a]);
    assert!(s.cpu(0).ready().is_empty());
}

/// 正在运行的任务迁移：原 CPU 调度时把它交给新 CPU
#[test]
fn test_migrate_running_task() {
    let (mut s, hal) = new_sched(2);
    let a = spawn(&mut s, "a", 10);
    assert_eq!(s.schedule(), Some(a));

    s.set_cpu(a, 1).unwrap();
    assert!(s.cpu(0).need_resched());
    assert_eq!(s.current(0), Some(a));

    assert_eq!(s.schedule(), None);
    assert_eq!(ready_order(&s, 1), [a]);
    assert_eq!(hal.log().ipis, [1]);

    on_cpu(1);
    assert_eq!(s.schedule(), Some(a));
    assert_eq!(hal.last_switch(), Some((1, None, Some(a))));
    assert!(s.check_invariants());
}

/// 等待回切的任务迁移后在新 CPU 的调度点完成切换
#[test]
fn test_migrate_pending_mode_change() {
    let (mut s, _hal) = new_sched(2);
    let t = s
        .task_init(TaskSpec::new("t", 10).mode(ExecMode::Soft))
        .unwrap();
    s.host_mut().signals.insert(t);
    s.begin_request(t).unwrap();
    assert_eq!(s.request_hard(t), Ok(ModeChange::Deferred));
    assert_eq!(s.cpu(0).mode_pending, [t]);

    s.set_cpu(t, 1).unwrap();
    assert!(s.cpu(0).mode_pending.is_empty());
    assert_eq!(s.cpu(1).mode_pending, [t]);

    assert_eq!(s.schedule(), None);
    on_cpu(1);
    assert_eq!(s.schedule(), Some(t));
    assert_eq!(s.task(t).unwrap().mode(), ExecMode::Hard);
}

/// 每个线程模拟一个 CPU，通过共享调度器反复睡眠/唤醒
#[test]
fn test_shared_scheduler_threads() {
    const ROUNDS: u64 = 10;

    let (mut s, hal) = new_sched(2);
    let ids = [spawn_on(&mut s, "w0", 10, 0), spawn_on(&mut s, "w1", 10, 1)];
    let setup_ipis = hal.ipi_count();
    let shared = SharedScheduler::new(s);

    thread::scope(|scope| {
        for (cpu, &me) in ids.iter().enumerate() {
            let shared = &shared;
            scope.spawn(move || {
                on_cpu(cpu);
                assert_eq!(shared.schedule(), Some(me));
                for _ in 0..ROUNDS {
                    let now = shared.with(|s| s.now(cpu));
                    assert!(shared.with(|s| s.sleep(me, 2)).unwrap().is_blocked());
                    assert_eq!(shared.schedule(), None);
                    assert_eq!(shared.tick(now + 1), 0);
                    assert_eq!(shared.tick(now + 2), 1);
                    assert_eq!(shared.with(|s| s.current(cpu)), Some(me));
                }
            });
        }
    });

    let s = shared.into_inner();
    for cpu in 0..2 {
        assert_eq!(s.now(cpu), 2 * ROUNDS);
        assert_eq!(s.stats(cpu).ticks, 2 * ROUNDS);
        assert_eq!(s.current(cpu), Some(ids[cpu]));
    }
    // 任务都绑定在自己的 CPU 上，唤醒不跨 CPU
    assert_eq!(hal.ipi_count(), setup_ipis);
    let log = hal.log();
    assert!(log.irq_saved > 0);
    assert_eq!(log.irq_saved, log.irq_restored);
    drop(log);
    assert!(s.check_invariants());
}

#[test]
fn test_handle_ipi() {
    let (mut s, hal) = new_sched(2);
    let b = spawn_on(&mut s, "b", 10, 1);
    assert_eq!(hal.ipi_count(), 1);
    let shared = SharedScheduler::new(s);

    thread::scope(|scope| {
        scope.spawn(|| {
            on_cpu(1);
            assert_eq!(shared.handle_ipi(), Some(b));
        });
    });

    shared.with(|s| {
        assert!(!s.cpu(1).need_resched());
        assert_eq!(s.current(1), Some(b));
    });
}

/// 经共享入口从 CPU 0 唤醒 CPU 1 上更高优先级的任务：只标记并发 IPI，由 CPU 1 自己切换
#[test]
fn test_remote_wakeup_only_signals() {
    let (mut s, hal) = new_sched(2);
    let b = spawn_on(&mut s, "b", 10, 1);
    let shared = SharedScheduler::new(s);

    thread::scope(|scope| {
        scope.spawn(|| {
            on_cpu(1);
            assert_eq!(shared.handle_ipi(), Some(b));
        });
    });

    let c = shared.with(|s| spawn_on(s, "c", 30, 1));
    shared.with(|s| {
        assert_eq!(s.current(1), Some(b));
        assert!(s.cpu(1).need_resched());
        assert_eq!(ready_order(s, 1), [c]);
    });
    assert_eq!(hal.log().ipis, [1, 1]);

    thread::scope(|scope| {
        scope.spawn(|| {
            on_cpu(1);
            assert_eq!(shared.handle_ipi(), Some(c));
        });
    });
    shared.with(|s| {
        assert_eq!(ready_order(s, 1), [b]);
        assert!(s.check_invariants());
    });
    let log = hal.log();
    assert_eq!(log.irq_saved, log.irq_restored);
}
