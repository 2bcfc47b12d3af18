//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 场景测试
//!
//! 单个数据结构的测试放在各自模块的 `#[cfg(test)] mod tests` 中；这里是跨模块的
//! 调度场景，共用一套模拟 HAL 和宿主调度器。
//!
//! 运行测试：
//! ```bash
//! cargo test --package rt-sched
//! ```

mod inherit;
mod rendezvous;
mod semaphore;
mod smp_schedule;

use std::cell::Cell;
use std::collections::BTreeSet;
use std::sync::Arc;

use spin::Mutex;

use crate::config::{SchedConfig, TimerMode};
use crate::errno::Errno;
use crate::hal::{Hal, HeapBlock, HostScheduler, KernelHeap, RegionHeap};
use crate::sched::Scheduler;
use crate::task::{TaskId, TaskSpec, Ticks};

std::thread_local! {
    static CPU: Cell<usize> = const { Cell::new(0) };
}

/// 设置当前线程模拟的 CPU 号
pub fn on_cpu(cpu: usize) {
    CPU.with(|c| c.set(cpu));
}

/// HAL 调用记录
#[derive(Debug, Default)]
pub struct HalLog {
    pub ipis: Vec<usize>,
    pub switches: Vec<(usize, Option<TaskId>, Option<TaskId>)>,
    pub timers: Vec<(usize, Ticks)>,
    pub attached: Vec<u32>,
    pub irq_saved: usize,
    pub irq_restored: usize,
    pub refuse_attach: bool,
}

#[derive(Clone, Default)]
pub struct MockHal {
    log: Arc<Mutex<HalLog>>,
}

impl MockHal {
    pub fn log(&self) -> spin::MutexGuard<'_, HalLog> {
        self.log.lock()
    }

    pub fn ipi_count(&self) -> usize {
        self.log.lock().ipis.len()
    }

    pub fn last_switch(&self) -> Option<(usize, Option<TaskId>, Option<TaskId>)> {
        self.log.lock().switches.last().copied()
    }
}

impl Hal for MockHal {
    fn cpu_id(&self) -> usize {
        CPU.with(|c| c.get())
    }

    fn irq_save(&self) -> usize {
        let mut log = self.log.lock();
        log.irq_saved += 1;
        log.irq_saved
    }

    fn irq_restore(&self, _flags: usize) {
        self.log.lock().irq_restored += 1;
    }

    fn attach_timer_irq(&self, irq: u32) -> Result<(), Errno> {
        let mut log = self.log.lock();
        if log.refuse_attach {
            return Err(Errno::DeviceOrResourceBusy);
        }
        log.attached.push(irq);
        Ok(())
    }

    fn detach_timer_irq(&self, irq: u32) {
        self.log.lock().attached.retain(|&i| i != irq);
    }

    fn program_timer(&self, cpu: usize, expiry: Ticks) {
        self.log.lock().timers.push((cpu, expiry));
    }

    fn send_reschedule_ipi(&self, cpu: usize) {
        self.log.lock().ipis.push(cpu);
    }

    fn switch_to(&self, cpu: usize, prev: Option<TaskId>, next: Option<TaskId>) {
        self.log.lock().switches.push((cpu, prev, next));
    }
}

/// 宿主调度器调用记录
#[derive(Debug, Default)]
pub struct MockHost {
    pub stolen: Vec<TaskId>,
    pub given_back: Vec<TaskId>,
    pub woken: Vec<TaskId>,
    pub forgotten: Vec<TaskId>,
    pub signals: BTreeSet<TaskId>,
}

impl HostScheduler for MockHost {
    fn steal(&mut self, task: TaskId, _cpu: usize) {
        self.stolen.push(task);
    }

    fn give_back(&mut self, task: TaskId, _cpu: usize) {
        self.given_back.push(task);
    }

    fn wake(&mut self, task: TaskId) {
        self.woken.push(task);
    }

    fn signal_pending(&self, task: TaskId) -> bool {
        self.signals.contains(&task)
    }

    fn forget(&mut self, task: TaskId) {
        self.forgotten.push(task);
    }
}

/// 只允许前 `budget` 次分配成功的内存池
pub struct FailingHeap {
    inner: RegionHeap,
    budget: usize,
}

impl FailingHeap {
    pub fn new(budget: usize) -> Self {
        Self {
            inner: RegionHeap::new(64 * 1024),
            budget,
        }
    }
}

impl KernelHeap for FailingHeap {
    fn alloc(&mut self, layout: core::alloc::Layout) -> Option<HeapBlock> {
        if self.budget == 0 {
            return None;
        }
        self.budget -= 1;
        self.inner.alloc(layout)
    }

    fn free(&mut self, block: HeapBlock) {
        self.inner.free(block);
    }

    fn used(&self) -> usize {
        self.inner.used()
    }
}

pub type TestSched = Scheduler<MockHal, MockHost>;

pub fn config(cpus: usize) -> SchedConfig {
    SchedConfig::default()
        .with_cpus(cpus)
        .with_max_tasks(32)
        .with_timer_mode(TimerMode::Periodic)
        .with_heap_size(256 * 1024)
        .with_rr_quantum(4)
}

/// 创建调度器，返回它和 HAL 的一个副本（用来查看调用记录）
pub fn new_sched(cpus: usize) -> (TestSched, MockHal) {
    on_cpu(0);
    let hal = MockHal::default();
    let sched = Scheduler::new(config(cpus), hal.clone(), MockHost::default());
    (sched, hal)
}

/// 在 CPU 0 上创建 Hard 模式的任务
pub fn spawn(s: &mut TestSched, name: &str, prio: u32) -> TaskId {
    s.task_init(TaskSpec::new(name, prio)).unwrap()
}

pub fn spawn_on(s: &mut TestSched, name: &str, prio: u32, cpu: usize) -> TaskId {
    s.task_init(TaskSpec::new(name, prio).cpu(cpu)).unwrap()
}

/// 就绪队列中的任务（按调度顺序）
pub fn ready_order(s: &TestSched, cpu: usize) -> Vec<TaskId> {
    s.cpu(cpu).ready().iter(s.tasks()).collect()
}

/// 让 `cpu` 上的时钟前进到 `now`，并在需要时调度
pub fn advance(s: &mut TestSched, cpu: usize, now: Ticks) -> usize {
    let woken = s.tick_cpu(cpu, now);
    if s.cpu(cpu).need_resched() {
        s.schedule_cpu(cpu);
    }
    woken
}
