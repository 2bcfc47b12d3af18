//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器核心
//!
//! 对应 Linux 的 kernel/sched/core.c 以及 RTAI 的 `rt_schedule()` / `rt_timer_handler()`。
//!
//! 调度入口：
//! - [`Scheduler::schedule`]: 在调用 CPU 上选出下一个任务并切换（唯一的让出点）
//! - [`Scheduler::tick`]: 定时器中断，处理到期的定时队列项和时间片
//!
//! 所有队列操作都不会阻塞、不会分配内存。影响其他 CPU 的操作只设置对方的
//! need_resched 并发送 IPI，不直接改动对方的当前任务。

use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::config::{SchedConfig, TimerMode};
use crate::errno::{Errno, WaitStatus};
use crate::hal::{Hal, HostScheduler, KernelHeap, RegionHeap};
use crate::list::LinkKind;
use crate::sync::ObjectTable;
use crate::task::{BlockReasons, Priority, RunState, Task, TaskId, TaskTable, Ticks};

use super::percpu::{CpuRq, CpuStats};
use super::ready::{outranks, Placement};

/// 实时调度器实例
///
/// 拥有任务表、同步对象表和所有 CPU 的运行队列。SMP 下通过
/// [`SharedScheduler`](crate::shared::SharedScheduler) 加锁使用。
pub struct Scheduler<H: Hal, G: HostScheduler> {
    pub(crate) config: SchedConfig,
    pub(crate) hal: H,
    pub(crate) host: G,
    pub(crate) heap: Box<dyn KernelHeap + Send>,
    pub(crate) tasks: TaskTable,
    pub(crate) objects: ObjectTable,
    pub(crate) cpus: Vec<CpuRq>,
    pub(crate) timer_irq: Option<u32>,
}

impl<H: Hal, G: HostScheduler> Scheduler<H, G> {
    /// 使用默认内存池（`config.heap_size` 字节）创建调度器
    pub fn new(config: SchedConfig, hal: H, host: G) -> Self {
        let heap = Box::new(RegionHeap::new(config.heap_size));
        Self::with_heap(config, hal, host, heap)
    }

    pub fn with_heap(
        config: SchedConfig,
        hal: H,
        host: G,
        heap: Box<dyn KernelHeap + Send>,
    ) -> Self {
        let nr_cpus = config.nr_cpus.max(1);
        let cpus = (0..nr_cpus)
            .map(|cpu| CpuRq::new(cpu, config.max_tasks))
            .collect();

        info!(
            "sched: init {} cpus, {} task slots, {:?} timer",
            nr_cpus, config.max_tasks, config.timer_mode
        );

        Self {
            tasks: TaskTable::with_capacity(config.max_tasks),
            objects: ObjectTable::with_capacity(config.max_tasks * 2),
            cpus,
            timer_irq: None,
            config,
            hal,
            host,
            heap,
        }
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn host(&self) -> &G {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut G {
        &mut self.host
    }

    pub fn nr_cpus(&self) -> usize {
        self.cpus.len()
    }

    pub fn cpu(&self, cpu: usize) -> &CpuRq {
        &self.cpus[cpu]
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn tasks(&self) -> &TaskTable {
        &self.tasks
    }

    pub fn lookup(&self, name: &str) -> Option<TaskId> {
        self.tasks.lookup(name)
    }

    pub fn current(&self, cpu: usize) -> Option<TaskId> {
        self.cpus[cpu].current
    }

    pub fn now(&self, cpu: usize) -> Ticks {
        self.cpus[cpu].now()
    }

    pub fn stats(&self, cpu: usize) -> CpuStats {
        self.cpus[cpu].stats
    }

    pub fn heap_used(&self) -> usize {
        self.heap.used()
    }

    /// 调用者所在的 CPU
    #[track_caller]
    pub(crate) fn this_cpu(&self) -> usize {
        let cpu = self.hal.cpu_id();
        assert!(cpu < self.cpus.len(), "sched: cpu {} out of range", cpu);
        cpu
    }

    /// 按优先级插入所属 CPU 的就绪队列（同级末尾），必要时通知该 CPU
    ///
    /// # Panics
    /// 任务还有阻塞原因，或已经在就绪队列中
    pub fn enqueue_ready(&mut self, id: TaskId) {
        let task = self.tasks.tcb_mut(id);
        assert!(
            task.reasons.is_empty(),
            "sched: enqueue_ready on blocked task {} ({:?})",
            id,
            task.reasons
        );
        task.state = RunState::Ready;
        let cpu = task.cpu;

        self.cpus[cpu].ready.enqueue(&mut self.tasks, id, Placement::Back);
        sched_trace!("sched: enqueue task {} on cpu {}", id, cpu);
        self.kick_if_preempts(cpu, id);
    }

    /// 从就绪队列删除
    ///
    /// # Panics
    /// 任务不在就绪队列中
    pub fn remove_ready(&mut self, id: TaskId) {
        let cpu = self.tasks.tcb(id).cpu;
        self.cpus[cpu].ready.remove(&mut self.tasks, id);
        sched_trace!("sched: dequeue task {} from cpu {}", id, cpu);
    }

    /// 修改任务的当前优先级并调整它所在的队列，返回优先级是否真的变了
    ///
    /// - 在就绪队列中：重新排序，可能抢占所属 CPU（跨 CPU 时发 IPI）
    /// - 阻塞在按优先级排序的等待队列中：调整等待位置
    /// - 正在运行且被降级：如果就绪队首因此更优先，触发重新调度
    pub fn requeue(&mut self, id: TaskId, prio: Priority) -> bool {
        let task = self.tasks.tcb(id);
        let old = task.priority;
        if old == prio {
            return false;
        }
        let cpu = task.cpu;
        let on_cpu = task.on_cpu;
        let blocked_on = task.blocked_on;
        let reasons = task.reasons;

        if task.is_linked(LinkKind::Ready) {
            self.cpus[cpu].ready.requeue(&mut self.tasks, id, prio);
            if prio.outranks(old) {
                self.kick_if_preempts(cpu, id);
            }
        } else {
            self.tasks.tcb_mut(id).priority = prio;
            if let Some(obj) = blocked_on {
                if let Some(queue) = self.objects.queue_mut(obj, reasons) {
                    queue.reposition(&mut self.tasks, id);
                }
            }
            if let Some(c) = on_cpu {
                if let Some(head) = self.cpus[c].ready.peek() {
                    if outranks(self.tasks.tcb(head), self.tasks.tcb(id)) {
                        self.resched_cpu(c);
                    }
                }
            }
        }

        sched_trace!("sched: task {} priority {} -> {}", id, old.0, prio.0);
        true
    }

    /// 标记 `cpu` 需要重新调度；不是本 CPU 时发送 IPI（已有未处理的 IPI 则不重复发）
    pub fn resched_cpu(&mut self, cpu: usize) {
        let local = self.hal.cpu_id();
        let rq = &mut self.cpus[cpu];
        rq.need_resched = true;
        if cpu == local || rq.ipi_pending {
            return;
        }
        rq.ipi_pending = true;
        if let Some(me) = self.cpus.get_mut(local) {
            me.stats.ipis_sent += 1;
        }
        sched_trace!("ipi: cpu {} -> cpu {} reschedule", local, cpu);
        self.hal.send_reschedule_ipi(cpu);
    }

    /// `id` 刚进入 `cpu` 的就绪队列，如果它比该 CPU 当前任务更优先就触发重新调度
    pub(crate) fn kick_if_preempts(&mut self, cpu: usize, id: TaskId) {
        let preempts = match self.cpus[cpu].current.and_then(|cur| self.tasks.get(cur)) {
            Some(cur) if cur.is_runnable() => outranks(self.tasks.tcb(id), cur),
            _ => true,
        };
        if preempts {
            self.resched_cpu(cpu);
        }
    }

    /// 阻塞原因被清除后调用：没有剩余原因时重新就绪；只剩 HOST 时交给宿主唤醒
    pub(crate) fn wake_task(&mut self, id: TaskId) {
        let Some(task) = self.tasks.get_mut(id) else {
            return;
        };
        if task.state == RunState::Terminated {
            return;
        }

        if task.reasons.is_empty() {
            if task.on_cpu.is_some() {
                // 还没来得及切走，继续运行
                task.state = RunState::Running;
                return;
            }
            if task.is_linked(LinkKind::Ready) {
                return;
            }
            self.enqueue_ready(id);
        } else if task.reasons == BlockReasons::HOST {
            self.host.wake(id);
        }
    }

    /// 给任务加上阻塞原因；任务原本可运行时把它移出就绪队列，正在运行则触发重新调度
    pub(crate) fn block_task(&mut self, id: TaskId, reason: BlockReasons) {
        let task = self.tasks.tcb_mut(id);
        let was_runnable = task.reasons.is_empty();
        task.reasons |= reason;
        if !was_runnable {
            return;
        }
        task.state = RunState::Blocked;
        let cpu = task.cpu;
        let on_cpu = task.on_cpu;

        if task.is_linked(LinkKind::Ready) {
            self.cpus[cpu].ready.remove(&mut self.tasks, id);
        }
        if let Some(c) = on_cpu {
            self.resched_cpu(c);
        }
        sched_trace!("sched: block task {} ({:?})", id, reason);
    }

    /// 插入所属 CPU 的定时队列；成为最早到期项时重新设置单次定时器
    pub fn enqueue_timed(&mut self, id: TaskId, wake_time: Ticks) {
        let cpu = self.tasks.tcb(id).cpu;
        self.cpus[cpu].timed.enqueue(&mut self.tasks, id, wake_time);
        if self.cpus[cpu].timed.next_expiry(&self.tasks) == Some(wake_time) {
            self.program_timer(cpu);
        }
    }

    /// 从定时队列删除，不在队列中时什么也不做
    pub fn remove_timed(&mut self, id: TaskId) {
        let cpu = self.tasks.tcb(id).cpu;
        self.cpus[cpu].timed.remove(&mut self.tasks, id);
    }

    /// 在调用 CPU 上调度
    pub fn schedule(&mut self) -> Option<TaskId> {
        let cpu = self.this_cpu();
        self.schedule_cpu(cpu)
    }

    /// 调度入口，对应 Linux 的 `__schedule()`
    ///
    /// 1. 完成挂起的 SoftReturning -> Hard 切换（调度点是唯一的安全点）
    /// 2. 当前任务仍可运行且没有被更优先的任务超过、也没有让出：继续运行
    /// 3. 否则把它放回就绪队列（被抢占放同级最前，让出放同级末尾），取队首切换过去
    pub(crate) fn schedule_cpu(&mut self, cpu: usize) -> Option<TaskId> {
        {
            let rq = &mut self.cpus[cpu];
            rq.need_resched = false;
            rq.ipi_pending = false;
        }
        self.complete_mode_transitions(cpu);

        let prev = self.cpus[cpu].current;
        if let Some(p) = prev {
            if self.put_prev(cpu, p) {
                self.program_timer(cpu);
                return Some(p);
            }
            self.cpus[cpu].current = None;
        }

        let next = self.cpus[cpu].ready.pop(&mut self.tasks);
        if let Some(n) = next {
            let quantum = self.config.rr_quantum;
            let task = self.tasks.tcb_mut(n);
            task.state = RunState::Running;
            task.on_cpu = Some(cpu);
            if let Some(q) = task.quantum() {
                if task.rr_remaining == 0 {
                    task.rr_remaining = if q == 0 { quantum } else { q };
                }
            }
        }
        self.cpus[cpu].current = next;

        if prev != next {
            self.cpus[cpu].stats.switches += 1;
            sched_trace!("sched: cpu {} switch {:?} -> {:?}", cpu, prev, next);
            self.hal.switch_to(cpu, prev, next);
        }
        self.program_timer(cpu);
        next
    }

    /// 处理上一个任务，返回它是否继续运行
    fn put_prev(&mut self, cpu: usize, prev: TaskId) -> bool {
        let Some(task) = self.tasks.get(prev) else {
            return false;
        };
        if !task.is_runnable() {
            self.tasks.tcb_mut(prev).on_cpu = None;
            return false;
        }

        if task.cpu != cpu {
            // 被迁移到了其他 CPU
            let task = self.tasks.tcb_mut(prev);
            task.on_cpu = None;
            task.yielding = false;
            self.enqueue_ready(prev);
            return false;
        }

        let yielding = task.yielding;
        let switch = match self.cpus[cpu].ready.peek() {
            Some(head) => {
                let head = self.tasks.tcb(head);
                outranks(head, task) || (yielding && !outranks(task, head))
            }
            None => false,
        };

        let task = self.tasks.tcb_mut(prev);
        task.yielding = false;
        if !switch {
            return true;
        }

        task.state = RunState::Ready;
        task.on_cpu = None;
        let at = if yielding {
            Placement::Back
        } else {
            Placement::Front
        };
        self.cpus[cpu].ready.enqueue(&mut self.tasks, prev, at);
        false
    }

    /// 单次定时器模式下，把 `cpu` 的定时器设到下一个事件（定时队列首项或时间片结束）
    pub(crate) fn program_timer(&mut self, cpu: usize) {
        if self.config.timer_mode != TimerMode::OneShot || self.timer_irq.is_none() {
            return;
        }
        let rq = &self.cpus[cpu];
        let mut next = rq.timed.next_expiry(&self.tasks);
        if let Some(cur) = rq.current.and_then(|c| self.tasks.get(c)) {
            if cur.quantum().is_some() && cur.is_runnable() {
                let end = rq.now().saturating_add(cur.rr_remaining);
                next = Some(next.map_or(end, |n| n.min(end)));
            }
        }
        if let Some(expiry) = next {
            self.hal.program_timer(cpu, expiry);
        }
    }

    /// 在调用 CPU 上处理一次定时器中断
    pub fn tick(&mut self, now: Ticks) -> usize {
        let cpu = self.this_cpu();
        self.tick_cpu(cpu, now)
    }

    /// 定时器中断处理，对应 RTAI 的 `rt_timer_handler()`
    ///
    /// 摘下所有 `wake_time <= now` 的定时项：清除 DELAYED；仍在等待对象的任务以
    /// `TimedOut` 结束等待。然后扣减当前任务的时间片，用完时让出。
    /// 返回被唤醒（超时）的任务数。
    pub(crate) fn tick_cpu(&mut self, cpu: usize, now: Ticks) -> usize {
        let elapsed = {
            let rq = &mut self.cpus[cpu];
            let elapsed = match (self.config.timer_mode, rq.clock) {
                (TimerMode::OneShot, Some(prev)) => now.saturating_sub(prev),
                _ => 1,
            };
            rq.clock = Some(rq.clock.map_or(now, |prev| prev.max(now)));
            rq.stats.ticks += 1;
            elapsed
        };

        let mut woken = 0;
        while let Some(id) = self.cpus[cpu].timed.pop_expired(&mut self.tasks, now) {
            self.expire_timeout(cpu, id);
            woken += 1;
        }

        if let Some(cur) = self.cpus[cpu].current {
            let quantum = self.config.rr_quantum;
            if let Some(task) = self.tasks.get_mut(cur) {
                if let Some(q) = task.quantum() {
                    if task.is_runnable() {
                        task.rr_remaining = task.rr_remaining.saturating_sub(elapsed);
                        if task.rr_remaining == 0 {
                            task.rr_remaining = if q == 0 { quantum } else { q };
                            task.yielding = true;
                            sched_trace!("sched: task {} quantum expired", cur);
                            self.resched_cpu(cpu);
                        }
                    }
                }
            }
        }

        self.program_timer(cpu);
        woken
    }

    fn expire_timeout(&mut self, cpu: usize, id: TaskId) {
        self.cpus[cpu].stats.timeouts += 1;
        let task = self.tasks.tcb_mut(id);
        task.reasons.remove(BlockReasons::DELAYED);
        if task.reasons.intersects(BlockReasons::WAIT) {
            debug!("sched: task {} wait timed out", id);
            self.complete_wait(id, WaitStatus::TimedOut);
        } else {
            self.wake_task(id);
        }
    }

    /// 注册定时器中断
    pub fn start_timer(&mut self, irq: u32) -> Result<(), Errno> {
        if self.timer_irq.is_some() {
            warn!("sched: timer already attached");
            return Err(Errno::DeviceOrResourceBusy);
        }
        self.hal.attach_timer_irq(irq)?;
        self.timer_irq = Some(irq);
        info!("sched: timer irq {} attached ({:?})", irq, self.config.timer_mode);
        for cpu in 0..self.cpus.len() {
            self.program_timer(cpu);
        }
        Ok(())
    }

    pub fn stop_timer(&mut self) {
        if let Some(irq) = self.timer_irq.take() {
            self.hal.detach_timer_irq(irq);
            info!("sched: timer irq {} detached", irq);
        }
    }

    /// 检查所有队列和成员关系不变量
    ///
    /// - 每个队列都是完整的循环链表且有序
    /// - 任务不会同时在就绪队列和阻塞队列中
    /// - 在就绪队列中的任务没有阻塞原因，也不归宿主调度器
    pub fn check_invariants(&self) -> bool {
        let queues_ok = self.cpus.iter().all(|rq| {
            rq.ready.is_consistent(&self.tasks) && rq.timed.is_consistent(&self.tasks)
        });
        let members_ok = self.tasks.iter().all(|task| {
            let ready = task.is_linked(LinkKind::Ready);
            let blocked = task.is_linked(LinkKind::Block);
            !(ready && blocked)
                && (!ready || task.reasons.is_empty())
                && (!blocked || task.blocked_on.is_some())
                && (!ready || self.cpus[task.cpu].ready.iter(&self.tasks).any(|t| t == task.id))
        });
        queues_ok && members_ok
    }
}
