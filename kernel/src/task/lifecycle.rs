//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 任务生命周期
//!
//! 对应 Linux 的 `copy_process` / `do_exit`，以及 RTAI 的 `rt_task_init` /
//! `rt_task_delete` / `rt_task_suspend` / `rt_task_resume` / `rt_sleep` /
//! `rt_task_make_periodic` / `rt_task_wait_period`。
//!
//! 任务控制块、端口和退出回调记录都从实时内存池分配；分配失败时回滚已经做过的
//! 登记，返回 `NoMemory`。

use core::alloc::Layout;

use log::{debug, warn};

use crate::errno::{SchedError, WaitStatus};
use crate::hal::{Hal, HostScheduler};
use crate::list::LinkKind;
use crate::sched::{Placement, Scheduler};
use crate::sync::{ObjectId, ObjectKind, Port, Wait};

use super::tcb::{
    BlockReasons, ExecMode, ExitFn, ExitHook, Periodic, Priority, RunState, SchedPolicy, Task,
    TaskId, TaskSpec, Ticks,
};

/// 端口登记之前的占位
const NO_PORT: ObjectId = ObjectId::from_parts(u32::MAX, 0);

impl<H: Hal, G: HostScheduler> Scheduler<H, G> {
    /// 创建任务
    ///
    /// Hard 模式且不挂起的任务立即进入就绪队列；Soft 模式的任务归宿主调度器。
    pub fn task_init(&mut self, spec: TaskSpec) -> Result<TaskId, SchedError> {
        if spec.name.is_empty() || spec.name.len() > self.config.name_max {
            return Err(SchedError::InvalidName);
        }
        if spec.cpu >= self.cpus.len() {
            return Err(SchedError::InvalidArgument);
        }
        if self.tasks.lookup(&spec.name).is_some() {
            return Err(SchedError::NameExists);
        }
        if self.tasks.is_full() || self.objects.is_full() {
            return Err(SchedError::TableFull);
        }

        let tcb_block = self
            .heap
            .alloc(Layout::new::<Task>())
            .ok_or(SchedError::NoMemory)?;
        let Some(port_block) = self.heap.alloc(Layout::new::<Port>()) else {
            self.heap.free(tcb_block);
            warn!("sched: no memory for port of task '{}'", spec.name);
            return Err(SchedError::NoMemory);
        };

        let max_owned = self.config.max_owned;
        let now = self.cpus[spec.cpu].now();
        let id = match self
            .tasks
            .insert(&spec.name, |id| Task::new(id, &spec, NO_PORT, max_owned))
        {
            Ok(id) => id,
            Err(e) => {
                self.heap.free(port_block);
                self.heap.free(tcb_block);
                return Err(e);
            }
        };
        let port = self
            .objects
            .insert(ObjectKind::Port(Port::new(id)), Some(port_block));

        let task = self.tasks.tcb_mut(id);
        task.port = port;
        task.block = Some(tcb_block);
        if let SchedPolicy::Deadline { deadline, .. } = spec.policy {
            task.abs_deadline = now.saturating_add(deadline);
        }
        if spec.suspended {
            task.reasons.insert(BlockReasons::SUSPENDED);
            task.suspend_depth = 1;
        }

        debug!(
            "sched: task '{}' created as {} (prio {}, cpu {}, {:?})",
            spec.name, id, spec.priority.0, spec.cpu, spec.mode
        );

        if self.tasks.tcb(id).reasons.is_empty() {
            self.enqueue_ready(id);
        }
        Ok(id)
    }

    /// 删除任务
    ///
    /// 从所有队列摘下，撤销它传出的优先级，唤醒在它端口上等待的任务
    /// (`ObjectDeleted`)，强制释放它持有的资源信号量，按注册的逆序运行退出回调，
    /// 最后释放控制块。软实时任务在释放控制块之前通知宿主调度器。
    pub fn task_delete(&mut self, id: TaskId) -> Result<(), SchedError> {
        let task = self.tasks.get_mut(id).ok_or(SchedError::NoSuchTask)?;
        let cpu = task.cpu;
        let on_cpu = task.on_cpu.take();
        let reasons = task.reasons;
        let port = task.port;
        let blocked_on = task.blocked_on.take();
        let edge = task.prio_passed_to.take();
        let owned = core::mem::take(&mut task.owned);
        let mode = task.mode;
        // 不再接受唤醒
        task.state = RunState::Terminated;

        if self.tasks.tcb(id).is_linked(LinkKind::Ready) {
            self.cpus[cpu].ready.remove(&mut self.tasks, id);
        }
        self.cpus[cpu].timed.remove(&mut self.tasks, id);
        if let Some(obj) = blocked_on {
            if let Some(queue) = self.objects.queue_mut(obj, reasons) {
                queue.remove(&mut self.tasks, id);
            }
        }
        if let Some(owner) = edge {
            self.restore_priority(owner);
        }
        self.cpus[cpu].mode_pending.retain(|&t| t != id);

        let woken = self.unblock_all(port, WaitStatus::ObjectDeleted);
        if let Some(object) = self.objects.remove(port) {
            if let Some(block) = object.block {
                self.heap.free(block);
            }
        }

        for sem in owned {
            warn!("sched: task {} deleted while holding {}", id, sem);
            self.release_resource(sem, id);
        }

        if let Some(c) = on_cpu {
            self.cpus[c].current = None;
            self.resched_cpu(c);
        }

        if mode != ExecMode::Hard {
            self.host.forget(id);
        }

        let Some(task) = self.tasks.remove(id) else {
            return Ok(());
        };
        for hook in task.exit_hooks.into_iter().rev() {
            (hook.func)(id);
            self.heap.free(hook.block);
        }
        if let Some(block) = task.block {
            self.heap.free(block);
        }
        debug!(
            "sched: task '{}' ({}) deleted, {} port waiters woken",
            task.name, id, woken
        );
        Ok(())
    }

    /// 注册退出回调，删除任务时按注册的逆序调用
    pub fn task_atexit(&mut self, id: TaskId, func: ExitFn) -> Result<(), SchedError> {
        if !self.tasks.contains(id) {
            return Err(SchedError::NoSuchTask);
        }
        let block = self
            .heap
            .alloc(Layout::new::<ExitHook>())
            .ok_or(SchedError::NoMemory)?;
        self.tasks
            .tcb_mut(id)
            .exit_hooks
            .push(ExitHook { func, block });
        Ok(())
    }

    /// 挂起任务，可以嵌套
    pub fn suspend(&mut self, id: TaskId) -> Result<(), SchedError> {
        let task = self.tasks.get_mut(id).ok_or(SchedError::NoSuchTask)?;
        task.suspend_depth = task
            .suspend_depth
            .checked_add(1)
            .ok_or(SchedError::Overflow)?;
        if task.suspend_depth == 1 {
            debug!("sched: suspend task {}", id);
            self.block_task(id, BlockReasons::SUSPENDED);
        }
        Ok(())
    }

    /// 恢复任务；嵌套计数归零时清除 SUSPENDED，对未挂起的任务什么也不做
    pub fn resume(&mut self, id: TaskId) -> Result<(), SchedError> {
        let task = self.tasks.get_mut(id).ok_or(SchedError::NoSuchTask)?;
        if task.suspend_depth == 0 {
            return Ok(());
        }
        task.suspend_depth -= 1;
        if task.suspend_depth == 0 {
            task.reasons.remove(BlockReasons::SUSPENDED);
            debug!("sched: resume task {}", id);
            self.wake_task(id);
        }
        Ok(())
    }

    /// 睡眠 `ticks` 个 tick
    pub fn sleep(&mut self, id: TaskId, ticks: Ticks) -> Result<Wait, SchedError> {
        let cpu = self.tasks.get(id).ok_or(SchedError::NoSuchTask)?.cpu;
        let wake = self.cpus[cpu].now().saturating_add(ticks);
        self.sleep_until(id, wake)
    }

    /// 睡眠到绝对时间 `wake`
    ///
    /// 正常醒来的等待结果是 `Granted`，被 [`Scheduler::unblock`] 取消时是 `Cancelled`
    pub fn sleep_until(&mut self, id: TaskId, wake: Ticks) -> Result<Wait, SchedError> {
        let task = self.tasks.get_mut(id).ok_or(SchedError::NoSuchTask)?;
        if wake <= self.cpus[task.cpu].now() {
            return Ok(Wait::Done(WaitStatus::Granted));
        }
        task.wait_status = Some(WaitStatus::Granted);
        self.block_task(id, BlockReasons::DELAYED);
        self.enqueue_timed(id, wake);
        Ok(Wait::Blocked)
    }

    /// 让出 CPU 给同级的其他任务
    pub fn yield_now(&mut self, id: TaskId) -> Result<(), SchedError> {
        let task = self.tasks.get_mut(id).ok_or(SchedError::NoSuchTask)?;
        let cpu = task.cpu;
        if let Some(c) = task.on_cpu {
            task.yielding = true;
            self.resched_cpu(c);
        } else if task.is_linked(LinkKind::Ready) {
            self.cpus[cpu].ready.remove(&mut self.tasks, id);
            self.cpus[cpu]
                .ready
                .enqueue(&mut self.tasks, id, Placement::Back);
        }
        Ok(())
    }

    /// 把任务设为周期任务：第一次释放在 `start`，之后每 `period` 个 tick 一次
    pub fn make_periodic(
        &mut self,
        id: TaskId,
        start: Ticks,
        period: Ticks,
    ) -> Result<(), SchedError> {
        if period == 0 {
            return Err(SchedError::InvalidArgument);
        }
        let task = self.tasks.get_mut(id).ok_or(SchedError::NoSuchTask)?;
        task.periodic = Some(Periodic {
            period,
            next_release: start,
        });
        debug!("sched: task {} periodic from {} every {}", id, start, period);
        Ok(())
    }

    /// 等待下一次释放
    ///
    /// 释放时刻已经过去（超限）时不阻塞，返回 `TimedOut`。
    /// EDF 任务在每次释放时刷新绝对截止期。
    pub fn wait_period(&mut self, id: TaskId) -> Result<Wait, SchedError> {
        let task = self.tasks.get_mut(id).ok_or(SchedError::NoSuchTask)?;
        let now = self.cpus[task.cpu].now();
        let Some(periodic) = task.periodic.as_mut() else {
            return Err(SchedError::InvalidArgument);
        };
        let release = periodic.next_release;
        periodic.next_release = release.saturating_add(periodic.period);

        if let SchedPolicy::Deadline { deadline, .. } = task.policy {
            self.set_abs_deadline(id, release.saturating_add(deadline));
        }

        if release <= now {
            warn!("sched: task {} overran its period (release {}, now {})", id, release, now);
            return Ok(Wait::Done(WaitStatus::TimedOut));
        }
        self.tasks.tcb_mut(id).wait_status = Some(WaitStatus::Granted);
        self.block_task(id, BlockReasons::DELAYED);
        self.enqueue_timed(id, release);
        Ok(Wait::Blocked)
    }

    /// 修改基础优先级，并重新计算继承后的优先级
    pub fn set_base_priority(&mut self, id: TaskId, prio: Priority) -> Result<(), SchedError> {
        let task = self.tasks.get_mut(id).ok_or(SchedError::NoSuchTask)?;
        let old = task.base_priority;
        task.base_priority = prio;
        debug!("sched: task {} base priority {} -> {}", id, old.0, prio.0);
        self.restore_priority(id);
        Ok(())
    }

    /// 把任务迁移到 `cpu`
    ///
    /// 就绪、定时队列中的链接一并搬走并通知目标 CPU；正在运行的任务在它当前
    /// CPU 的下一个调度点搬走。
    pub fn set_cpu(&mut self, id: TaskId, cpu: usize) -> Result<(), SchedError> {
        if cpu >= self.cpus.len() {
            return Err(SchedError::InvalidArgument);
        }
        let task = self.tasks.get(id).ok_or(SchedError::NoSuchTask)?;
        let old = task.cpu;
        if old == cpu {
            return Ok(());
        }
        let on_cpu = task.on_cpu;
        let ready = task.is_linked(LinkKind::Ready);
        let timed = task.is_linked(LinkKind::Timed).then_some(task.wake_time);
        let returning = task.mode == ExecMode::SoftReturning;

        if ready {
            self.cpus[old].ready.remove(&mut self.tasks, id);
        }
        if timed.is_some() {
            self.cpus[old].timed.remove(&mut self.tasks, id);
        }
        if returning {
            self.cpus[old].mode_pending.retain(|&t| t != id);
        }

        self.tasks.tcb_mut(id).cpu = cpu;
        debug!("sched: migrate task {} cpu {} -> {}", id, old, cpu);

        if ready {
            self.enqueue_ready(id);
        }
        if let Some(wake) = timed {
            self.enqueue_timed(id, wake);
        }
        if returning {
            self.cpus[cpu].mode_pending.push(id);
        }
        if let Some(c) = on_cpu {
            self.resched_cpu(c);
        }
        Ok(())
    }

    /// 修改 EDF 截止期；任务在就绪队列中时重新排序
    fn set_abs_deadline(&mut self, id: TaskId, deadline: Ticks) {
        let task = self.tasks.tcb_mut(id);
        let cpu = task.cpu;
        if !task.is_linked(LinkKind::Ready) {
            task.abs_deadline = deadline;
            return;
        }
        self.cpus[cpu].ready.remove(&mut self.tasks, id);
        self.tasks.tcb_mut(id).abs_deadline = deadline;
        self.cpus[cpu]
            .ready
            .enqueue(&mut self.tasks, id, Placement::Back);
    }
}
