//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 硬实时 / 软实时模式切换
//!
//! 对应 RTAI LXRT 的 `make_hard_real_time` / `make_soft_real_time`
//! （"偷"任务 `steal_from_linux` 与"还"任务 `give_back_to_linux`）。
//!
//! 三个状态：
//! - Hard: 实时调度器独占调度
//! - Soft: 交给宿主调度器，TCB 仍然存在，仍参与阻塞与优先级继承，阻塞原因带 HOST
//! - SoftReturning: 正在处理用户态请求且宿主有待处理信号，回到 Hard 推迟到请求结束或下一个调度点
//!
//! 任务在宿主调度器下可运行时，绝不会同时挂在实时就绪队列上。

use log::debug;

use crate::errno::SchedError;
use crate::hal::{Hal, HostScheduler};
use crate::list::LinkKind;
use crate::sched::Scheduler;
use crate::task::{BlockReasons, ExecMode, RunState, TaskId};

/// 模式请求的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
    /// 已经处于目标模式，什么也没做
    Unchanged,
    /// 已完成切换
    Switched,
    /// 推迟到安全点完成（进入 SoftReturning）
    Deferred,
    /// 取消了尚未完成的回切
    Cancelled,
}

impl<H: Hal, G: HostScheduler> Scheduler<H, G> {
    /// 请求进入硬实时模式
    pub fn request_hard(&mut self, id: TaskId) -> Result<ModeChange, SchedError> {
        let task = self.tasks.get(id).ok_or(SchedError::NoSuchTask)?;
        match task.mode {
            ExecMode::Hard | ExecMode::SoftReturning => Ok(ModeChange::Unchanged),
            ExecMode::Soft => {
                if task.in_request && self.host.signal_pending(id) {
                    let cpu = task.cpu;
                    self.tasks.tcb_mut(id).mode = ExecMode::SoftReturning;
                    self.cpus[cpu].mode_pending.push(id);
                    debug!("mode: task {} return to hard deferred", id);
                    return Ok(ModeChange::Deferred);
                }
                self.acquire_hard(id);
                Ok(ModeChange::Switched)
            }
        }
    }

    /// 请求进入软实时模式
    pub fn request_soft(&mut self, id: TaskId) -> Result<ModeChange, SchedError> {
        let task = self.tasks.get(id).ok_or(SchedError::NoSuchTask)?;
        match task.mode {
            ExecMode::Soft => Ok(ModeChange::Unchanged),
            ExecMode::SoftReturning => {
                let cpu = task.cpu;
                self.tasks.tcb_mut(id).mode = ExecMode::Soft;
                self.cpus[cpu].mode_pending.retain(|&t| t != id);
                debug!("mode: task {} pending return to hard cancelled", id);
                Ok(ModeChange::Cancelled)
            }
            ExecMode::Hard => {
                self.release_hard(id);
                Ok(ModeChange::Switched)
            }
        }
    }

    /// 标记任务开始处理用户态请求
    pub fn begin_request(&mut self, id: TaskId) -> Result<(), SchedError> {
        self.tasks
            .get_mut(id)
            .ok_or(SchedError::NoSuchTask)?
            .in_request = true;
        Ok(())
    }

    /// 用户态请求处理完毕；推迟的回切在这里完成
    pub fn end_request(&mut self, id: TaskId) -> Result<(), SchedError> {
        let task = self.tasks.get_mut(id).ok_or(SchedError::NoSuchTask)?;
        task.in_request = false;
        if task.mode == ExecMode::SoftReturning {
            let cpu = task.cpu;
            self.cpus[cpu].mode_pending.retain(|&t| t != id);
            self.acquire_hard(id);
        }
        Ok(())
    }

    /// 调度点：完成本 CPU 上所有推迟的回切
    pub(crate) fn complete_mode_transitions(&mut self, cpu: usize) {
        if self.cpus[cpu].mode_pending.is_empty() {
            return;
        }
        let mut pending = core::mem::take(&mut self.cpus[cpu].mode_pending);
        for &id in pending.iter() {
            if self
                .tasks
                .get(id)
                .map_or(false, |t| t.mode == ExecMode::SoftReturning)
            {
                self.acquire_hard(id);
            }
        }
        // 保留容量，避免下次分配
        pending.clear();
        self.cpus[cpu].mode_pending = pending;
    }

    /// 从宿主调度器偷回任务并放入实时就绪队列
    fn acquire_hard(&mut self, id: TaskId) {
        let task = self.tasks.tcb_mut(id);
        let cpu = task.cpu;
        task.mode = ExecMode::Hard;
        task.reasons.remove(BlockReasons::HOST);
        self.host.steal(id, cpu);
        debug!("mode: task {} -> hard on cpu {}", id, cpu);
        self.wake_task(id);
    }

    /// 把任务交还宿主调度器
    fn release_hard(&mut self, id: TaskId) {
        let task = self.tasks.tcb_mut(id);
        let cpu = task.cpu;
        let was_runnable = task.reasons.is_empty();
        let on_cpu = task.on_cpu;
        task.mode = ExecMode::Soft;
        task.reasons.insert(BlockReasons::HOST);
        if was_runnable {
            task.state = RunState::Blocked;
        }

        if task.is_linked(LinkKind::Ready) {
            self.cpus[cpu].ready.remove(&mut self.tasks, id);
        }
        if let Some(c) = on_cpu {
            self.resched_cpu(c);
        }
        self.host.give_back(id, cpu);
        debug!("mode: task {} -> soft", id);
    }
}
