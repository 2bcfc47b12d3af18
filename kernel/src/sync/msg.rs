//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 会合消息 (rendezvous)
//!
//! 对应 RTAI 的 `rt_send` / `rt_receive` / `rt_rpc` / `rt_return`。
//! 每个任务有一个端口，消息是一个 64 位值（负载的具体格式由上层决定）。
//!
//! - send: 接收者正在 receive 则直接交付，否则挂到接收者端口的发送者队列 (SEND)
//! - rpc: 同上，但交付后还要等待回复，挂到端口的回复队列 (RETURN)
//! - receive: 从发送者队列取一个（任意发送者或指定发送者），没有就阻塞 (RECEIVE)
//! - reply: 把回复交给在回复队列中等待的 rpc 调用者
//!
//! 发送者和 rpc 调用者都向接收者传递优先级。

use log::debug;

use crate::errno::{SchedError, WaitStatus};
use crate::hal::{Hal, HostScheduler};
use crate::sched::Scheduler;
use crate::task::{BlockReasons, TaskId, Ticks};

use super::object::ObjectId;
use super::wait::{Wait, WaitOrder, WaitQueue};

/// 任务的会合端口
pub struct Port {
    pub(crate) owner: TaskId,
    /// 等待接收者取消息的 send / rpc 调用者
    pub(crate) senders: WaitQueue,
    /// 消息已被接收、等待回复的 rpc 调用者
    pub(crate) returns: WaitQueue,
}

impl Port {
    pub fn new(owner: TaskId) -> Self {
        Self {
            owner,
            senders: WaitQueue::new(WaitOrder::Priority),
            returns: WaitQueue::new(WaitOrder::Priority),
        }
    }

    pub fn owner(&self) -> TaskId {
        self.owner
    }
}

impl<H: Hal, G: HostScheduler> Scheduler<H, G> {
    /// 发送消息，`timeout` 为相对 tick 数（`Some(0)` 表示不等待）
    pub fn send(
        &mut self,
        from: TaskId,
        to: TaskId,
        msg: u64,
        timeout: Option<Ticks>,
    ) -> Result<Wait, SchedError> {
        let (port, deadline) = self.rendezvous_target(from, to, timeout)?;

        if self.deliver_if_receiving(from, to, msg) {
            return Ok(Wait::Done(WaitStatus::Granted));
        }
        if let Some(d) = deadline {
            if d <= self.now(self.tasks.tcb(from).cpu) {
                return Ok(Wait::Done(WaitStatus::TimedOut));
            }
        }

        self.tasks.tcb_mut(from).msg = msg;
        self.block_on(port, from, BlockReasons::SEND, deadline)?;
        Ok(Wait::Blocked)
    }

    /// 远程过程调用：发送消息并等待 `reply`，回复通过 [`Scheduler::message`] 读取
    pub fn rpc(
        &mut self,
        from: TaskId,
        to: TaskId,
        msg: u64,
        timeout: Option<Ticks>,
    ) -> Result<Wait, SchedError> {
        let (port, deadline) = self.rendezvous_target(from, to, timeout)?;

        if self.deliver_if_receiving(from, to, msg) {
            self.block_on(port, from, BlockReasons::RETURN, deadline)?;
            return Ok(Wait::Blocked);
        }
        if let Some(d) = deadline {
            if d <= self.now(self.tasks.tcb(from).cpu) {
                return Ok(Wait::Done(WaitStatus::TimedOut));
            }
        }

        self.tasks.tcb_mut(from).msg = msg;
        self.block_on(port, from, BlockReasons::RPC, deadline)?;
        Ok(Wait::Blocked)
    }

    /// 接收消息；`from` 为 `None` 时接收任意发送者
    ///
    /// 取到的消息和发送者通过 [`Scheduler::message`] 读取
    pub fn receive(
        &mut self,
        id: TaskId,
        from: Option<TaskId>,
        timeout: Option<Ticks>,
    ) -> Result<Wait, SchedError> {
        let task = self.tasks.get(id).ok_or(SchedError::NoSuchTask)?;
        let port = task.port;
        let now = self.cpus[task.cpu].now();

        let sender = self.objects.port(port).and_then(|p| {
            p.senders
                .iter(&self.tasks)
                .find(|&s| from.map_or(true, |f| f == s))
        });

        if let Some(sender) = sender {
            let (msg, reasons) = {
                let s = self.tasks.tcb(sender);
                (s.msg, s.reasons)
            };
            let task = self.tasks.tcb_mut(id);
            task.msg = msg;
            task.msg_from = Some(sender);

            if reasons.contains(BlockReasons::RPC) {
                self.move_to_returns(port, sender);
            } else {
                self.complete_wait(sender, WaitStatus::Granted);
            }
            sched_trace!("sched: task {} received {:#x} from {}", id, msg, sender);
            return Ok(Wait::Done(WaitStatus::Granted));
        }

        let deadline = timeout.map(|t| now.saturating_add(t));
        if let Some(d) = deadline {
            if d <= now {
                return Ok(Wait::Done(WaitStatus::TimedOut));
            }
        }

        {
            let task = self.tasks.tcb_mut(id);
            task.recv_from = from;
            task.wait_status = None;
        }
        self.block_task(id, BlockReasons::RECEIVE);
        if let Some(d) = deadline {
            self.block_task(id, BlockReasons::DELAYED);
            self.enqueue_timed(id, d);
        }
        Ok(Wait::Blocked)
    }

    /// 回复 rpc 调用者
    pub fn reply(&mut self, server: TaskId, client: TaskId, msg: u64) -> Result<(), SchedError> {
        let port = self.tasks.get(server).ok_or(SchedError::NoSuchTask)?.port;
        let c = self.tasks.get_mut(client).ok_or(SchedError::NoSuchTask)?;
        if !c.reasons.contains(BlockReasons::RETURN) || c.blocked_on != Some(port) {
            return Err(SchedError::NotWaiting);
        }
        c.msg = msg;
        c.msg_from = Some(server);
        self.complete_wait(client, WaitStatus::Granted);
        Ok(())
    }

    /// 最近一次收到的消息（rpc 调用者为收到的回复）及其发送者
    pub fn message(&self, id: TaskId) -> Result<(u64, Option<TaskId>), SchedError> {
        let task = self.tasks.get(id).ok_or(SchedError::NoSuchTask)?;
        Ok((task.msg, task.msg_from))
    }

    fn rendezvous_target(
        &self,
        from: TaskId,
        to: TaskId,
        timeout: Option<Ticks>,
    ) -> Result<(ObjectId, Option<Ticks>), SchedError> {
        if from == to {
            return Err(SchedError::InvalidArgument);
        }
        let sender = self.tasks.get(from).ok_or(SchedError::NoSuchTask)?;
        let target = self.tasks.get(to).ok_or(SchedError::NoSuchTask)?;
        let now = self.cpus[sender.cpu].now();
        Ok((target.port, timeout.map(|t| now.saturating_add(t))))
    }

    /// 接收者正在等待（且接受这个发送者）时直接交付
    fn deliver_if_receiving(&mut self, from: TaskId, to: TaskId, msg: u64) -> bool {
        let target = self.tasks.tcb_mut(to);
        if !target.reasons.contains(BlockReasons::RECEIVE)
            || target.recv_from.map_or(false, |f| f != from)
        {
            return false;
        }
        target.msg = msg;
        target.msg_from = Some(from);
        debug!("sched: deliver {:#x} from task {} to task {}", msg, from, to);
        self.complete_wait(to, WaitStatus::Granted);
        true
    }

    /// rpc 调用者的消息已被接收，转入回复队列继续等待
    fn move_to_returns(&mut self, port: ObjectId, client: TaskId) {
        let Some(p) = self.objects.port_mut(port) else {
            return;
        };
        p.senders.remove(&mut self.tasks, client);
        let task = self.tasks.tcb_mut(client);
        task.reasons.remove(BlockReasons::RPC);
        task.reasons.insert(BlockReasons::RETURN);
        p.returns.insert(&mut self.tasks, client);
    }
}
