//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 用户态请求桥
//!
//! 对应 RTAI LXRT 的 `lxrt_handler` / `rt_fun_entry` 表：用户态任务通过一个请求号和
//! 最多若干个 64 位参数调用调度器功能，返回值为非负结果或负错误码（与 Linux 系统调用
//! 约定一致）。
//!
//! 参数约定：
//! - 任务、对象以 `as_raw()` 打包的 u64 传递，[`SELF`] 表示调用者自己
//! - 超时为相对 tick 数，[`FOREVER`] 表示无限等待
//! - 阻塞类请求返回 [`BLOCKED`]，调度后用 `WaitStatus` 请求取结果
//! - `Message` 把消息写回参数槽 0、发送者写回参数槽 1（没有发送者时为 [`NO_TASK`]）

use alloc::collections::BTreeMap;

use bitflags::bitflags;
use log::warn;

use crate::errno::{Errno, SchedError};
use crate::hal::{Hal, HostScheduler};
use crate::mode::ModeChange;
use crate::sched::Scheduler;
use crate::sync::{ObjectId, Wait};
use crate::task::{Priority, TaskId, Ticks};

/// 任务参数：调用者自己
pub const SELF: u64 = u64::MAX;
/// 超时参数：无限等待
pub const FOREVER: u64 = u64::MAX;
/// 输出槽：没有对应的任务
pub const NO_TASK: u64 = u64::MAX;
/// 请求已阻塞
pub const BLOCKED: i64 = 1;

/// 内置请求号
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestCode {
    /// 任务操作
    Yield = 1,
    Sleep = 2,
    Suspend = 3,
    Resume = 4,
    SetPriority = 5,

    /// 信号量
    SemWait = 10,
    SemSignal = 11,

    /// 模式切换
    MakeHard = 20,
    MakeSoft = 21,

    /// 会合消息
    Send = 30,
    Receive = 31,
    Rpc = 32,
    Reply = 33,
    Message = 34,

    /// 取最近一次等待的结果
    WaitStatus = 40,
}

bitflags! {
    /// 请求属性
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RequestFlags: u32 {
        /// 执行前把调用者切到硬实时模式
        const HARD = 1 << 0;
    }
}

/// 请求处理函数：返回非负结果，错误由 `invoke` 转为负错误码
///
/// 参数块同时用作输出，结果放不进非负返回值时写回参数槽
pub type RequestFn<H, G> = fn(&mut Scheduler<H, G>, TaskId, &mut [u64]) -> Result<i64, Errno>;

pub struct RequestEntry<H: Hal, G: HostScheduler> {
    pub name: &'static str,
    pub func: RequestFn<H, G>,
    pub flags: RequestFlags,
}

/// 请求分发表
pub struct RequestTable<H: Hal, G: HostScheduler> {
    entries: BTreeMap<u32, RequestEntry<H, G>>,
}

impl<H: Hal, G: HostScheduler> Default for RequestTable<H, G> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Hal, G: HostScheduler> RequestTable<H, G> {
    /// 空表
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// 注册了所有内置请求的表
    pub fn with_core_requests() -> Self {
        use RequestCode::*;

        let mut table = Self::new();
        let core: [(RequestCode, &'static str, RequestFn<H, G>, RequestFlags); 15] = [
            (Yield, "yield", req_yield, RequestFlags::HARD),
            (Sleep, "sleep", req_sleep, RequestFlags::HARD),
            (Suspend, "suspend", req_suspend, RequestFlags::empty()),
            (Resume, "resume", req_resume, RequestFlags::empty()),
            (SetPriority, "set_priority", req_set_priority, RequestFlags::empty()),
            (SemWait, "sem_wait", req_sem_wait, RequestFlags::HARD),
            (SemSignal, "sem_signal", req_sem_signal, RequestFlags::empty()),
            (MakeHard, "make_hard", req_make_hard, RequestFlags::empty()),
            (MakeSoft, "make_soft", req_make_soft, RequestFlags::empty()),
            (Send, "send", req_send, RequestFlags::HARD),
            (Receive, "receive", req_receive, RequestFlags::HARD),
            (Rpc, "rpc", req_rpc, RequestFlags::HARD),
            (Reply, "reply", req_reply, RequestFlags::empty()),
            (Message, "message", req_message, RequestFlags::empty()),
            (WaitStatus, "wait_status", req_wait_status, RequestFlags::empty()),
        ];
        for (code, name, func, flags) in core {
            // 空表中注册，不会冲突
            let _ = table.register(code as u32, name, func, flags);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: u32) -> Option<&RequestEntry<H, G>> {
        self.entries.get(&code)
    }

    /// 注册请求，请求号已被占用时返回 `NameExists`
    pub fn register(
        &mut self,
        code: u32,
        name: &'static str,
        func: RequestFn<H, G>,
        flags: RequestFlags,
    ) -> Result<(), SchedError> {
        if self.entries.contains_key(&code) {
            warn!("sched: request {} ({}) already registered", code, name);
            return Err(SchedError::NameExists);
        }
        self.entries.insert(code, RequestEntry { name, func, flags });
        Ok(())
    }

    pub fn unregister(&mut self, code: u32) -> Option<RequestEntry<H, G>> {
        self.entries.remove(&code)
    }

    /// 分发一个请求
    ///
    /// 未知请求号返回 `-ENOSYS`，调用者不存在返回 `-ESRCH`。
    /// 请求期间调用者标记为"正在处理请求"，推迟的模式回切在请求结束时完成。
    pub fn invoke(
        &self,
        sched: &mut Scheduler<H, G>,
        code: u32,
        args: &mut [u64],
        caller: TaskId,
    ) -> i64 {
        let Some(entry) = self.entries.get(&code) else {
            warn!("sched: unknown request {} from task {}", code, caller);
            return Errno::FunctionNotImplemented.as_neg_i64();
        };
        if sched.begin_request(caller).is_err() {
            return Errno::NoSuchProcess.as_neg_i64();
        }

        let ret = if entry.flags.contains(RequestFlags::HARD) {
            sched
                .request_hard(caller)
                .map_err(Errno::from)
                .and_then(|_| (entry.func)(sched, caller, args))
        } else {
            (entry.func)(sched, caller, args)
        };

        // 调用者可能已被请求本身删除
        let _ = sched.end_request(caller);

        sched_trace!("sched: request {} ({}) from task {} -> {:?}", code, entry.name, caller, ret);
        match ret {
            Ok(v) => v,
            Err(e) => e.as_neg_i64(),
        }
    }
}

fn arg(args: &[u64], i: usize) -> Result<u64, Errno> {
    args.get(i).copied().ok_or(Errno::InvalidArgument)
}

fn task_arg(args: &[u64], i: usize, caller: TaskId) -> Result<TaskId, Errno> {
    match arg(args, i)? {
        SELF => Ok(caller),
        raw => Ok(TaskId::from_raw(raw)),
    }
}

fn timeout_arg(args: &[u64], i: usize) -> Result<Option<Ticks>, Errno> {
    match args.get(i).copied() {
        None | Some(FOREVER) => Ok(None),
        Some(t) => Ok(Some(t)),
    }
}

fn wait_ret(wait: Wait) -> i64 {
    match wait {
        Wait::Done(status) => status.as_ret(),
        Wait::Blocked => BLOCKED,
    }
}

fn mode_ret(change: ModeChange) -> i64 {
    match change {
        ModeChange::Unchanged | ModeChange::Switched | ModeChange::Cancelled => 0,
        ModeChange::Deferred => BLOCKED,
    }
}

fn req_yield<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    _args: &mut [u64],
) -> Result<i64, Errno> {
    s.yield_now(caller)?;
    Ok(0)
}

fn req_sleep<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    Ok(wait_ret(s.sleep(caller, arg(args, 0)?)?))
}

fn req_suspend<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    s.suspend(task_arg(args, 0, caller)?)?;
    Ok(0)
}

fn req_resume<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    s.resume(task_arg(args, 0, caller)?)?;
    Ok(0)
}

fn req_set_priority<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    let task = task_arg(args, 0, caller)?;
    let prio = u32::try_from(arg(args, 1)?).map_err(|_| Errno::InvalidArgument)?;
    s.set_base_priority(task, Priority(prio))?;
    Ok(0)
}

fn req_sem_wait<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    let sem = ObjectId::from_raw(arg(args, 0)?);
    let wait = match timeout_arg(args, 1)? {
        Some(t) => s.sem_wait_timed(sem, caller, t)?,
        None => s.sem_wait(sem, caller)?,
    };
    Ok(wait_ret(wait))
}

fn req_sem_signal<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    s.sem_signal(ObjectId::from_raw(arg(args, 0)?), caller)?;
    Ok(0)
}

fn req_make_hard<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    _args: &mut [u64],
) -> Result<i64, Errno> {
    Ok(mode_ret(s.request_hard(caller)?))
}

fn req_make_soft<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    _args: &mut [u64],
) -> Result<i64, Errno> {
    Ok(mode_ret(s.request_soft(caller)?))
}

fn req_send<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    let to = TaskId::from_raw(arg(args, 0)?);
    let msg = arg(args, 1)?;
    Ok(wait_ret(s.send(caller, to, msg, timeout_arg(args, 2)?)?))
}

fn req_receive<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    // 发送者参数为 SELF 时接收任意发送者
    let from = match arg(args, 0)? {
        SELF => None,
        raw => Some(TaskId::from_raw(raw)),
    };
    Ok(wait_ret(s.receive(caller, from, timeout_arg(args, 1)?)?))
}

fn req_rpc<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    let to = TaskId::from_raw(arg(args, 0)?);
    let msg = arg(args, 1)?;
    Ok(wait_ret(s.rpc(caller, to, msg, timeout_arg(args, 2)?)?))
}

fn req_reply<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    let client = TaskId::from_raw(arg(args, 0)?);
    s.reply(caller, client, arg(args, 1)?)?;
    Ok(0)
}

fn req_message<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    args: &mut [u64],
) -> Result<i64, Errno> {
    let (msg, from) = s.message(caller)?;
    let out = args.get_mut(..2).ok_or(Errno::InvalidArgument)?;
    out[0] = msg;
    out[1] = from.map_or(NO_TASK, TaskId::as_raw);
    Ok(0)
}

fn req_wait_status<H: Hal, G: HostScheduler>(
    s: &mut Scheduler<H, G>,
    caller: TaskId,
    _args: &mut [u64],
) -> Result<i64, Errno> {
    s.take_wait_status(caller)
        .map(|status| status.as_ret())
        .ok_or(Errno::TryAgain)
}
