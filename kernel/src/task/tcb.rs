//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 任务控制块 (TCB)
//!
//! 对应 Linux 的 `struct task_struct` 中与调度相关的部分，以及 RTAI 的 `RT_TASK`。
//!
//! 状态由两部分组成：
//! - [`RunState`]: 运行状态标签（就绪/运行/阻塞/终止）
//! - [`BlockReasons`]: 阻塞原因位集合，可以同时有多个原因；为空时任务才是就绪的

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use bitflags::bitflags;

use crate::arena::Key;
use crate::errno::WaitStatus;
use crate::hal::HeapBlock;
use crate::list::{LinkKind, ListLink};
use crate::sync::ObjectId;

/// 时间单位：定时器 tick
pub type Ticks = u64;

/// 任务标识（槽位索引 + 代号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) Key);

impl TaskId {
    pub const fn from_parts(index: u32, gen: u32) -> Self {
        TaskId(Key { index, gen })
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0.index as usize
    }

    pub const fn as_raw(self) -> u64 {
        self.0.as_raw()
    }

    pub const fn from_raw(raw: u64) -> Self {
        TaskId(Key::from_raw(raw))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.index, self.0.gen)
    }
}

/// 优先级，数值越大越优先
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(pub u32);

impl Priority {
    pub const LOWEST: Priority = Priority(0);
    pub const HIGHEST: Priority = Priority(u32::MAX);

    /// `self` 是否比 `other` 更优先
    #[inline]
    pub fn outranks(self, other: Priority) -> bool {
        self > other
    }
}

/// 调度策略
///
/// 对应 Linux 的 SCHED_FIFO / SCHED_RR / SCHED_DEADLINE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    /// 同优先级先来先服务
    Fifo,
    /// 时间片轮转，时间片用完后排到同优先级队尾
    RoundRobin { quantum: Ticks },
    /// 最早截止期优先；`deadline` 是相对每次释放时刻的截止期
    Deadline { period: Ticks, deadline: Ticks },
}

impl SchedPolicy {
    #[inline]
    pub fn is_deadline(&self) -> bool {
        matches!(self, SchedPolicy::Deadline { .. })
    }
}

/// 执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// 由实时调度器独占调度
    Hard,
    /// 当前在宿主调度器下运行，下一个调度点要回到硬实时
    SoftReturning,
    /// 交给宿主调度器
    Soft,
}

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Ready,
    Running,
    Blocked,
    Terminated,
}

bitflags! {
    /// 阻塞原因
    ///
    /// 对应 RTAI 的 RT_SCHED_SUSPENDED / DELAYED / SEMAPHORE / SEND / RECEIVE / RPC / RETURN
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockReasons: u32 {
        const SUSPENDED = 1 << 0;
        const DELAYED   = 1 << 1;
        const SEMAPHORE = 1 << 2;
        const SEND      = 1 << 3;
        const RECEIVE   = 1 << 4;
        const RPC       = 1 << 5;
        const RETURN    = 1 << 6;
        /// 任务归宿主调度器（软实时就绪）
        const HOST      = 1 << 7;

        /// 所有"等待某个对象"的原因
        const WAIT = Self::SEMAPHORE.bits()
            | Self::SEND.bits()
            | Self::RECEIVE.bits()
            | Self::RPC.bits()
            | Self::RETURN.bits();
    }
}

/// 周期任务参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Periodic {
    pub period: Ticks,
    pub next_release: Ticks,
}

/// 退出回调
pub type ExitFn = Box<dyn FnOnce(TaskId) + Send>;

pub(crate) struct ExitHook {
    pub(crate) func: ExitFn,
    pub(crate) block: HeapBlock,
}

/// 创建任务的参数
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub priority: Priority,
    pub policy: SchedPolicy,
    pub cpu: usize,
    pub mode: ExecMode,
    /// 创建后处于挂起状态，需要 `resume` 才会运行
    pub suspended: bool,
}

impl TaskSpec {
    pub fn new(name: &str, priority: u32) -> Self {
        Self {
            name: String::from(name),
            priority: Priority(priority),
            policy: SchedPolicy::Fifo,
            cpu: 0,
            mode: ExecMode::Hard,
            suspended: false,
        }
    }

    pub fn policy(mut self, policy: SchedPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cpu(mut self, cpu: usize) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn mode(mut self, mode: ExecMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn suspended(mut self) -> Self {
        self.suspended = true;
        self
    }
}

/// 任务控制块
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) name: String,

    /// 当前（可能被继承抬高的）优先级
    pub(crate) priority: Priority,
    pub(crate) base_priority: Priority,
    pub(crate) policy: SchedPolicy,
    pub(crate) mode: ExecMode,

    pub(crate) state: RunState,
    pub(crate) reasons: BlockReasons,

    /// 所属 CPU（就绪队列和定时队列都在这个 CPU 上）
    pub(crate) cpu: usize,
    /// 正在哪个 CPU 上运行
    pub(crate) on_cpu: Option<usize>,

    /// 就绪/定时/阻塞三个链接节点，按 [`LinkKind`] 索引
    pub(crate) links: [ListLink; 3],

    pub(crate) wake_time: Ticks,
    /// EDF 任务的绝对截止期
    pub(crate) abs_deadline: Ticks,
    pub(crate) periodic: Option<Periodic>,
    /// 时间片剩余
    pub(crate) rr_remaining: Ticks,
    pub(crate) yielding: bool,

    /// 正在等待的同步对象
    pub(crate) blocked_on: Option<ObjectId>,
    /// 本任务最后一次把优先级传给了谁（继承链的前向边）
    pub(crate) prio_passed_to: Option<TaskId>,
    /// 持有的资源信号量
    pub(crate) owned: Vec<ObjectId>,
    pub(crate) wait_status: Option<WaitStatus>,
    pub(crate) suspend_depth: u32,

    /// 正在处理用户态请求
    pub(crate) in_request: bool,

    /// 本任务的会合端口
    pub(crate) port: ObjectId,
    pub(crate) msg: u64,
    pub(crate) msg_from: Option<TaskId>,
    pub(crate) recv_from: Option<TaskId>,

    pub(crate) exit_hooks: Vec<ExitHook>,
    pub(crate) block: Option<HeapBlock>,
}

impl Task {
    pub(crate) fn new(id: TaskId, spec: &TaskSpec, port: ObjectId, max_owned: usize) -> Self {
        let reasons = if spec.mode == ExecMode::Hard {
            BlockReasons::empty()
        } else {
            BlockReasons::HOST
        };
        Self {
            id,
            name: spec.name.clone(),
            priority: spec.priority,
            base_priority: spec.priority,
            policy: spec.policy,
            mode: if spec.mode == ExecMode::Hard {
                ExecMode::Hard
            } else {
                ExecMode::Soft
            },
            state: RunState::Blocked,
            reasons,
            cpu: spec.cpu,
            on_cpu: None,
            links: [ListLink::new(); 3],
            wake_time: 0,
            abs_deadline: 0,
            periodic: None,
            rr_remaining: 0,
            yielding: false,
            blocked_on: None,
            prio_passed_to: None,
            owned: Vec::with_capacity(max_owned),
            wait_status: None,
            suspend_depth: 0,
            in_request: false,
            port,
            msg: 0,
            msg_from: None,
            recv_from: None,
            exit_hooks: Vec::new(),
            block: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn base_priority(&self) -> Priority {
        self.base_priority
    }

    pub fn policy(&self) -> SchedPolicy {
        self.policy
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn reasons(&self) -> BlockReasons {
        self.reasons
    }

    pub fn cpu(&self) -> usize {
        self.cpu
    }

    pub fn wake_time(&self) -> Ticks {
        self.wake_time
    }

    pub fn abs_deadline(&self) -> Ticks {
        self.abs_deadline
    }

    pub fn prio_passed_to(&self) -> Option<TaskId> {
        self.prio_passed_to
    }

    pub fn blocked_on(&self) -> Option<ObjectId> {
        self.blocked_on
    }

    pub fn port(&self) -> ObjectId {
        self.port
    }

    pub fn owned(&self) -> &[ObjectId] {
        &self.owned
    }

    /// 是否可以被本调度器运行（没有任何阻塞原因）
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.reasons.is_empty() && self.state != RunState::Terminated
    }

    #[inline]
    pub fn is_linked(&self, kind: LinkKind) -> bool {
        self.links[kind as usize].is_linked()
    }

    /// 时间片轮转的时间片长度
    pub(crate) fn quantum(&self) -> Option<Ticks> {
        match self.policy {
            SchedPolicy::RoundRobin { quantum } => Some(quantum),
            _ => None,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("base_priority", &self.base_priority)
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("reasons", &self.reasons)
            .field("cpu", &self.cpu)
            .finish()
    }
}
