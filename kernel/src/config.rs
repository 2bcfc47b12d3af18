//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度核心配置
//!
//! 编译期常量由 build.rs 根据 Kernel.toml 生成；运行期通过 [`SchedConfig`]
//! 传给 [`Scheduler::new`](crate::sched::Scheduler::new)，默认值取自编译期常量。

include!(concat!(env!("OUT_DIR"), "/config.rs"));

use crate::task::Ticks;

/// 定时器工作模式
///
/// 对应 RTAI 的 periodic / oneshot 两种定时模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// 固定周期产生 tick
    Periodic,
    /// 每次到期后按下一个最早事件重新编程
    OneShot,
}

/// 运行期调度配置
#[derive(Debug, Clone)]
pub struct SchedConfig {
    /// 参与实时调度的 CPU 数量
    pub nr_cpus: usize,
    /// 任务表容量
    pub max_tasks: usize,
    /// 时间片轮转的默认时间片
    pub rr_quantum: Ticks,
    /// 优先级继承链的最大遍历深度
    pub max_donation_depth: usize,
    /// 每个任务预分配的持有资源容量
    pub max_owned: usize,
    /// 任务名最大长度
    pub name_max: usize,
    /// 定时器模式
    pub timer_mode: TimerMode,
    /// 实时内存池大小（字节）
    pub heap_size: usize,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            nr_cpus: MAX_CPUS,
            max_tasks: MAX_TASKS,
            rr_quantum: RR_QUANTUM_TICKS,
            max_donation_depth: MAX_DONATION_DEPTH,
            max_owned: MAX_OWNED_RESOURCES,
            name_max: TASK_NAME_MAX,
            timer_mode: if TIMER_ONESHOT {
                TimerMode::OneShot
            } else {
                TimerMode::Periodic
            },
            heap_size: RT_HEAP_SIZE,
        }
    }
}

impl SchedConfig {
    /// 设置 CPU 数量（至少 1 个）
    pub fn with_cpus(mut self, nr_cpus: usize) -> Self {
        self.nr_cpus = nr_cpus.max(1);
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks.max(1);
        self
    }

    pub fn with_timer_mode(mut self, mode: TimerMode) -> Self {
        self.timer_mode = mode;
        self
    }

    pub fn with_heap_size(mut self, bytes: usize) -> Self {
        self.heap_size = bytes;
        self
    }

    pub fn with_rr_quantum(mut self, quantum: Ticks) -> Self {
        self.rr_quantum = quantum.max(1);
        self
    }
}
