//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 任务管理
//!
//! - `tcb`: 任务控制块及其状态
//! - `registry`: 任务表（槽位 + 名字索引）
//! - `lifecycle`: 创建、删除、挂起/恢复、睡眠、周期任务等调度器操作

mod lifecycle;
mod registry;
mod tcb;

pub use registry::TaskTable;
pub use tcb::{
    BlockReasons, ExecMode, ExitFn, Periodic, Priority, RunState, SchedPolicy, Task, TaskId,
    TaskSpec, Ticks,
};

pub(crate) use tcb::ExitHook;
