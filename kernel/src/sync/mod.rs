//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 同步机制
//!
//! - `object`: 同步对象表（信号量、会合端口）
//! - `wait`: 阻塞队列与等待/唤醒原语
//! - `inherit`: 优先级继承
//! - `semaphore`: 计数、二值、资源信号量
//! - `msg`: 会合消息 (send / receive / rpc / reply)

mod inherit;
pub mod msg;
pub mod object;
pub mod semaphore;
pub mod wait;

pub use msg::Port;
pub use object::{ObjectId, ObjectKind, ObjectTable, SyncObject};
pub use semaphore::{SemKind, Semaphore};
pub use wait::{Wait, WaitOrder, WaitQueue};
