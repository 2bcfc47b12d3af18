//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 错误码与等待结果
//!
//! 对应 Linux 的 `include/uapi/asm-generic/errno-base.h`，只保留调度核心用得到的部分。
//!
//! 三类结果：
//! - [`Errno`]: 请求桥返回给用户态的负错误码
//! - [`SchedError`]: 创建/注册类接口的可恢复失败（如内存不足）
//! - [`WaitStatus`]: 阻塞原语的正常结果（授予、超时、取消、对象删除）

use core::fmt;

/// 错误码
///
/// 数值与 Linux 保持一致
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Device or resource busy (EBUSY, 16)
    DeviceOrResourceBusy = 16,

    /// File exists (EEXIST, 17)
    FileExists = 17,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Function not implemented (ENOSYS, 38)
    FunctionNotImplemented = 38,

    /// Identifier removed (EIDRM, 43)
    IdentifierRemoved = 43,

    /// Connection timed out (ETIMEDOUT, 110)
    TimedOut = 110,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于请求返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 负错误码（i64，请求桥的返回类型）
    #[inline]
    pub const fn as_neg_i64(self) -> i64 {
        -(self as i64)
    }
}

/// 常用的错误代码常量
pub mod constants {
    use super::Errno;

    pub const EPERM: i32 = Errno::OperationNotPermitted.as_i32();
    pub const ESRCH: i32 = Errno::NoSuchProcess.as_i32();
    pub const EINTR: i32 = Errno::InterruptedSystemCall.as_i32();
    pub const EAGAIN: i32 = Errno::TryAgain.as_i32();
    pub const ENOMEM: i32 = Errno::OutOfMemory.as_i32();
    pub const EBUSY: i32 = Errno::DeviceOrResourceBusy.as_i32();
    pub const EEXIST: i32 = Errno::FileExists.as_i32();
    pub const EINVAL: i32 = Errno::InvalidArgument.as_i32();
    pub const ENOSYS: i32 = Errno::FunctionNotImplemented.as_i32();
    pub const EIDRM: i32 = Errno::IdentifierRemoved.as_i32();
    pub const ETIMEDOUT: i32 = Errno::TimedOut.as_i32();
}

/// 创建/注册/参数检查类接口的失败原因
///
/// 内存不足时调用方保证已完整回滚，不会留下半注册的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// 控制块或端口分配失败
    NoMemory,
    /// 任务名已被占用
    NameExists,
    /// 任务名为空或过长
    InvalidName,
    /// 任务表或对象表已满
    TableFull,
    /// 任务不存在（或已删除）
    NoSuchTask,
    /// 同步对象不存在（或已删除）
    NoSuchObject,
    /// 参数非法（CPU 号越界、周期为 0 等）
    InvalidArgument,
    /// 释放了不属于自己的资源
    NotOwner,
    /// 任务并未处于可取消的等待中
    NotWaiting,
    /// 对象类型与操作不匹配
    WrongKind,
    /// 非阻塞获取失败
    WouldBlock,
    /// 计数溢出或持有资源过多
    Overflow,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedError::NoMemory => "out of real-time heap memory",
            SchedError::NameExists => "task name already registered",
            SchedError::InvalidName => "invalid task name",
            SchedError::TableFull => "table full",
            SchedError::NoSuchTask => "no such task",
            SchedError::NoSuchObject => "no such object",
            SchedError::InvalidArgument => "invalid argument",
            SchedError::NotOwner => "not the owner",
            SchedError::NotWaiting => "task is not waiting",
            SchedError::WrongKind => "wrong object kind",
            SchedError::WouldBlock => "operation would block",
            SchedError::Overflow => "counter overflow",
        };
        f.write_str(msg)
    }
}

impl From<SchedError> for Errno {
    fn from(err: SchedError) -> Self {
        match err {
            SchedError::NoMemory => Errno::OutOfMemory,
            SchedError::NameExists => Errno::FileExists,
            SchedError::InvalidName | SchedError::InvalidArgument | SchedError::WrongKind => {
                Errno::InvalidArgument
            }
            SchedError::TableFull => Errno::TryAgain,
            SchedError::NoSuchTask => Errno::NoSuchProcess,
            SchedError::NoSuchObject => Errno::IdentifierRemoved,
            SchedError::NotOwner => Errno::OperationNotPermitted,
            SchedError::NotWaiting => Errno::InvalidArgument,
            SchedError::WouldBlock => Errno::TryAgain,
            SchedError::Overflow => Errno::DeviceOrResourceBusy,
        }
    }
}

/// 阻塞原语的返回结果
///
/// `Cancelled` 和 `ObjectDeleted` 是终态，调用方不应重试同一等待
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// 正常获得资源/消息
    Granted,
    /// 等待超时
    TimedOut,
    /// 被显式取消（unblock）
    Cancelled,
    /// 等待期间对象被删除
    ObjectDeleted,
}

impl WaitStatus {
    pub fn is_granted(self) -> bool {
        self == WaitStatus::Granted
    }

    /// 转换为请求桥的返回值：授予为 0，其余为负错误码
    pub fn as_ret(self) -> i64 {
        match self {
            WaitStatus::Granted => 0,
            WaitStatus::TimedOut => Errno::TimedOut.as_neg_i64(),
            WaitStatus::Cancelled => Errno::InterruptedSystemCall.as_neg_i64(),
            WaitStatus::ObjectDeleted => Errno::IdentifierRemoved.as_neg_i64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_values() {
        assert_eq!(Errno::OperationNotPermitted.as_i32(), 1);
        assert_eq!(Errno::NoSuchProcess.as_i32(), 3);
        assert_eq!(Errno::InterruptedSystemCall.as_i32(), 4);
        assert_eq!(Errno::OutOfMemory.as_i32(), 12);
        assert_eq!(Errno::InvalidArgument.as_i32(), 22);
        assert_eq!(Errno::FunctionNotImplemented.as_i32(), 38);
        assert_eq!(Errno::IdentifierRemoved.as_i32(), 43);
        assert_eq!(Errno::TimedOut.as_i32(), 110);
    }

    #[test]
    fn test_errno_negative() {
        assert_eq!(Errno::OutOfMemory.as_neg_i32(), -12);
        assert_eq!(Errno::FunctionNotImplemented.as_neg_i64(), -38);
    }

    #[test]
    fn test_errno_constants() {
        use constants::*;
        assert_eq!(ESRCH, 3);
        assert_eq!(EEXIST, 17);
        assert_eq!(ENOSYS, 38);
        assert_eq!(ETIMEDOUT, 110);
    }

    #[test]
    fn test_sched_error_mapping() {
        assert_eq!(Errno::from(SchedError::NoMemory), Errno::OutOfMemory);
        assert_eq!(Errno::from(SchedError::NameExists), Errno::FileExists);
        assert_eq!(Errno::from(SchedError::NoSuchTask), Errno::NoSuchProcess);
    }

    #[test]
    fn test_wait_status_ret() {
        assert_eq!(WaitStatus::Granted.as_ret(), 0);
        assert_eq!(WaitStatus::TimedOut.as_ret(), -110);
        assert_eq!(WaitStatus::Cancelled.as_ret(), -4);
        assert_eq!(WaitStatus::ObjectDeleted.as_ret(), -43);
    }
}
