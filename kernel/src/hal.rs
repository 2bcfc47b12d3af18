//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 外部协作者接口
//!
//! 调度核心本身不碰硬件，也不做上下文切换，这些都通过下面三个 trait 交给外部：
//! - [`Hal`]: 中断控制器、定时器、IPI、CPU 标识、上下文切换
//! - [`HostScheduler`]: 宿主（通用）调度器，软实时模式下任务归它管
//! - [`KernelHeap`]: 控制块等记录的内存分配器，默认实现 [`RegionHeap`]

use alloc::boxed::Box;
use alloc::vec;
use core::alloc::Layout;
use core::ptr::NonNull;

use linked_list_allocator::Heap;

use crate::errno::Errno;
use crate::task::{TaskId, Ticks};

/// 硬件抽象层
///
/// 方法都取 `&self`，实现方自己处理内部可变性（中断控制器寄存器本来就是共享的）
pub trait Hal {
    /// 当前 CPU 编号，对应 Linux 的 `smp_processor_id()`
    fn cpu_id(&self) -> usize;

    /// 关本地中断并返回之前的状态，对应 `local_irq_save`
    fn irq_save(&self) -> usize;

    /// 恢复本地中断状态，对应 `local_irq_restore`
    fn irq_restore(&self, flags: usize);

    /// 注册定时器中断，中断处理函数里应该调用 `tick(now)`
    fn attach_timer_irq(&self, irq: u32) -> Result<(), Errno>;

    fn detach_timer_irq(&self, irq: u32);

    /// 单次模式下设置 `cpu` 的下一次定时器到期时间
    fn program_timer(&self, cpu: usize, expiry: Ticks);

    /// 向 `cpu` 发送重新调度 IPI，对应 `smp_send_reschedule`
    fn send_reschedule_ipi(&self, cpu: usize);

    /// 在 `cpu` 上从 `prev` 切换到 `next`（`None` 表示空闲）
    fn switch_to(&self, cpu: usize, prev: Option<TaskId>, next: Option<TaskId>);
}

/// 宿主调度器
///
/// 硬实时任务从宿主那里"偷"过来，切回软实时时再"还"回去
pub trait HostScheduler {
    /// 从宿主调度器摘下任务（之后宿主不会再调度它）
    fn steal(&mut self, task: TaskId, cpu: usize);

    /// 把任务交还宿主调度器
    fn give_back(&mut self, task: TaskId, cpu: usize);

    /// 唤醒一个在宿主调度器下等待的软实时任务
    fn wake(&mut self, task: TaskId);

    /// 任务在宿主侧是否有待处理的信号
    fn signal_pending(&self, task: TaskId) -> bool;

    /// 软实时任务已被删除，宿主丢弃它持有的句柄
    fn forget(&mut self, task: TaskId);
}

/// 从实时内存池分配的一块内存
#[derive(Debug)]
pub struct HeapBlock {
    ptr: NonNull<u8>,
    layout: Layout,
}

// 块只在持有调度器锁时被访问
unsafe impl Send for HeapBlock {}

impl HeapBlock {
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

/// 实时内存分配器
pub trait KernelHeap {
    fn alloc(&mut self, layout: Layout) -> Option<HeapBlock>;

    fn free(&mut self, block: HeapBlock);

    /// 已分配字节数
    fn used(&self) -> usize;
}

/// 空闲块头部的大小，小于它的区域无法初始化
const MIN_REGION: usize = 2 * core::mem::size_of::<usize>();

/// 基于 `linked_list_allocator` 的默认内存池
///
/// 对应 RTAI 的实时内存池：启动时一次性向系统要一块内存，之后在其中 first-fit 分配
pub struct RegionHeap {
    heap: Heap,
    _region: Box<[u8]>,
}

unsafe impl Send for RegionHeap {}

impl RegionHeap {
    pub fn new(size: usize) -> Self {
        let mut region = vec![0u8; size].into_boxed_slice();
        let mut heap = Heap::empty();
        if size >= MIN_REGION {
            // SAFETY: region 和 heap 一起存放，生命周期一致，且不会被其他代码访问
            unsafe { heap.init(region.as_mut_ptr(), size) };
        }
        Self {
            heap,
            _region: region,
        }
    }

    pub fn size(&self) -> usize {
        self.heap.size()
    }
}

impl KernelHeap for RegionHeap {
    fn alloc(&mut self, layout: Layout) -> Option<HeapBlock> {
        self.heap
            .allocate_first_fit(layout)
            .ok()
            .map(|ptr| HeapBlock { ptr, layout })
    }

    fn free(&mut self, block: HeapBlock) {
        // SAFETY: 块由本内存池分配，且只释放一次（HeapBlock 不可复制）
        unsafe { self.heap.deallocate(block.ptr, block.layout) };
    }

    fn used(&self) -> usize {
        self.heap.used()
    }
}
