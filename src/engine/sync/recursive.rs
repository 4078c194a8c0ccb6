//! ### English
//! Recursive (reentrant) mutex and the two global critical sections that rely on it.
//!
//! Field mutation and change-notification dispatch re-enter themselves legitimately: a
//! notification callback may write a field, which notifies again on the same thread.
//!
//! ### 中文
//! 递归（可重入）互斥锁，以及依赖它的两个全局临界区。
//!
//! 字段修改与变更通知分发会合法地重入：通知回调可能写入字段，从而在同一线程上再次触发通知。

use std::cell::Cell;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// ### English
/// Mutex that the owning thread may lock repeatedly. The lock is released when the
/// outermost guard is dropped.
///
/// ### 中文
/// 持有线程可重复加锁的互斥锁。最外层 guard 释放时才真正解锁。
pub struct RecursiveMutex {
    /// ### English
    /// Nesting depth of the owning thread; only touched while the lock is held.
    ///
    /// ### 中文
    /// 持有线程的嵌套深度；仅在持锁期间访问。
    depth: ReentrantMutex<Cell<usize>>,
}

static FIELD_LOCK: RecursiveMutex = RecursiveMutex::new();
static NOTIFY_LOCK: RecursiveMutex = RecursiveMutex::new();

/// ### English
/// Global lock guarding field value mutation.
///
/// ### 中文
/// 保护字段值修改的全局锁。
pub fn field_lock() -> &'static RecursiveMutex {
    &FIELD_LOCK
}

/// ### English
/// Global lock guarding change-notification dispatch.
///
/// ### 中文
/// 保护变更通知分发的全局锁。
pub fn notify_lock() -> &'static RecursiveMutex {
    &NOTIFY_LOCK
}

impl Default for RecursiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl RecursiveMutex {
    pub const fn new() -> Self {
        Self {
            depth: ReentrantMutex::new(Cell::new(0)),
        }
    }

    /// ### English
    /// Locks, blocking while another thread owns the mutex. Re-locking from the owner only
    /// increments the nesting depth.
    ///
    /// ### 中文
    /// 加锁；若其它线程持有则阻塞。持有线程再次加锁只会增加嵌套深度。
    pub fn lock(&self) -> RecursiveGuard<'_> {
        RecursiveGuard::enter(self.depth.lock())
    }

    /// ### English
    /// Locks without blocking; `None` if another thread owns the mutex.
    ///
    /// ### 中文
    /// 非阻塞加锁；若被其它线程持有则返回 `None`。
    pub fn try_lock(&self) -> Option<RecursiveGuard<'_>> {
        self.depth.try_lock().map(RecursiveGuard::enter)
    }

    /// ### English
    /// Nesting depth held by the calling thread (`0` if it does not own the mutex).
    ///
    /// ### 中文
    /// 调用线程持有的嵌套深度（未持有时为 `0`）。
    pub fn depth(&self) -> usize {
        if !self.depth.is_owned_by_current_thread() {
            return 0;
        }
        self.depth.lock().get()
    }
}

/// ### English
/// Scoped ownership of one nesting level of a [`RecursiveMutex`]. Not `Send`: it must be
/// dropped on the thread that acquired it.
///
/// ### 中文
/// [`RecursiveMutex`] 一层嵌套的作用域所有权。非 `Send`：必须在获取它的线程上释放。
pub struct RecursiveGuard<'a> {
    depth: ReentrantMutexGuard<'a, Cell<usize>>,
}

impl<'a> RecursiveGuard<'a> {
    fn enter(depth: ReentrantMutexGuard<'a, Cell<usize>>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for RecursiveGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}
