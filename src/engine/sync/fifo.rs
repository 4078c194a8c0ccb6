//! ### English
//! Thread-safe FIFO work queue with blocking and non-blocking retrieval.
//!
//! ### 中文
//! 线程安全的 FIFO 工作队列，支持阻塞与非阻塞取出。

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex, MutexGuard};

/// ### English
/// One queued work item plus its caller-defined type tag.
///
/// ### 中文
/// 一个排队的工作项及其调用方自定义的类型标签。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FifoEntry<T> {
    pub item: T,
    pub tag: u32,
}

/// ### English
/// Multi-producer FIFO. Each entry is handed to exactly one consumer.
///
/// `assign` never blocks; `retrieve` blocks until an entry is available. Inspection and
/// cancellation of still-queued work go through [`WorkFifo::lock`], which holds the queue
/// lock for as long as the returned guard lives.
///
/// ### 中文
/// 多生产者 FIFO。每个条目只会交给一个消费者。
///
/// `assign` 从不阻塞；`retrieve` 会阻塞到有条目可取。对仍在排队的工作进行查看与取消需通过
/// [`WorkFifo::lock`]，其返回的 guard 存活期间会一直持有队列锁。
pub struct WorkFifo<T> {
    queue: Mutex<VecDeque<FifoEntry<T>>>,
    available: Condvar,
}

impl<T> Default for WorkFifo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkFifo<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// ### English
    /// Appends one entry and wakes a single waiting consumer.
    ///
    /// ### 中文
    /// 追加一个条目并唤醒一个等待中的消费者。
    pub fn assign(&self, item: T, tag: u32) {
        self.queue.lock().push_back(FifoEntry { item, tag });
        self.available.notify_one();
    }

    /// ### English
    /// Removes the oldest entry, blocking while the queue is empty.
    ///
    /// ### 中文
    /// 取出最早的条目；队列为空时阻塞。
    pub fn retrieve(&self) -> FifoEntry<T> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(entry) = queue.pop_front() {
                return entry;
            }
            self.available.wait(&mut queue);
        }
    }

    /// ### English
    /// Removes the oldest entry if there is one.
    ///
    /// ### 中文
    /// 若存在条目则取出最早的一个（非阻塞）。
    pub fn try_retrieve(&self) -> Option<FifoEntry<T>> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// ### English
    /// Locks the queue for inspection or cancellation of queued entries.
    ///
    /// Producers and consumers block until the guard is dropped; keep it short-lived.
    ///
    /// ### 中文
    /// 锁定队列，以查看或取消排队中的条目。
    ///
    /// guard 释放之前生产者与消费者都会阻塞；请尽量缩短持有时间。
    pub fn lock(&self) -> FifoGuard<'_, T> {
        FifoGuard {
            queue: self.queue.lock(),
        }
    }
}

/// ### English
/// Exclusive view of a [`WorkFifo`] while its lock is held.
///
/// ### 中文
/// 持有锁期间对 [`WorkFifo`] 的独占视图。
pub struct FifoGuard<'a, T> {
    queue: MutexGuard<'a, VecDeque<FifoEntry<T>>>,
}

impl<T> FifoGuard<'_, T> {
    /// ### English
    /// The entry that the next `retrieve` would return, without removing it.
    ///
    /// ### 中文
    /// 下一次 `retrieve` 将返回的条目（不移除）。
    pub fn peek(&self) -> Option<&FifoEntry<T>> {
        self.queue.front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T: PartialEq> FifoGuard<'_, T> {
    pub fn contains(&self, item: &T) -> bool {
        self.queue.iter().any(|entry| entry.item == *item)
    }

    /// ### English
    /// Cancels the first still-queued entry equal to `item`. The relative order of the
    /// remaining entries is preserved. Returns `None` if the item was already retrieved.
    ///
    /// ### 中文
    /// 取消第一个与 `item` 相等且仍在排队的条目；其余条目的相对顺序保持不变。
    /// 若该条目已被取走则返回 `None`。
    pub fn reclaim(&mut self, item: &T) -> Option<FifoEntry<T>> {
        let index = self.queue.iter().position(|entry| entry.item == *item)?;
        self.queue.remove(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn retrieval_preserves_insertion_order() {
        let fifo = WorkFifo::new();
        fifo.assign('a', 0);
        fifo.assign('b', 1);
        fifo.assign('c', 2);

        assert_eq!(fifo.retrieve(), FifoEntry { item: 'a', tag: 0 });
        assert_eq!(fifo.retrieve().item, 'b');
        assert_eq!(fifo.retrieve().item, 'c');
        assert!(fifo.try_retrieve().is_none());
    }

    #[test]
    fn reclaim_removes_only_the_cancelled_entry() {
        let fifo = WorkFifo::new();
        for item in ['a', 'b', 'c'] {
            fifo.assign(item, 7);
        }

        {
            let mut guard = fifo.lock();
            assert!(guard.contains(&'b'));
            assert_eq!(guard.reclaim(&'b').map(|e| e.item), Some('b'));
            assert!(!guard.contains(&'b'));
            assert!(guard.reclaim(&'z').is_none());
            assert_eq!(guard.peek().map(|e| e.item), Some('a'));
        }

        assert_eq!(fifo.retrieve().item, 'a');
        assert_eq!(fifo.retrieve().item, 'c');
        assert!(fifo.is_empty());
    }

    #[test]
    fn retrieve_blocks_until_work_arrives() {
        let fifo = Arc::new(WorkFifo::new());
        let consumer = {
            let fifo = fifo.clone();
            thread::spawn(move || fifo.retrieve())
        };

        thread::sleep(Duration::from_millis(20));
        fifo.assign(42u32, 3);

        let entry = consumer.join().unwrap();
        assert_eq!(entry, FifoEntry { item: 42, tag: 3 });
    }
}
