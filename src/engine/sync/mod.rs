//! ### English
//! Blocking concurrency primitives used by cache population and sensor/event queue
//! processing.
//!
//! None of these expose timeouts: a participant that never arrives blocks a [`Barrier`]
//! forever, and a consumer blocked in [`WorkFifo::retrieve`] waits until work shows up.
//! Callers that need bounded waits build them on top.
//!
//! ### 中文
//! 供缓存填充与 sensor/事件队列处理使用的阻塞式并发原语。
//!
//! 这些原语都不提供超时：永远不到达的参与者会使 [`Barrier`] 永久阻塞，
//! 阻塞在 [`WorkFifo::retrieve`] 的消费者会一直等到有工作项。需要有界等待的调用方需自行封装。
mod barrier;
mod fifo;
mod recursive;

pub use barrier::Barrier;
pub use fifo::{FifoEntry, FifoGuard, WorkFifo};
pub use recursive::{RecursiveGuard, RecursiveMutex, field_lock, notify_lock};
