//! ### English
//! Reusable cyclic thread barrier with a generation counter.
//!
//! ### 中文
//! 带代计数器的可复用循环线程屏障。

use parking_lot::{Condvar, Mutex};

struct BarrierState {
    /// ### English
    /// Participants that have entered the current generation.
    ///
    /// ### 中文
    /// 已进入当前代的参与者数量。
    arrived: usize,
    /// ### English
    /// Round counter (wraps). A waiter only leaves once this moves past the value it saw on
    /// entry, so a thread that is already in round N+1 never releases a straggler of round N.
    ///
    /// ### 中文
    /// 轮次计数器（会回绕）。等待者只有在该值越过其进入时看到的值后才会离开，
    /// 因此已进入第 N+1 轮的线程不会误放行第 N 轮的落后者。
    generation: u64,
}

/// ### English
/// Cyclic barrier for a fixed number of participants.
///
/// Every call to [`Barrier::enter`] blocks until all participants of the current round have
/// arrived. Exactly one caller per round (the last to arrive) gets `true`, which can be used
/// to elect a thread for one-time cleanup after a parallel phase.
///
/// ### 中文
/// 固定参与者数量的循环屏障。
///
/// 每次调用 [`Barrier::enter`] 都会阻塞，直到本轮所有参与者到达。每轮恰有一个调用方
///（最后到达者）得到 `true`，可用于在并行阶段结束后选出一个线程执行一次性清理。
pub struct Barrier {
    participants: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl Barrier {
    /// ### English
    /// Creates a barrier for `participants` threads (`0` is treated as `1`).
    ///
    /// ### 中文
    /// 为 `participants` 个线程创建屏障（`0` 视为 `1`）。
    pub fn new(participants: usize) -> Self {
        Self {
            participants: participants.max(1),
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            released: Condvar::new(),
        }
    }

    pub fn participants(&self) -> usize {
        self.participants
    }

    /// ### English
    /// Current round number.
    ///
    /// ### 中文
    /// 当前轮次编号。
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// ### English
    /// Waits for all participants. Returns `true` for the last arrival of the round.
    ///
    /// ### 中文
    /// 等待所有参与者到达。本轮最后到达者返回 `true`。
    pub fn enter(&self) -> bool {
        let mut state = self.state.lock();
        let generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.participants {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            return true;
        }

        while state.generation == generation {
            self.released.wait(&mut state);
        }
        false
    }
}
