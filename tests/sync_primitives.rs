use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use coin_offscreen::engine::sync::{Barrier, RecursiveMutex, WorkFifo, field_lock, notify_lock};

#[test]
fn barrier_elects_one_leader_per_generation() {
    const THREADS: usize = 4;
    const ROUNDS: u64 = 25;

    let barrier = Arc::new(Barrier::new(THREADS));
    let (tx, rx) = crossbeam_channel::unbounded();

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let barrier = barrier.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let leader = barrier.enter();
                    // Nobody leaves a round before its generation has advanced.
                    assert!(barrier.generation() > round);
                    tx.send((round, leader)).unwrap();
                }
            })
        })
        .collect();
    drop(tx);
    for worker in workers {
        worker.join().unwrap();
    }

    let mut leaders = vec![0usize; ROUNDS as usize];
    let mut arrivals = 0;
    for (round, leader) in rx.iter() {
        arrivals += 1;
        if leader {
            leaders[round as usize] += 1;
        }
    }
    assert_eq!(arrivals, THREADS * ROUNDS as usize);
    assert!(leaders.iter().all(|&count| count == 1));
    assert_eq!(barrier.generation(), ROUNDS);
}

#[test]
fn fifo_hands_each_entry_to_exactly_one_consumer() {
    const ITEMS: u32 = 200;
    const CONSUMERS: usize = 3;

    let fifo = Arc::new(WorkFifo::new());
    let (tx, rx) = crossbeam_channel::unbounded();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let fifo = fifo.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                loop {
                    let entry = fifo.retrieve();
                    if entry.tag == u32::MAX {
                        return;
                    }
                    tx.send(entry.item).unwrap();
                }
            })
        })
        .collect();
    drop(tx);

    for item in 0..ITEMS {
        fifo.assign(item, item % 3);
    }
    for _ in 0..CONSUMERS {
        fifo.assign(0, u32::MAX);
    }
    for consumer in consumers {
        consumer.join().unwrap();
    }

    let mut seen: Vec<u32> = rx.iter().collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..ITEMS).collect::<Vec<_>>());
    assert!(fifo.is_empty());
}

#[test]
fn reclaimed_work_is_never_retrieved() {
    let fifo = WorkFifo::new();
    fifo.assign("a", 0);
    fifo.assign("b", 0);
    fifo.assign("c", 1);
    {
        let mut queue = fifo.lock();
        assert!(queue.contains(&"b"));
        assert_eq!(queue.reclaim(&"b").map(|entry| entry.item), Some("b"));
        assert!(!queue.contains(&"b"));
    }
    let drained: Vec<_> = std::iter::from_fn(|| fifo.try_retrieve())
        .map(|entry| entry.item)
        .collect();
    assert_eq!(drained, vec!["a", "c"]);
}

#[test]
fn recursive_lock_serializes_threads() {
    let lock = Arc::new(RecursiveMutex::new());
    let holders = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = crossbeam_channel::unbounded();

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let lock = lock.clone();
            let holders = holders.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let _outer = lock.lock();
                    let _inner = lock.lock();
                    assert_eq!(holders.fetch_add(1, Ordering::SeqCst), 0);
                    tx.send(lock.depth()).unwrap();
                    holders.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    drop(tx);
    for thread in threads {
        thread.join().unwrap();
    }

    assert!(rx.iter().all(|depth| depth == 2));
    assert_eq!(lock.depth(), 0);
}

#[test]
fn global_locks_are_distinct_and_reentrant() {
    let _field = field_lock().lock();
    let _notify = notify_lock().lock();
    let _nested = notify_lock().lock();
    assert_eq!(field_lock().depth(), 1);
    assert_eq!(notify_lock().depth(), 2);
}
