//! Randomizing exchange pool between dataset workers and batch assembly.
//!
//! Workers insert finished samples; the consumer removes one uniformly at
//! random, which decorrelates batch composition from worker scheduling. A
//! minimum fill level keeps early batches from draining a nearly empty pool.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct PoolState<T> {
    items: Vec<T>,
    rng: StdRng,
    closed: bool,
}

impl<T> PoolState<T> {
    fn remove_random(&mut self) -> T {
        let idx = self.rng.gen_range(0..self.items.len());
        self.items.swap_remove(idx)
    }
}

/// Bounded, thread-safe pool with random removal order.
pub struct ShufflePool<T> {
    state: Mutex<PoolState<T>>,
    capacity: usize,
    min_ready: usize,
    space: Condvar,
    ready: Condvar,
}

impl<T> ShufflePool<T> {
    /// `capacity` bounds the pool (inserts block when full); `min_ready`
    /// holds removals back until that many samples are present, except
    /// while draining a closed pool.
    pub fn new(capacity: usize, min_ready: usize, seed: u64) -> Self {
        assert!(capacity > 0, "capacity must be > 0");
        assert!(min_ready <= capacity, "min_ready must be <= capacity");
        Self {
            state: Mutex::new(PoolState {
                items: Vec::with_capacity(capacity),
                rng: StdRng::seed_from_u64(seed),
                closed: false,
            }),
            capacity,
            min_ready,
            space: Condvar::new(),
            ready: Condvar::new(),
        }
    }

    /// Insert a sample, blocking while the pool is full. Returns `false`
    /// once the pool has been closed.
    pub fn put(&self, item: T) -> bool {
        let mut state = self.state.lock().unwrap();
        while !state.closed && state.items.len() >= self.capacity {
            state = self.space.wait(state).unwrap();
        }
        if state.closed {
            return false;
        }
        state.items.push(item);
        if state.items.len() >= self.min_ready {
            self.ready.notify_one();
        }
        true
    }

    /// Remove a uniformly random sample, waiting up to `timeout` for the
    /// pool to become ready. Returns `None` on timeout or when the pool is
    /// closed and drained; check [`ShufflePool::is_closed`] to tell the two
    /// apart.
    pub fn take(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            let fill = state.items.len();
            // A closed pool drains without regard for min_ready.
            if fill > 0 && (state.closed || fill >= self.min_ready.max(1)) {
                let item = state.remove_random();
                self.space.notify_one();
                return Some(item);
            }
            if state.closed {
                return None;
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let (next, _timed_out) = self.ready.wait_timeout(state, remaining).unwrap();
            state = next;
        }
    }

    /// Close the pool: wakes every waiter, makes `put` fail, and lets
    /// `take` drain what is left.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.space.notify_all();
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
