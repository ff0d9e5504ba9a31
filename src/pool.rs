//! Object pool for recycling per-block work units and per-call stream contexts.
//!
//! Pools are owned by a [`Parser`](crate::Parser), not by the process, so two
//! parsers never observe each other's objects.

use parking_lot::Mutex;

/// Clears an object before it goes back to a pool.
///
/// Implementations must drop every reference to per-use state and truncate
/// buffers to zero length while keeping their capacity.
pub trait Reset {
    fn reset(&mut self);
}

pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T: Reset + Default> Pool<T> {
    #[must_use]
    pub fn new(max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Take a reset instance from the free list, or build a fresh one.
    pub fn get(&self) -> T {
        let item = self.free.lock().pop();
        item.unwrap_or_default()
    }

    /// Reset `item` and keep it for reuse unless the pool is full.
    pub fn put(&self, mut item: T) {
        item.reset();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(item);
        }
    }

    /// Number of idle instances.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}
