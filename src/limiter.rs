//! Process-wide gate on concurrent read phases.
//!
//! Every stream of a [`Parser`](crate::Parser) shares one
//! [`ConcurrencyLimiter`]. A stream holds a slot from its first read of a block
//! until the block has been handed to a decode worker, so the limiter bounds
//! concurrent read+handoff work, not decode work.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counting semaphore with a bounded queue wait.
pub struct ConcurrencyLimiter {
    in_use: Mutex<usize>,
    freed: Condvar,
    capacity: usize,
    max_queue_duration: Duration,
}

impl ConcurrencyLimiter {
    /// A limiter admitting `capacity` concurrent holders. Waiters give up
    /// after `max_queue_duration`.
    #[must_use]
    pub fn new(capacity: usize, max_queue_duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            in_use: Mutex::new(0),
            freed: Condvar::new(),
            capacity: capacity.max(1),
            max_queue_duration,
        })
    }

    /// A limiter that never blocks.
    #[must_use]
    pub fn unlimited() -> Arc<Self> {
        Self::new(usize::MAX, Duration::MAX)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        *self.in_use.lock()
    }

    /// Block until a slot is free.
    ///
    /// # Errors
    /// Returns [`Error::LimiterTimeout`] when no slot frees up within the
    /// configured queue duration.
    pub fn acquire(self: &Arc<Self>) -> Result<Permit> {
        let start = Instant::now();
        let deadline = start.checked_add(self.max_queue_duration);
        let mut in_use = self.in_use.lock();
        while *in_use >= self.capacity {
            let timed_out = match deadline {
                Some(deadline) => self.freed.wait_until(&mut in_use, deadline).timed_out(),
                None => {
                    self.freed.wait(&mut in_use);
                    false
                }
            };
            if timed_out && *in_use >= self.capacity {
                return Err(Error::LimiterTimeout {
                    waited: start.elapsed(),
                    capacity: self.capacity,
                });
            }
        }
        *in_use += 1;
        Ok(Permit {
            limiter: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut in_use = self.in_use.lock();
        *in_use -= 1;
        drop(in_use);
        self.freed.notify_one();
    }
}

/// A held limiter slot; released on drop.
pub struct Permit {
    limiter: Arc<ConcurrencyLimiter>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

/// Reader that takes a limiter slot on the first read after each release.
pub struct LimitedReader<R> {
    inner: R,
    limiter: Arc<ConcurrencyLimiter>,
    permit: Option<Permit>,
}

impl<R: Read> LimitedReader<R> {
    pub fn new(inner: R, limiter: Arc<ConcurrencyLimiter>) -> Self {
        Self {
            inner,
            limiter,
            permit: None,
        }
    }

    /// Give the slot back. Does nothing when no slot is held.
    pub fn release_slot(&mut self) {
        self.permit = None;
    }

    #[must_use]
    pub fn holds_slot(&self) -> bool {
        self.permit.is_some()
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.permit.is_none() {
            let permit = self.limiter.acquire().map_err(std::io::Error::other)?;
            self.permit = Some(permit);
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn permits_are_counted_and_released() {
        let limiter = ConcurrencyLimiter::new(2, Duration::from_millis(10));
        let a = limiter.acquire().unwrap();
        let _b = limiter.acquire().unwrap();
        assert_eq!(limiter.in_use(), 2);
        assert!(matches!(
            limiter.acquire(),
            Err(Error::LimiterTimeout { capacity: 2, .. })
        ));
        drop(a);
        assert_eq!(limiter.in_use(), 1);
        assert!(limiter.acquire().is_ok());
    }

    #[test]
    fn reader_holds_slot_until_released() {
        let limiter = ConcurrencyLimiter::new(1, Duration::from_millis(10));
        let mut r = LimitedReader::new(Cursor::new(b"abc".to_vec()), Arc::clone(&limiter));
        let mut buf = [0u8; 1];
        r.read_exact(&mut buf).unwrap();
        assert!(r.holds_slot());
        assert_eq!(limiter.in_use(), 1);
        r.read_exact(&mut buf).unwrap();
        assert_eq!(limiter.in_use(), 1);
        r.release_slot();
        assert_eq!(limiter.in_use(), 0);
        r.release_slot();
        r.read_exact(&mut buf).unwrap();
        drop(r);
        assert_eq!(limiter.in_use(), 0);
    }

    #[test]
    fn blocked_reader_fails_after_queue_duration() {
        let limiter = ConcurrencyLimiter::new(1, Duration::from_millis(20));
        let _held = limiter.acquire().unwrap();
        let mut r = LimitedReader::new(Cursor::new(b"abc".to_vec()), Arc::clone(&limiter));
        let mut buf = [0u8; 3];
        let err = r.read(&mut buf).unwrap_err();
        assert!(err.to_string().contains("concurrent insert requests"));
    }
}
