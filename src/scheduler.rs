//! Worker pool that runs decode tasks.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// A unit of work; runs exactly once on some worker.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Executes submitted jobs asynchronously.
///
/// Every accepted job must run exactly once. `schedule` blocks while the
/// scheduler already holds as many unfinished jobs as it is willing to
/// buffer; this is what slows a parse driver down to the speed of its decode
/// workers and callbacks.
///
/// The parse call blocks until all of its jobs have finished, so a scheduler
/// whose workers call [`Parser::parse`](crate::Parser::parse) themselves can
/// deadlock.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, job: Job);
}

/// Counts scheduled-but-unfinished jobs and blocks submitters at `max`.
struct InFlight {
    count: Mutex<usize>,
    freed: Condvar,
    max: usize,
}

impl InFlight {
    fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            count: Mutex::new(0),
            freed: Condvar::new(),
            max: max.max(1),
        })
    }

    fn enter(self: &Arc<Self>) -> InFlightSlot {
        let mut count = self.count.lock();
        while *count >= self.max {
            self.freed.wait(&mut count);
        }
        *count += 1;
        InFlightSlot(Arc::clone(self))
    }
}

/// Held by a job until it finishes.
struct InFlightSlot(Arc<InFlight>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        drop(count);
        self.0.freed.notify_one();
    }
}

/// [`Scheduler`] backed by a rayon thread pool.
///
/// Rayon's own spawn queue is unbounded, so submissions pass through an
/// in-flight gate first: at most `max_in_flight` jobs are running or queued
/// at any time, by default two per worker thread.
#[derive(Clone)]
pub struct RayonScheduler {
    pool: Option<Arc<rayon::ThreadPool>>,
    in_flight: Arc<InFlight>,
}

impl RayonScheduler {
    /// Dedicated pool with `threads` workers.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the pool cannot be built.
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        Self::with_max_in_flight(threads, 2 * threads)
    }

    /// Dedicated pool with `threads` workers accepting at most
    /// `max_in_flight` unfinished jobs before `schedule` blocks.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the pool cannot be built.
    pub fn with_max_in_flight(threads: usize, max_in_flight: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("tsingest-unmarshal-{i}"))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot build worker pool: {e}")))?;
        Ok(Self {
            pool: Some(Arc::new(pool)),
            in_flight: InFlight::new(max_in_flight),
        })
    }

    /// Use rayon's global pool.
    #[must_use]
    pub fn global() -> Self {
        Self {
            pool: None,
            in_flight: InFlight::new(2 * rayon::current_num_threads()),
        }
    }

    /// Worker count of the underlying pool.
    #[must_use]
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Most unfinished jobs accepted before `schedule` blocks.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.max
    }

    /// Jobs scheduled and not yet finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock()
    }
}

impl Scheduler for RayonScheduler {
    fn schedule(&self, job: Job) {
        let slot = self.in_flight.enter();
        let job = move || {
            let _slot = slot;
            job();
        };
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
    }
}
