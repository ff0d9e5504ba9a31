//! Parser configuration.
//!
//! [`ParserConfig`] is plain data: it derives Serde so it can be embedded in a
//! larger service config, and every field has a default matching the limits
//! used in production imports.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum length of a single import line (10 MiB).
pub const DEFAULT_MAX_LINE_LEN: usize = 10 * 1024 * 1024;

/// Default size of a block read from the source in one go (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default time a stream may wait for a limiter slot.
pub const DEFAULT_MAX_QUEUE_DURATION: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Maximum accepted line length in bytes. A longer line fails the whole
    /// parse call once it is reached.
    pub max_line_len: usize,
    /// Initial capacity of a raw block buffer.
    pub block_size: usize,
    /// Number of streams allowed to be in a read phase at the same time.
    pub max_concurrent_inserts: usize,
    /// How long a stream waits for a read slot before failing.
    #[serde(rename = "max_queue_duration_ms", with = "duration_ms")]
    pub max_queue_duration: Duration,
    /// Decode workers; `None` means one per CPU.
    pub workers: Option<usize>,
    /// Upper bound on idle pooled objects kept for reuse.
    pub max_idle_work: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_line_len: DEFAULT_MAX_LINE_LEN,
            block_size: DEFAULT_BLOCK_SIZE,
            max_concurrent_inserts: 2 * num_cpus::get().max(1),
            max_queue_duration: DEFAULT_MAX_QUEUE_DURATION,
            workers: None,
            max_idle_work: 1024,
        }
    }
}

impl ParserConfig {
    #[must_use]
    pub fn with_max_line_len(mut self, n: usize) -> Self {
        self.max_line_len = n;
        self
    }

    #[must_use]
    pub fn with_block_size(mut self, n: usize) -> Self {
        self.block_size = n;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_inserts(mut self, n: usize) -> Self {
        self.max_concurrent_inserts = n;
        self
    }

    #[must_use]
    pub fn with_max_queue_duration(mut self, d: Duration) -> Self {
        self.max_queue_duration = d;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, n: usize) -> Self {
        self.workers = Some(n);
        self
    }

    /// Resolved worker count.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Reject settings the parser cannot run with.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_line_len == 0 {
            return Err(Error::InvalidConfig("max_line_len must be positive".into()));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidConfig("block_size must be positive".into()));
        }
        if self.max_concurrent_inserts == 0 {
            return Err(Error::InvalidConfig(
                "max_concurrent_inserts must be positive".into(),
            ));
        }
        if self.workers == Some(0) {
            return Err(Error::InvalidConfig("workers must be positive".into()));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
