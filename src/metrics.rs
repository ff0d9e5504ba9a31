//! Advisory counters for the import path.
//!
//! The parser bumps three counters per [`Parser`](crate::Parser):
//!
//! - `read_calls_total` - block reads attempted
//! - `read_errors_total` - reads that failed with an I/O or framing error
//! - `rows_read_total` - data points decoded
//!
//! Counters never affect parsing; they can be printed or exported as JSON.
//!
//! ```
//! use tsingest::metrics::MetricsCollector;
//!
//! let metrics = MetricsCollector::new();
//! let requests = metrics.counter("requests_total");
//! requests.add(3);
//! assert_eq!(metrics.snapshot()["requests_total"], 3);
//! ```

use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    #[inline]
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Named counters shared between the driver and decode workers.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    counters: Arc<Mutex<BTreeMap<String, Arc<Counter>>>>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter registered under `name`, created at zero on first use.
    #[must_use]
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        let mut counters = self.counters.lock();
        Arc::clone(counters.entry(name.to_string()).or_default())
    }

    /// Current value of every counter.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .lock()
            .iter()
            .map(|(name, c)| (name.clone(), c.get()))
            .collect()
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        json!(self.snapshot())
    }

    /// Print every counter to stdout, sorted by name.
    pub fn print(&self) {
        println!("\n========== Import Metrics ==========");
        for (name, value) in self.snapshot() {
            println!("{name}: {value}");
        }
        println!("====================================\n");
    }
}

/// The counters a parser updates, resolved once at construction.
#[derive(Clone)]
pub struct ParserMetrics {
    pub read_calls: Arc<Counter>,
    pub read_errors: Arc<Counter>,
    pub rows_read: Arc<Counter>,
}

impl ParserMetrics {
    #[must_use]
    pub fn register(collector: &MetricsCollector) -> Self {
        Self {
            read_calls: collector.counter("read_calls_total"),
            read_errors: collector.counter("read_errors_total"),
            rows_read: collector.counter("rows_read_total"),
        }
    }
}
