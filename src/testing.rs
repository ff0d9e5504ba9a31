//! Testing utilities for import handlers.
//!
//! - **Collectors**: [`RowCollector`] records every batch a callback receives
//! - **Assertions**: compare row multisets regardless of batch order
//! - **Fixtures**: build JSON-lines import bodies
//! - **Mock I/O**: sources that trickle bytes or fail mid-stream
//!
//! # Quick Start
//!
//! ```
//! use tsingest::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let p = TestParser::new(2)?;
//! let body = import_lines(100);
//! let batches = p.collect(std::io::Cursor::new(body.clone()))?;
//! let rows: Vec<_> = batches.into_iter().flatten().collect();
//! assert_same_rows(&rows, &expected_rows(&body));
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;
pub mod mock_io;

pub use assertions::*;
pub use fixtures::*;
pub use mock_io::*;

use crate::config::ParserConfig;
use crate::limiter::ConcurrencyLimiter;
use crate::parser::Parser;
use crate::rows::Row;
use crate::scheduler::RayonScheduler;
use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Records the batches passed to a parse callback.
#[derive(Clone, Default)]
pub struct RowCollector {
    batches: Arc<Mutex<Vec<Vec<Row>>>>,
    calls: Arc<AtomicUsize>,
}

impl RowCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A callback that copies each batch into the collector.
    pub fn callback(&self) -> impl Fn(&[Row]) -> anyhow::Result<()> + Send + Sync + 'static {
        let this = self.clone();
        move |rows: &[Row]| {
            this.calls.fetch_add(1, Ordering::SeqCst);
            this.batches.lock().push(rows.to_vec());
            Ok(())
        }
    }

    /// Number of callback invocations so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn batches(&self) -> Vec<Vec<Row>> {
        self.batches.lock().clone()
    }

    /// All collected rows, batch by batch in delivery order.
    #[must_use]
    pub fn rows(&self) -> Vec<Row> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    #[must_use]
    pub fn samples(&self) -> usize {
        self.batches.lock().iter().flatten().map(Row::len).sum()
    }
}

/// A [`Parser`] sized for tests: a dedicated pool of `workers` threads, an
/// unlimited read gate and small blocks so inputs split into many batches.
pub struct TestParser {
    parser: Parser,
}

impl TestParser {
    /// # Errors
    /// Fails if the worker pool cannot be built.
    pub fn new(workers: usize) -> crate::Result<Self> {
        Self::with_config(ParserConfig::default().with_block_size(256), workers)
    }

    /// # Errors
    /// Fails if `config` is invalid or the worker pool cannot be built.
    pub fn with_config(config: ParserConfig, workers: usize) -> crate::Result<Self> {
        let parser = Parser::builder()
            .config(config)
            .limiter(ConcurrencyLimiter::unlimited())
            .scheduler(Arc::new(RayonScheduler::new(workers)?))
            .build()?;
        Ok(Self { parser })
    }

    /// Parse an uncompressed `source` and return the delivered batches.
    ///
    /// # Errors
    /// Whatever [`Parser::parse`] returns.
    pub fn collect<R: Read + Send + 'static>(&self, source: R) -> crate::Result<Vec<Vec<Row>>> {
        let collector = RowCollector::new();
        self.parser.parse(source, "", collector.callback())?;
        Ok(collector.batches())
    }
}

impl std::ops::Deref for TestParser {
    type Target = Parser;

    fn deref(&self) -> &Self::Target {
        &self.parser
    }
}
