//! # tsingest
//!
//! The write-path front end of a time-series store: a **concurrent streaming
//! parser** for line-delimited, optionally compressed import requests.
//!
//! A stream is read in blocks of complete lines on the calling thread. Each
//! block is moved (not copied) into a pooled work unit and decoded on a worker
//! pool while the driver reads the next block. Decoded rows go to a user
//! callback. Memory and parallelism stay bounded:
//!
//! - **Per-line cap** - a line longer than `max_line_len` fails the stream
//! - **Buffer reuse** - blocks and row batches are recycled through pools
//! - **Global read gate** - a shared [`ConcurrencyLimiter`] bounds how many
//!   streams are reading at once
//! - **Bounded decode** - decode and callbacks run on a fixed-size pool that
//!   stops accepting blocks while saturated, so a slow callback slows the reader
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! # fn main() -> tsingest::Result<()> {
//!
//! let body = concat!(
//!     r#"{"metric":{"__name__":"up","job":"api"},"values":[1,1],"timestamps":[1000,2000]}"#, "\n",
//!     r#"{"metric":{"__name__":"up","job":"db"},"values":[0],"timestamps":[1000]}"#, "\n",
//! );
//!
//! let samples = Arc::new(AtomicUsize::new(0));
//! let seen = Arc::clone(&samples);
//! tsingest::parse(body.as_bytes(), "identity", move |rows| {
//!     for row in rows {
//!         seen.fetch_add(row.len(), Ordering::Relaxed);
//!     }
//!     Ok(())
//! })?;
//! assert_eq!(samples.load(Ordering::Relaxed), 3);
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - When `parse` returns, every dispatched block has been delivered and no
//!   callback will run afterwards.
//! - A read/framing error is returned in preference to a callback error; among
//!   callback and decode errors the first one recorded wins.
//! - A callback error stops further reads but never cancels blocks already
//!   dispatched.
//! - No ordering between batches; order within a batch follows the input.
//!
//! ## Module Overview
//!
//! - [`parser`] - [`Parser`], [`ParserBuilder`]: the read/dispatch loop
//! - [`stream`] - per-call stream context and the decode task
//! - [`io`] - decompression codecs and the line-block reader
//! - [`rows`] - [`Row`], [`Rows`], [`RowDecoder`] and the JSON-lines decoder
//! - [`limiter`] - the process-wide read gate
//! - [`scheduler`] - worker pool seam backed by rayon
//! - [`pool`] - object pool with an explicit reset contract
//! - [`metrics`] - advisory counters
//! - [`testing`] - helpers for tests of import handlers

pub mod config;
pub mod error;
pub mod io;
pub mod limiter;
pub mod metrics;
pub mod parser;
pub mod pool;
pub mod rows;
pub mod scheduler;
pub mod stream;
pub mod testing;

pub use config::ParserConfig;
pub use error::{Error, Result};
pub use limiter::ConcurrencyLimiter;
pub use parser::{Parser, ParserBuilder};
pub use rows::{JsonLineDecoder, Row, RowDecoder, Rows, Tag};
pub use scheduler::{RayonScheduler, Scheduler};
pub use stream::Callback;

use std::io::Read;
use std::sync::OnceLock;

static DEFAULT_PARSER: OnceLock<Parser> = OnceLock::new();

/// Process-wide parser with default settings, built on first use.
pub fn default_parser() -> &'static Parser {
    DEFAULT_PARSER.get_or_init(Parser::default)
}

/// Parse `source` with the [`default_parser`].
///
/// # Errors
/// See [`Parser::parse`].
pub fn parse<R, F>(source: R, encoding: &str, callback: F) -> Result<()>
where
    R: Read + Send + 'static,
    F: Fn(&[Row]) -> anyhow::Result<()> + Send + Sync + 'static,
{
    default_parser().parse(source, encoding, callback)
}
