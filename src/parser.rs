//! The import driver.
//!
//! [`Parser::parse`] reads a stream block by block on the calling thread and
//! hands each block to the scheduler without waiting for it. It returns only
//! after every dispatched block has been decoded and delivered, so no
//! callback runs after it returns.

use crate::config::ParserConfig;
use crate::error::{Error, Result};
use crate::io::{DynReader, auto_detect_reader, uncompressed_reader};
use crate::limiter::{ConcurrencyLimiter, LimitedReader};
use crate::metrics::{MetricsCollector, ParserMetrics};
use crate::pool::Pool;
use crate::rows::{JsonLineDecoder, Row, RowDecoder};
use crate::scheduler::{RayonScheduler, Scheduler};
use crate::stream::{Callback, StreamContext, UnmarshalWork};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

pub struct Parser {
    inner: Arc<ParserInner>,
}

struct ParserInner {
    config: ParserConfig,
    limiter: Arc<ConcurrencyLimiter>,
    scheduler: Arc<dyn Scheduler>,
    decoder: Arc<dyn RowDecoder>,
    collector: MetricsCollector,
    metrics: ParserMetrics,
    work_pool: Pool<UnmarshalWork>,
    ctx_pool: Pool<StreamContext>,
}

impl Default for Parser {
    /// Default config, JSON-lines decoder, rayon's global pool.
    fn default() -> Self {
        let config = ParserConfig::default();
        let limiter =
            ConcurrencyLimiter::new(config.max_concurrent_inserts, config.max_queue_duration);
        ParserBuilder::new()
            .limiter(limiter)
            .scheduler(Arc::new(RayonScheduler::global()))
            .assemble(config)
    }
}

impl Parser {
    /// Parser with its own worker pool sized from `config`.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if `config` fails validation or the worker
    /// pool cannot be built.
    pub fn new(config: ParserConfig) -> Result<Self> {
        ParserBuilder::new().config(config).build()
    }

    #[must_use]
    pub fn builder() -> ParserBuilder {
        ParserBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &ParserConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.inner.limiter
    }

    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.collector
    }

    /// Parse an import stream in `encoding` and feed decoded batches to
    /// `callback`.
    ///
    /// `callback` may run concurrently on several workers and sees blocks in
    /// no particular order; rows within one batch keep their line order. It
    /// must not keep the slice after returning.
    ///
    /// A read or framing error is returned in preference to any callback or
    /// decode error; otherwise the first callback or decode error is
    /// returned.
    ///
    /// # Errors
    /// See [`Error`].
    pub fn parse<R, F>(&self, source: R, encoding: &str, callback: F) -> Result<()>
    where
        R: Read + Send + 'static,
        F: Fn(&[Row]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let reader = uncompressed_reader(source, encoding)?;
        self.parse_reader(reader, Arc::new(callback))
    }

    /// Like [`parse`](Self::parse), picking the codec from the file name or
    /// its leading magic bytes.
    ///
    /// # Errors
    /// [`Error::Open`] when the file cannot be opened, otherwise as
    /// [`parse`](Self::parse).
    pub fn parse_file<F>(&self, path: impl AsRef<Path>, callback: F) -> Result<()>
    where
        F: Fn(&[Row]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let reader = auto_detect_reader(file, path)?;
        self.parse_reader(reader, Arc::new(callback))
    }

    fn parse_reader(&self, reader: DynReader, callback: Callback) -> Result<()> {
        let inner = &self.inner;
        let mut ctx = inner.ctx_pool.get();
        ctx.bind(LimitedReader::new(reader, Arc::clone(&inner.limiter)));

        let mut blocks = 0usize;
        while ctx.read(&inner.config, &inner.metrics) {
            let mut uw = inner.work_pool.get();
            uw.ctx = Some(Arc::clone(&ctx.shared));
            uw.callback = Some(Arc::clone(&callback));
            std::mem::swap(&mut uw.req_buf, &mut ctx.req_buf);
            ctx.shared.pending.add();

            let job_inner = Arc::clone(inner);
            inner.scheduler.schedule(Box::new(move || {
                uw.unmarshal(job_inner.decoder.as_ref(), &job_inner.metrics.rows_read);
                job_inner.work_pool.put(uw);
            }));
            ctx.release_slot();

            blocks += 1;
            tracing::trace!(block = blocks, "dispatched import block");
        }
        ctx.release_slot();
        ctx.shared.pending.wait();

        let result = match ctx.take_error() {
            Some(err) => Err(err),
            None => ctx.shared.take_callback_error().map_or(Ok(()), Err),
        };
        tracing::debug!(blocks, ok = result.is_ok(), "import stream finished");
        inner.ctx_pool.put(ctx);
        result
    }
}

/// Assembles a [`Parser`] from injected collaborators.
///
/// Anything left unset falls back to the defaults derived from the config:
/// a limiter with `max_concurrent_inserts` slots, a dedicated rayon pool with
/// `workers` threads, the JSON-lines decoder and a fresh metrics collector.
#[derive(Default)]
pub struct ParserBuilder {
    config: Option<ParserConfig>,
    limiter: Option<Arc<ConcurrencyLimiter>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    decoder: Option<Arc<dyn RowDecoder>>,
    metrics: Option<MetricsCollector>,
}

impl ParserBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: ParserConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Share `limiter` with other parsers in the process.
    #[must_use]
    pub fn limiter(mut self, limiter: Arc<ConcurrencyLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn decoder(mut self, decoder: Arc<dyn RowDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// # Errors
    /// [`Error::InvalidConfig`] if the config fails validation or the worker
    /// pool cannot be built.
    pub fn build(mut self) -> Result<Parser> {
        let config = self.config.take().unwrap_or_default();
        config.validate()?;
        if self.scheduler.is_none() {
            self.scheduler = Some(Arc::new(RayonScheduler::new(config.worker_count())?));
        }
        Ok(self.assemble(config))
    }

    fn assemble(self, config: ParserConfig) -> Parser {
        let limiter = self.limiter.unwrap_or_else(|| {
            ConcurrencyLimiter::new(config.max_concurrent_inserts, config.max_queue_duration)
        });
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(RayonScheduler::global()));
        let collector = self.metrics.unwrap_or_default();
        let metrics = ParserMetrics::register(&collector);
        let max_idle = config.max_idle_work;
        Parser {
            inner: Arc::new(ParserInner {
                config,
                limiter,
                scheduler,
                decoder: self.decoder.unwrap_or_else(|| Arc::new(JsonLineDecoder)),
                collector,
                metrics,
                work_pool: Pool::new(max_idle),
                ctx_pool: Pool::new(max_idle),
            }),
        }
    }
}
