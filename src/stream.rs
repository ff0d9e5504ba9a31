//! Per-call stream state and the decode task.
//!
//! A [`StreamContext`] is owned by the driver thread of one parse call. Its
//! buffers are touched only by the driver; the [`Shared`] part (pending-work
//! count and first-error latch) is the only state decode workers mutate.
//! An [`UnmarshalWork`] owns one raw block from dispatch until its decode and
//! callback have run.

use crate::config::ParserConfig;
use crate::error::Error;
use crate::io::lines::{LinesError, read_lines_block};
use crate::io::DynReader;
use crate::limiter::LimitedReader;
use crate::metrics::{Counter, ParserMetrics};
use crate::pool::Reset;
use crate::rows::{Row, RowDecoder, Rows};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// User handler for decoded batches.
///
/// Called concurrently and in no particular block order. The slice is only
/// valid for the duration of the call.
pub type Callback = Arc<dyn Fn(&[Row]) -> anyhow::Result<()> + Send + Sync>;

/// Count of dispatched blocks whose decode task has not finished.
#[derive(Default)]
pub(crate) struct Pending {
    count: Mutex<usize>,
    zero: Condvar,
}

impl Pending {
    pub(crate) fn add(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn done(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.zero.notify_all();
        }
    }

    /// Block until every added task is done.
    pub(crate) fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.zero.wait(&mut count);
        }
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.lock()
    }
}

/// Context state shared with decode workers.
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) pending: Pending,
    callback_err: Mutex<Option<Error>>,
}

impl Shared {
    pub(crate) fn has_callback_error(&self) -> bool {
        self.callback_err.lock().is_some()
    }

    /// Keep `err` only if no error was recorded before it.
    pub(crate) fn record_error(&self, err: Error) {
        let mut slot = self.callback_err.lock();
        if slot.is_none() {
            tracing::debug!(error = %err, "latched first callback error");
            *slot = Some(err);
        }
    }

    pub(crate) fn take_callback_error(&self) -> Option<Error> {
        self.callback_err.lock().take()
    }
}

/// Why the read loop stopped.
enum ReadState {
    Eof,
    Failed(Error),
}

#[derive(Default)]
pub(crate) struct StreamContext {
    reader: Option<LimitedReader<DynReader>>,
    pub(crate) req_buf: Vec<u8>,
    tail_buf: Vec<u8>,
    state: Option<ReadState>,
    pub(crate) shared: Arc<Shared>,
}

impl StreamContext {
    pub(crate) fn bind(&mut self, reader: LimitedReader<DynReader>) {
        self.reader = Some(reader);
    }

    /// Refill `req_buf` with the next block of complete lines.
    ///
    /// Returns `false` once the stream ended, a read failed, or a decode task
    /// reported an error. Already dispatched blocks are not affected.
    pub(crate) fn read(&mut self, config: &ParserConfig, metrics: &ParserMetrics) -> bool {
        metrics.read_calls.inc();
        if self.state.is_some() || self.shared.has_callback_error() {
            return false;
        }
        let Some(reader) = self.reader.as_mut() else {
            self.state = Some(ReadState::Eof);
            return false;
        };
        let res = read_lines_block(
            reader,
            &mut self.req_buf,
            &mut self.tail_buf,
            config.max_line_len,
            config.block_size,
        );
        match res {
            Ok(()) => true,
            Err(LinesError::Eof) => {
                self.state = Some(ReadState::Eof);
                false
            }
            Err(e) => {
                metrics.read_errors.inc();
                let err = read_error(e);
                tracing::warn!(error = %err, "import stream read failed");
                self.state = Some(ReadState::Failed(err));
                false
            }
        }
    }

    /// Terminal read error, if the loop stopped for anything but a clean end.
    pub(crate) fn take_error(&mut self) -> Option<Error> {
        match self.state.take() {
            Some(ReadState::Failed(err)) => Some(err),
            Some(ReadState::Eof) | None => None,
        }
    }

    pub(crate) fn release_slot(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            reader.release_slot();
        }
    }
}

impl Reset for StreamContext {
    fn reset(&mut self) {
        debug_assert_eq!(self.shared.pending.get(), 0, "stream context reset with work in flight");
        self.reader = None;
        self.req_buf.clear();
        self.tail_buf.clear();
        self.state = None;
        self.shared.take_callback_error();
    }
}

fn read_error(e: LinesError) -> Error {
    match e {
        LinesError::TooLong { max } => Error::LineTooLong { max },
        // limiter timeouts travel through the reader as io errors
        LinesError::Io(io) if io.get_ref().is_some_and(|inner| inner.is::<Error>()) => {
            let kind = io.kind();
            match io.into_inner().map(|inner| inner.downcast::<Error>()) {
                Some(Ok(err)) => *err,
                _ => Error::Read(kind.into()),
            }
        }
        LinesError::Io(io) => Error::Read(io),
        LinesError::Eof => Error::Read(std::io::ErrorKind::UnexpectedEof.into()),
    }
}

/// One raw block on its way through decode and callback.
#[derive(Default)]
pub(crate) struct UnmarshalWork {
    rows: Rows,
    pub(crate) req_buf: Vec<u8>,
    pub(crate) ctx: Option<Arc<Shared>>,
    pub(crate) callback: Option<Callback>,
}

impl Reset for UnmarshalWork {
    fn reset(&mut self) {
        self.rows.reset();
        self.ctx = None;
        self.callback = None;
        self.req_buf.clear();
    }
}

impl UnmarshalWork {
    /// Decode the owned block and hand the rows to the callback.
    ///
    /// Any failure, including a panic in the decoder or callback, goes to the
    /// context's first-error latch. The pending count is decremented exactly
    /// once, after the callback reference has been dropped.
    pub(crate) fn unmarshal(&mut self, decoder: &dyn RowDecoder, rows_read: &Counter) {
        let Some(ctx) = self.ctx.take() else {
            return;
        };
        let callback = self.callback.take();

        let outcome = catch_unwind(AssertUnwindSafe(|| -> crate::Result<()> {
            decoder.decode(&self.req_buf, &mut self.rows)?;
            rows_read.add(self.rows.samples() as u64);
            if let Some(callback) = &callback {
                callback(self.rows.as_slice()).map_err(Error::Callback)?;
            }
            Ok(())
        }));
        drop(callback);

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => ctx.record_error(err),
            Err(panic) => ctx.record_error(Error::Callback(anyhow::anyhow!(
                "unmarshal task panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
        ctx.pending.done();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
