//! Byte sources with controlled read behavior.

use std::io::{self, Read};
use std::time::Duration;

/// Serves `data` at most `chunk` bytes per read call, optionally sleeping
/// before each read.
pub struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
    delay: Option<Duration>,
}

impl ChunkedReader {
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>, chunk: usize) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            chunk: chunk.max(1),
            delay: None,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Read for ChunkedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let n = buf.len().min(self.chunk).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Serves `data` in `chunk`-sized reads, then fails every later read.
pub struct FailingReader {
    inner: ChunkedReader,
    message: String,
}

impl FailingReader {
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>, chunk: usize, message: impl Into<String>) -> Self {
        Self {
            inner: ChunkedReader::new(data, chunk),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.inner = self.inner.with_delay(delay);
        self
    }
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, self.message.clone())),
            n => Ok(n),
        }
    }
}
