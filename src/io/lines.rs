//! Block reader that splits a byte stream on line boundaries.
//!
//! [`read_lines_block`] fills a buffer with as many complete lines as one
//! read delivers and carries the trailing partial line over to the next call.
//! Lines longer than the configured cap fail the read.

use std::io::{ErrorKind, Read};

#[derive(Debug, thiserror::Error)]
pub enum LinesError {
    /// The source is exhausted and no bytes are pending.
    #[error("end of stream")]
    Eof,
    #[error("too long line: more than {max} bytes")]
    TooLong { max: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read the next block of complete lines from `r` into `dst`.
///
/// `dst` is cleared, seeded with `tail`, and filled with freshly read bytes.
/// On success it holds complete lines without the final newline, and `tail`
/// holds the bytes after the last newline. A stream that ends without a
/// trailing newline yields its last line as a block of its own; the next call
/// then returns [`LinesError::Eof`].
///
/// `block_size` is the minimum capacity of `dst` and the most bytes asked
/// of `r` in one read. The buffer doubles while a single line does not fit,
/// up to about twice `max_line_len`.
///
/// # Errors
/// [`LinesError::TooLong`] when any line exceeds `max_line_len` bytes,
/// [`LinesError::Io`] when the source fails, [`LinesError::Eof`] on a clean
/// end of stream.
pub fn read_lines_block<R: Read + ?Sized>(
    r: &mut R,
    dst: &mut Vec<u8>,
    tail: &mut Vec<u8>,
    max_line_len: usize,
    block_size: usize,
) -> Result<(), LinesError> {
    dst.clear();
    if dst.capacity() < block_size {
        dst.reserve_exact(block_size);
    }
    dst.extend_from_slice(tail);
    tail.clear();

    loop {
        let start = dst.len();
        if start == dst.capacity() {
            dst.reserve(start.max(block_size));
        }
        // only the window handed to `read` is zero-filled
        let end = (start + block_size.max(1)).min(dst.capacity());
        dst.resize(end, 0);
        let n = match r.read(&mut dst[start..]) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {
                dst.truncate(start);
                continue;
            }
            Err(e) => {
                dst.truncate(start);
                return Err(LinesError::Io(e));
            }
        };
        dst.truncate(start + n);

        if n == 0 {
            if dst.is_empty() {
                return Err(LinesError::Eof);
            }
            // last line without a trailing newline
            check_line_lengths(dst, max_line_len)?;
            return Ok(());
        }

        match dst[start..].iter().rposition(|&b| b == b'\n') {
            Some(pos) => {
                let nl = start + pos;
                tail.extend_from_slice(&dst[nl + 1..]);
                dst.truncate(nl);
                check_line_lengths(dst, max_line_len)?;
                return Ok(());
            }
            None if dst.len() > max_line_len => {
                return Err(LinesError::TooLong { max: max_line_len });
            }
            None => {}
        }
    }
}

fn check_line_lengths(buf: &[u8], max_line_len: usize) -> Result<(), LinesError> {
    if buf.len() <= max_line_len {
        return Ok(());
    }
    if buf.split(|&b| b == b'\n').any(|line| line.len() > max_line_len) {
        return Err(LinesError::TooLong { max: max_line_len });
    }
    Ok(())
}
