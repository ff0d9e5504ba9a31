//! Error type shared by every stage of the import path.
//!
//! Read and framing failures are terminal for a stream. Decode and callback
//! failures are latched by the stream context and surfaced only when no read
//! failure happened.

use std::path::PathBuf;
use std::time::Duration;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported encoding {0:?}")]
    UnsupportedEncoding(String),

    #[error("cannot decode import data with {encoding} codec: {source}")]
    Decompress {
        encoding: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read import data: {0}")]
    Read(#[source] std::io::Error),

    #[error("cannot read import data: too long line: more than {max} bytes")]
    LineTooLong { max: usize },

    #[error(
        "cannot process insert request for {:.3} seconds because {capacity} concurrent insert requests are executed",
        waited.as_secs_f64()
    )]
    LimiterTimeout { waited: Duration, capacity: usize },

    #[error("cannot unmarshal import line {line}: {reason}; line contents: {snippet:?}")]
    Decode {
        line: usize,
        reason: String,
        snippet: String,
    },

    #[error("error when processing imported data: {0:#}")]
    Callback(anyhow::Error),

    #[error("invalid parser config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// True for failures that stop the read loop at the source: I/O, framing
    /// and limiter timeouts.
    #[must_use]
    pub fn is_read_error(&self) -> bool {
        matches!(
            self,
            Self::Read(_) | Self::LineTooLong { .. } | Self::LimiterTimeout { .. }
        )
    }
}
