//! Byte-level input: decompression and line-block framing.

pub mod compression;
pub mod lines;

pub use compression::{auto_detect_reader, uncompressed_reader, DynReader};
pub use lines::{read_lines_block, LinesError};
