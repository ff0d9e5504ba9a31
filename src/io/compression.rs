//! Pluggable decompression for import streams.
//!
//! Import requests name their content encoding explicitly (an HTTP
//! `Content-Encoding` style label); files are detected by extension with a
//! magic-byte fallback. Both paths resolve to a [`CompressionCodec`] from a
//! process-wide registry.
//!
//! ## Built-in Codecs
//!
//! - **Gzip** (`gzip`, `x-gzip`, `.gz`) and **Deflate** (`deflate`, `zlib`)
//!   via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`zstd`, `.zst`) via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`bzip2`, `.bz2`) via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`xz`, `.xz`) via `xz2` (feature: `compression-xz`)
//!
//! The labels `""`, `none` and `identity` pass the source through untouched.
//!
//! ```
//! use tsingest::io::compression::uncompressed_reader;
//! use std::io::Read;
//! # fn main() -> tsingest::Result<()> {
//! let mut r = uncompressed_reader(&b"plain text\n"[..], "identity")?;
//! let mut s = String::new();
//! r.read_to_string(&mut s).unwrap();
//! assert_eq!(s, "plain text\n");
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

/// Boxed byte source handed to the stream parser.
pub type DynReader = Box<dyn Read + Send>;

/// Global codec registry; built-ins are installed on first use.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

const IDENTITY_ENCODINGS: &[&str] = &["", "none", "identity"];

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-gzip")]
        Arc::new(DeflateCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn registry() -> Vec<Arc<dyn CompressionCodec>> {
    if let Some(codecs) = CODEC_REGISTRY.read().as_ref() {
        return codecs.clone();
    }
    CODEC_REGISTRY
        .write()
        .get_or_insert_with(init_registry)
        .clone()
}

/// Register a custom codec. Later registrations do not shadow built-ins
/// that claim the same label.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    CODEC_REGISTRY
        .write()
        .get_or_insert_with(init_registry)
        .push(codec);
}

/// A decompression algorithm.
///
/// Implementations live in a global registry and are used from many streams
/// at once, hence `Send + Sync`.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// Lowercase encoding labels this codec answers to.
    fn encodings(&self) -> &[&str];

    /// File extensions, lowercase with the leading dot.
    fn extensions(&self) -> &[&str] {
        &[]
    }

    /// Signature at the start of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]> {
        None
    }

    /// Wrap `reader` with a decompressor.
    fn wrap_reader_dyn(&self, reader: DynReader) -> std::io::Result<DynReader>;
}

/// Codec registered for `encoding`; `None` for the identity encodings.
///
/// # Errors
/// [`Error::UnsupportedEncoding`] for an unknown label.
pub fn codec_for_encoding(encoding: &str) -> Result<Option<Arc<dyn CompressionCodec>>> {
    let label = encoding.trim().to_ascii_lowercase();
    if IDENTITY_ENCODINGS.contains(&label.as_str()) {
        return Ok(None);
    }
    registry()
        .into_iter()
        .find(|c| c.encodings().contains(&label.as_str()))
        .map(Some)
        .ok_or_else(|| Error::UnsupportedEncoding(encoding.to_string()))
}

/// Wrap `source` with the decompressor selected by `encoding`.
///
/// # Errors
/// [`Error::UnsupportedEncoding`] for an unknown label,
/// [`Error::Decompress`] if the codec rejects the stream up front.
pub fn uncompressed_reader<R: Read + Send + 'static>(source: R, encoding: &str) -> Result<DynReader> {
    match codec_for_encoding(encoding)? {
        None => Ok(Box::new(source)),
        Some(codec) => codec
            .wrap_reader_dyn(Box::new(source))
            .map_err(|source| Error::Decompress {
                encoding: codec.name().to_string(),
                source,
            }),
    }
}

fn detect_from_extension(path: &Path) -> Option<Arc<dyn CompressionCodec>> {
    let path_str = path.to_string_lossy().to_lowercase();
    registry()
        .into_iter()
        .find(|c| c.extensions().iter().any(|ext| path_str.ends_with(ext)))
}

/// Peek at the buffered head of `reader` without consuming it.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    registry()
        .into_iter()
        .find(|c| c.magic_bytes().is_some_and(|magic| buf.starts_with(magic)))
}

/// Wrap a file-like `reader` with the codec matching `path_hint`'s
/// extension, falling back to magic bytes, else pass it through.
///
/// # Errors
/// [`Error::Decompress`] if the detected codec rejects the stream.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<DynReader> {
    let wrap = |codec: Arc<dyn CompressionCodec>, r: DynReader| {
        codec.wrap_reader_dyn(r).map_err(|source| Error::Decompress {
            encoding: codec.name().to_string(),
            source,
        })
    };

    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        return wrap(codec, Box::new(reader));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        return wrap(codec, Box::new(buf_reader));
    }
    Ok(Box::new(buf_reader))
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn encodings(&self) -> &[&str] {
        &["gzip", "x-gzip"]
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: DynReader) -> std::io::Result<DynReader> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-gzip")]
struct DeflateCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for DeflateCodec {
    fn name(&self) -> &str {
        "deflate"
    }

    fn encodings(&self) -> &[&str] {
        &["deflate", "zlib"]
    }

    fn wrap_reader_dyn(&self, reader: DynReader) -> std::io::Result<DynReader> {
        Ok(Box::new(flate2::read::ZlibDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn encodings(&self) -> &[&str] {
        &["zstd"]
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: DynReader) -> std::io::Result<DynReader> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as DynReader)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn encodings(&self) -> &[&str] {
        &["bzip2"]
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x42, 0x5a, 0x68])
    }

    fn wrap_reader_dyn(&self, reader: DynReader) -> std::io::Result<DynReader> {
        Ok(Box::new(bzip2::read::BzDecoder::new(reader)))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn encodings(&self) -> &[&str] {
        &["xz"]
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader_dyn(&self, reader: DynReader) -> std::io::Result<DynReader> {
        Ok(Box::new(xz2::read::XzDecoder::new(reader)))
    }
}
