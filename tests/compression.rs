//! Compressed import streams, by encoding label and by file detection.

use anyhow::Result;
use std::io::Cursor;
use tsingest::testing::*;
use tsingest::{Error, Row};

#[test]
fn unknown_encoding_is_rejected_before_reading() -> Result<()> {
    let p = TestParser::new(1)?;
    let collector = RowCollector::new();
    let err = p
        .parse(Cursor::new(import_lines(3)), "snappy", collector.callback())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedEncoding(ref e) if e == "snappy"), "{err}");
    assert_eq!(collector.calls(), 0);
    assert_eq!(p.metrics().snapshot()["read_calls_total"], 0);
    Ok(())
}

#[test]
fn identity_labels_pass_through() -> Result<()> {
    let body = import_lines(12);
    let p = TestParser::new(2)?;
    for label in ["", "none", "identity", " Identity "] {
        let collector = RowCollector::new();
        p.parse(Cursor::new(body.clone()), label, collector.callback())?;
        assert_same_rows(&collector.rows(), &expected_rows(&body));
    }
    Ok(())
}

#[cfg(feature = "compression-gzip")]
mod gzip {
    use super::*;
    use flate2::Compression;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use std::io::Write;

    fn gzip(body: &str) -> Result<Vec<u8>> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(body.as_bytes())?;
        Ok(enc.finish()?)
    }

    #[test]
    fn gzip_body_parses() -> Result<()> {
        let body = import_lines(300);
        let p = TestParser::new(3)?;
        for label in ["gzip", "x-gzip", "GZIP"] {
            let collector = RowCollector::new();
            p.parse(Cursor::new(gzip(&body)?), label, collector.callback())?;
            assert_same_rows(&collector.rows(), &expected_rows(&body));
        }
        Ok(())
    }

    #[test]
    fn concatenated_gzip_members_are_read_in_full() -> Result<()> {
        let first = import_lines(10);
        let second = import_lines(25);
        let mut data = gzip(&first)?;
        data.extend(gzip(&second)?);

        let p = TestParser::new(2)?;
        let collector = RowCollector::new();
        p.parse(Cursor::new(data), "gzip", collector.callback())?;
        assert_eq!(collector.rows().len(), 35);
        Ok(())
    }

    #[test]
    fn deflate_body_parses() -> Result<()> {
        let body = import_lines(80);
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(body.as_bytes())?;
        let data = enc.finish()?;

        let p = TestParser::new(2)?;
        let collector = RowCollector::new();
        p.parse(Cursor::new(data), "deflate", collector.callback())?;
        assert_same_rows(&collector.rows(), &expected_rows(&body));
        Ok(())
    }

    #[test]
    fn corrupt_gzip_is_a_read_error() -> Result<()> {
        let mut data = gzip(&import_lines(50))?;
        let mid = data.len() / 2;
        data.truncate(mid);

        let p = TestParser::new(1)?;
        let err = p
            .parse(Cursor::new(data), "gzip", |_rows: &[Row]| Ok(()))
            .unwrap_err();
        assert!(err.is_read_error(), "{err}");
        Ok(())
    }

    #[test]
    fn parse_file_detects_gz_extension() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("import.jsonl.gz");
        let body = import_lines(40);
        std::fs::write(&path, gzip(&body)?)?;

        let p = TestParser::new(2)?;
        let collector = RowCollector::new();
        p.parse_file(&path, collector.callback())?;
        assert_same_rows(&collector.rows(), &expected_rows(&body));
        Ok(())
    }
}

#[cfg(feature = "compression-zstd")]
mod zstd_codec {
    use super::*;

    #[test]
    fn zstd_body_parses() -> Result<()> {
        let body = import_lines(150);
        let data = zstd::encode_all(body.as_bytes(), 3)?;

        let p = TestParser::new(2)?;
        let collector = RowCollector::new();
        p.parse(Cursor::new(data), "zstd", collector.callback())?;
        assert_same_rows(&collector.rows(), &expected_rows(&body));
        Ok(())
    }

    #[test]
    fn parse_file_detects_zstd_by_magic() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("import-without-extension");
        let body = import_lines(30);
        std::fs::write(&path, zstd::encode_all(body.as_bytes(), 1)?)?;

        let p = TestParser::new(1)?;
        let collector = RowCollector::new();
        p.parse_file(&path, collector.callback())?;
        assert_same_rows(&collector.rows(), &expected_rows(&body));
        Ok(())
    }
}

#[cfg(feature = "compression-bzip2")]
#[test]
fn bzip2_body_parses() -> Result<()> {
    use bzip2::Compression;
    use bzip2::write::BzEncoder;
    use std::io::Write;

    let body = import_lines(60);
    let mut enc = BzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(body.as_bytes())?;
    let data = enc.finish()?;

    let p = TestParser::new(2)?;
    let collector = RowCollector::new();
    p.parse(Cursor::new(data), "bzip2", collector.callback())?;
    assert_same_rows(&collector.rows(), &expected_rows(&body));
    Ok(())
}

#[cfg(feature = "compression-xz")]
#[test]
fn xz_body_parses() -> Result<()> {
    use std::io::Write;
    use xz2::write::XzEncoder;

    let body = import_lines(60);
    let mut enc = XzEncoder::new(Vec::new(), 6);
    enc.write_all(body.as_bytes())?;
    let data = enc.finish()?;

    let p = TestParser::new(2)?;
    let collector = RowCollector::new();
    p.parse(Cursor::new(data), "xz", collector.callback())?;
    assert_same_rows(&collector.rows(), &expected_rows(&body));
    Ok(())
}
