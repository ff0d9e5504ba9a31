//! End-to-end behavior of `Parser::parse`: delivery, error precedence and
//! completion.

use anyhow::Result;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tsingest::scheduler::Job;
use tsingest::testing::*;
use tsingest::{Error, ParserConfig, RayonScheduler, Row, Scheduler};

/// Counts jobs on their way to a rayon pool.
struct CountingScheduler {
    inner: RayonScheduler,
    scheduled: Arc<AtomicUsize>,
}

impl Scheduler for CountingScheduler {
    fn schedule(&self, job: Job) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
        self.inner.schedule(job);
    }
}

fn counting_parser(workers: usize, block_size: usize) -> Result<(tsingest::Parser, Arc<AtomicUsize>)> {
    let scheduled = Arc::new(AtomicUsize::new(0));
    let parser = tsingest::Parser::builder()
        .config(ParserConfig::default().with_block_size(block_size))
        .limiter(tsingest::ConcurrencyLimiter::unlimited())
        .scheduler(Arc::new(CountingScheduler {
            inner: RayonScheduler::new(workers)?,
            scheduled: Arc::clone(&scheduled),
        }))
        .build()?;
    Ok((parser, scheduled))
}

#[test]
fn empty_stream_delivers_nothing() -> Result<()> {
    let p = TestParser::new(2)?;
    let collector = RowCollector::new();
    p.parse(Cursor::new(Vec::<u8>::new()), "", collector.callback())?;
    assert_eq!(collector.calls(), 0);
    Ok(())
}

#[test]
fn all_rows_round_trip() -> Result<()> {
    let body = import_lines(500);
    let p = TestParser::new(4)?;
    let batches = p.collect(Cursor::new(body.clone()))?;
    assert!(batches.len() > 1, "small blocks should split the body");

    let expected = expected_rows(&body);
    let rows: Vec<Row> = batches.iter().flatten().cloned().collect();
    assert_same_rows(&rows, &expected);
    assert_batches_in_input_order(&batches, &expected);
    Ok(())
}

#[test]
fn missing_trailing_newline_keeps_last_row() -> Result<()> {
    let body = import_lines(3);
    let trimmed = body.trim_end().to_string();
    let p = TestParser::new(1)?;
    let rows: Vec<Row> = p.collect(Cursor::new(trimmed))?.into_iter().flatten().collect();
    assert_same_rows(&rows, &expected_rows(&body));
    Ok(())
}

#[test]
fn tiny_reads_are_reassembled_into_lines() -> Result<()> {
    let body = import_lines(60);
    let p = TestParser::new(3)?;
    let rows: Vec<Row> = p
        .collect(ChunkedReader::new(body.clone(), 7))?
        .into_iter()
        .flatten()
        .collect();
    assert_same_rows(&rows, &expected_rows(&body));
    Ok(())
}

#[test]
fn warm_context_matches_cold_context() -> Result<()> {
    let body = import_lines(200);
    let p = TestParser::new(1)?;
    let cold = p.collect(Cursor::new(body.clone()))?;
    let warm = p.collect(Cursor::new(body.clone()))?;
    assert_eq!(cold.len(), warm.len());
    let cold: Vec<Row> = cold.into_iter().flatten().collect();
    let warm: Vec<Row> = warm.into_iter().flatten().collect();
    assert_same_rows(&warm, &cold);
    Ok(())
}

#[test]
fn too_long_line_fails_and_is_never_delivered() -> Result<()> {
    let long_value = "x".repeat(4096);
    let mut body = import_lines(20);
    body.push_str(&import_line("oversized", &[("pad", long_value.as_str())], &[1.0], &[1]));
    body.push('\n');
    body.push_str(&import_lines(20));

    let p = TestParser::with_config(
        ParserConfig::default().with_max_line_len(1024).with_block_size(128),
        2,
    )?;
    let collector = RowCollector::new();
    let err = p
        .parse(Cursor::new(body), "", collector.callback())
        .unwrap_err();

    assert!(matches!(err, Error::LineTooLong { max: 1024 }), "{err}");
    assert!(err.to_string().contains("too long line"));
    assert!(
        collector
            .rows()
            .iter()
            .all(|r| r.metric_name() != Some("oversized"))
    );
    Ok(())
}

#[test]
fn callback_error_does_not_drop_dispatched_work() -> Result<()> {
    let (p, scheduled) = counting_parser(1, 64)?;
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let err = p
        .parse(Cursor::new(import_lines(300)), "", move |_rows: &[Row]| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("rejected first batch");
            }
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, Error::Callback(_)));
    assert!(err.to_string().contains("rejected first batch"), "{err}");
    assert!(scheduled.load(Ordering::SeqCst) >= 1);
    assert_eq!(calls.load(Ordering::SeqCst), scheduled.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn first_callback_error_wins() -> Result<()> {
    let (p, scheduled) = counting_parser(1, 64)?;
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let err = p
        .parse(
            ChunkedReader::new(import_lines(100), 512).with_delay(Duration::from_millis(1)),
            "",
            move |_rows: &[Row]| {
                let n = seen.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(2));
                anyhow::bail!("call {n} failed")
            },
        )
        .unwrap_err();

    assert!(err.to_string().contains("call 0 failed"), "{err}");
    assert_eq!(calls.load(Ordering::SeqCst), scheduled.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn read_error_masks_earlier_callback_error() -> Result<()> {
    let body = import_lines(5);
    let len = body.len();
    // one block holds the whole body, the next read fails
    let p = TestParser::with_config(ParserConfig::default(), 2)?;
    let err = p
        .parse(
            FailingReader::new(body, len, "connection reset by peer")
                .with_delay(Duration::from_millis(150)),
            "",
            |_rows: &[Row]| {
                std::thread::sleep(Duration::from_millis(20));
                anyhow::bail!("storage unavailable")
            },
        )
        .unwrap_err();

    assert!(matches!(err, Error::Read(_)), "{err}");
    assert!(err.to_string().contains("connection reset by peer"));
    Ok(())
}

#[test]
fn decode_error_is_reported_with_line_context() -> Result<()> {
    let mut body = import_lines(2);
    body.push_str("{\"metric\":{\"__name__\":\"broken\"},\"values\":[1,2],\"timestamps\":[1]}\n");
    let p = TestParser::with_config(ParserConfig::default(), 1)?;
    let collector = RowCollector::new();
    let err = p
        .parse(Cursor::new(body), "", collector.callback())
        .unwrap_err();

    match err {
        Error::Decode { line, snippet, .. } => {
            assert_eq!(line, 3);
            assert!(snippet.contains("broken"));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[test]
fn no_callback_runs_after_parse_returns() -> Result<()> {
    let (p, scheduled) = counting_parser(4, 64)?;
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    p.parse(Cursor::new(import_lines(200)), "", move |_rows: &[Row]| {
        std::thread::sleep(Duration::from_millis(3));
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })?;

    let at_return = calls.load(Ordering::SeqCst);
    assert_eq!(at_return, scheduled.load(Ordering::SeqCst));
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(calls.load(Ordering::SeqCst), at_return);
    Ok(())
}

#[test]
fn metrics_count_reads_and_rows() -> Result<()> {
    let body = import_lines(50);
    let expected_samples: usize = expected_rows(&body).iter().map(Row::len).sum();
    let p = TestParser::new(2)?;
    let batches = p.collect(Cursor::new(body))?;

    let snap = p.metrics().snapshot();
    assert_eq!(snap["rows_read_total"], expected_samples as u64);
    assert_eq!(snap["read_calls_total"], batches.len() as u64 + 1);
    assert_eq!(snap["read_errors_total"], 0);
    Ok(())
}

#[test]
fn parse_file_reads_plain_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("import.jsonl");
    let body = import_lines(40);
    std::fs::write(&path, &body)?;

    let p = TestParser::new(2)?;
    let collector = RowCollector::new();
    p.parse_file(&path, collector.callback())?;
    assert_same_rows(&collector.rows(), &expected_rows(&body));
    Ok(())
}

#[test]
fn parse_file_missing_path() -> Result<()> {
    let p = TestParser::new(1)?;
    let err = p
        .parse_file("/definitely/not/here.jsonl", |_rows: &[Row]| Ok(()))
        .unwrap_err();
    assert!(matches!(err, Error::Open { .. }));
    Ok(())
}

#[test]
fn process_wide_parse_works() -> Result<()> {
    let body = import_lines(10);
    let collector = RowCollector::new();
    tsingest::parse(Cursor::new(body.clone()), "identity", collector.callback())?;
    assert_same_rows(&collector.rows(), &expected_rows(&body));
    Ok(())
}
