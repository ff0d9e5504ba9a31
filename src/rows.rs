//! Decoded rows and the decoder seam.
//!
//! A [`Row`] holds the data points of one series. A [`Rows`] batch is what a
//! single raw block decodes into; it is pooled together with its work unit and
//! [`Rows::reset`] between uses, so callbacks must not keep references to it.
//!
//! The default [`JsonLineDecoder`] accepts one JSON object per line:
//!
//! ```text
//! {"metric":{"__name__":"up","job":"node"},"values":[1,0.5],"timestamps":[1700000000000,1700000015000]}
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Name of the tag carrying the metric name.
pub const METRIC_NAME_TAG: &str = "__name__";

/// Longest line prefix kept in a decode error message.
const MAX_SNIPPET_LEN: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Data points of one series.
///
/// `values` and `timestamps` always have equal length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    pub tags: Vec<Tag>,
    pub values: Vec<f64>,
    pub timestamps: Vec<i64>,
}

impl Row {
    /// The `__name__` tag value, if any.
    #[must_use]
    pub fn metric_name(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key == METRIC_NAME_TAG)
            .map(|t| t.value.as_str())
    }

    /// Series identifier in `name{k="v",...}` form.
    #[must_use]
    pub fn series_key(&self) -> String {
        self.to_string()
    }

    /// Number of data points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric_name().unwrap_or_default())?;
        f.write_str("{")?;
        let mut first = true;
        for tag in self.tags.iter().filter(|t| t.key != METRIC_NAME_TAG) {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{}={:?}", tag.key, tag.value)?;
        }
        f.write_str("}")
    }
}

/// A batch of rows decoded from one raw block.
#[derive(Debug, Default)]
pub struct Rows {
    rows: Vec<Row>,
}

impl Rows {
    /// Drop decoded rows, keeping the allocation.
    pub fn reset(&mut self) {
        self.rows.clear();
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Total data points across the batch.
    #[must_use]
    pub fn samples(&self) -> usize {
        self.rows.iter().map(Row::len).sum()
    }
}

/// Turns a raw block of complete lines into rows.
///
/// Implementations are shared by every decode worker, so they must be
/// stateless or internally synchronized. Rows are appended to `dst` in line
/// order; `dst` is empty on entry.
pub trait RowDecoder: Send + Sync {
    /// # Errors
    /// Returns [`Error::Decode`] for the first line that cannot be decoded.
    fn decode(&self, buf: &[u8], dst: &mut Rows) -> Result<()>;
}

/// Decoder for JSON-lines import data.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonLineDecoder;

#[derive(Deserialize)]
struct RawRow {
    metric: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    values: Vec<Option<f64>>,
    #[serde(default)]
    timestamps: Vec<i64>,
}

impl RowDecoder for JsonLineDecoder {
    fn decode(&self, buf: &[u8], dst: &mut Rows) -> Result<()> {
        for (idx, line) in buf.split(|&b| b == b'\n').enumerate() {
            let line = line.trim_ascii();
            if line.is_empty() {
                continue;
            }
            let row = decode_line(line).map_err(|reason| Error::Decode {
                line: idx + 1,
                reason,
                snippet: snippet(line),
            })?;
            dst.push(row);
        }
        Ok(())
    }
}

fn decode_line(line: &[u8]) -> std::result::Result<Row, String> {
    let raw: RawRow = serde_json::from_slice(line).map_err(|e| e.to_string())?;
    let metric = match raw.metric {
        Some(m) if !m.is_empty() => m,
        _ => return Err("missing `metric` object".into()),
    };
    if raw.values.is_empty() {
        return Err("missing `values` array".into());
    }
    if raw.timestamps.is_empty() {
        return Err("missing `timestamps` array".into());
    }
    if raw.values.len() != raw.timestamps.len() {
        return Err(format!(
            "`timestamps` array size must match `values` array size; got {}; want {}",
            raw.timestamps.len(),
            raw.values.len()
        ));
    }

    let mut tags = Vec::with_capacity(metric.len());
    for (key, value) in metric {
        let Value::String(value) = value else {
            return Err(format!("tag {key:?} must be a string, got {value}"));
        };
        tags.push(Tag { key, value });
    }
    // metric name first, remaining tags keep key order
    tags.sort_by(|a, b| {
        (b.key == METRIC_NAME_TAG)
            .cmp(&(a.key == METRIC_NAME_TAG))
            .then_with(|| a.key.cmp(&b.key))
    });

    Ok(Row {
        tags,
        values: raw.values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
        timestamps: raw.timestamps,
    })
}

fn snippet(line: &[u8]) -> String {
    let cut = line.len().min(MAX_SNIPPET_LEN);
    String::from_utf8_lossy(&line[..cut]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(s: &str) -> Result<Rows> {
        let mut rows = Rows::default();
        JsonLineDecoder.decode(s.as_bytes(), &mut rows)?;
        Ok(rows)
    }

    #[test]
    fn decodes_rows_in_line_order() {
        let rows = decode(concat!(
            r#"{"metric":{"__name__":"a","job":"x"},"values":[1,2],"timestamps":[10,20]}"#,
            "\n\n",
            r#"{"metric":{"job":"y","__name__":"b"},"values":[3],"timestamps":[30]}"#,
        ))
        .unwrap();
        let rows = rows.as_slice();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].metric_name(), Some("a"));
        assert_eq!(rows[0].values, vec![1.0, 2.0]);
        assert_eq!(rows[1].series_key(), r#"b{job="y"}"#);
        assert_eq!(rows[1].tags[0].key, METRIC_NAME_TAG);
    }

    #[test]
    fn null_value_is_nan() {
        let rows = decode(r#"{"metric":{"__name__":"a"},"values":[null],"timestamps":[1]}"#).unwrap();
        assert!(rows.as_slice()[0].values[0].is_nan());
    }

    #[test]
    fn length_mismatch_reports_line() {
        let err = decode(concat!(
            r#"{"metric":{"__name__":"a"},"values":[1],"timestamps":[1]}"#,
            "\n",
            r#"{"metric":{"__name__":"a"},"values":[1,2],"timestamps":[1]}"#,
        ))
        .unwrap_err();
        match err {
            Error::Decode { line, reason, .. } => {
                assert_eq!(line, 2);
                assert!(reason.contains("must match"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_metric_is_rejected() {
        let err = decode(r#"{"values":[1],"timestamps":[1]}"#).unwrap_err();
        assert!(err.to_string().contains("missing `metric`"));
    }

    #[test]
    fn rows_reset_keeps_capacity() {
        let mut rows = decode(r#"{"metric":{"__name__":"a"},"values":[1],"timestamps":[1]}"#).unwrap();
        assert_eq!(rows.samples(), 1);
        rows.reset();
        assert!(rows.is_empty());
    }
}
