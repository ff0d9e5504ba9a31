//! JSON-lines import bodies for tests.

use crate::rows::{JsonLineDecoder, Row, RowDecoder, Rows};
use serde_json::{Map, Value, json};

/// One import line for `name` with extra `tags`.
///
/// # Example
///
/// ```
/// use tsingest::testing::import_line;
///
/// let line = import_line("up", &[("job", "api")], &[1.0], &[1000]);
/// assert!(line.starts_with(r#"{"metric":{"#));
/// ```
#[must_use]
pub fn import_line(name: &str, tags: &[(&str, &str)], values: &[f64], timestamps: &[i64]) -> String {
    let mut metric = Map::new();
    metric.insert("__name__".into(), json!(name));
    for (k, v) in tags {
        metric.insert((*k).into(), json!(v));
    }
    json!({
        "metric": Value::Object(metric),
        "values": values,
        "timestamps": timestamps,
    })
    .to_string()
}

/// `n` distinct newline-terminated import lines with one to three points each.
#[must_use]
pub fn import_lines(n: usize) -> String {
    let mut out = String::new();
    for i in 0..n {
        let points = i % 3 + 1;
        let values: Vec<f64> = (0..points).map(|p| (i * 10 + p) as f64 / 4.0).collect();
        let timestamps: Vec<i64> = (0..points).map(|p| 1_700_000_000_000 + (i * 1000 + p) as i64).collect();
        let instance = format!("host-{}", i % 7);
        let series = i.to_string();
        out.push_str(&import_line(
            "node_cpu_seconds_total",
            &[("instance", instance.as_str()), ("series", series.as_str())],
            &values,
            &timestamps,
        ));
        out.push('\n');
    }
    out
}

/// Rows `body` decodes to in one pass, for comparison with parsed output.
///
/// # Panics
///
/// Panics if `body` is not valid import data.
#[must_use]
pub fn expected_rows(body: &str) -> Vec<Row> {
    let mut rows = Rows::default();
    JsonLineDecoder
        .decode(body.as_bytes(), &mut rows)
        .expect("fixture body must decode");
    rows.as_slice().to_vec()
}
