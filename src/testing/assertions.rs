//! Assertions over decoded rows.
//!
//! Batches may be delivered in any order, so comparisons work on multisets
//! keyed by each row's rendered form.

use crate::rows::Row;
use std::collections::BTreeMap;

/// Canonical text form of a row, stable across runs; NaN values compare
/// equal to each other.
#[must_use]
pub fn row_fingerprint(row: &Row) -> String {
    let values: Vec<String> = row
        .values
        .iter()
        .map(|v| if v.is_nan() { "NaN".to_string() } else { v.to_string() })
        .collect();
    format!("{} {:?} [{}]", row.series_key(), row.timestamps, values.join(","))
}

fn counts(rows: &[Row]) -> BTreeMap<String, usize> {
    let mut m = BTreeMap::new();
    for row in rows {
        *m.entry(row_fingerprint(row)).or_insert(0) += 1;
    }
    m
}

/// Assert that two row sets are equal as multisets.
///
/// # Panics
///
/// Panics if the sets differ, listing missing and unexpected rows.
pub fn assert_same_rows(actual: &[Row], expected: &[Row]) {
    let a = counts(actual);
    let e = counts(expected);
    if a == e {
        return;
    }
    let missing: Vec<_> = e
        .iter()
        .filter(|(k, n)| a.get(*k).copied().unwrap_or(0) < **n)
        .map(|(k, _)| k)
        .collect();
    let extra: Vec<_> = a
        .iter()
        .filter(|(k, n)| e.get(*k).copied().unwrap_or(0) < **n)
        .map(|(k, _)| k)
        .collect();
    panic!(
        "Row set mismatch:\n  Expected rows: {}\n  Actual rows: {}\n  Missing: {missing:?}\n  Extra: {extra:?}",
        expected.len(),
        actual.len()
    );
}

/// Assert that every batch keeps the input order of its rows, given the
/// full expected row sequence.
///
/// # Panics
///
/// Panics if rows of some batch appear out of input order.
pub fn assert_batches_in_input_order(batches: &[Vec<Row>], expected: &[Row]) {
    let position: BTreeMap<String, usize> = expected
        .iter()
        .enumerate()
        .map(|(i, r)| (row_fingerprint(r), i))
        .collect();
    for (b, batch) in batches.iter().enumerate() {
        let idx: Vec<usize> = batch
            .iter()
            .map(|r| position.get(&row_fingerprint(r)).copied().unwrap_or(usize::MAX))
            .collect();
        assert!(
            idx.windows(2).all(|w| w[0] < w[1]),
            "Batch {b} is out of input order: positions {idx:?}"
        );
    }
}
