//! Materialized result-set replay.
//!
//! Cached reads never hold a live database cursor. The payload that comes
//! back from the store is a fully materialized row list, and `RowSet`
//! replays it through the usual cursor contract: sequential fetches, whole
//! set views, and an explicit rewind. Unlike a single-pass database cursor,
//! replay is restartable.

use mica_core::{Row, SqlValue};

// ============================================================================
// ROW SET
// ============================================================================

/// A replayable cursor over an already materialized list of rows.
///
/// Fetch-next operations advance a zero-based index and return `None` once
/// the rows are exhausted. Whole-set views (`fetch_all_rows` and friends)
/// neither consult nor move the index. `reset` rewinds to the first row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    rows: Vec<Row>,
    cursor: usize,
}

impl RowSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows, cursor: 0 }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Next row as ordered values, advancing the cursor.
    pub fn fetch_values(&mut self) -> Option<Vec<SqlValue>> {
        self.advance().map(Row::values)
    }

    /// Next row as a keyed record, advancing the cursor.
    pub fn fetch_row(&mut self) -> Option<Row> {
        self.advance().cloned()
    }

    /// First value of the next row, advancing the cursor.
    ///
    /// A zero-column row yields `None`, the same sentinel as end-of-rows;
    /// the cursor still moves past it.
    pub fn fetch_one(&mut self) -> Option<SqlValue> {
        self.advance().and_then(Row::first_value).cloned()
    }

    /// Every row as ordered values. Does not touch the cursor.
    pub fn fetch_all_values(&self) -> Vec<Vec<SqlValue>> {
        self.rows.iter().map(Row::values).collect()
    }

    /// Every row as a keyed record. Does not touch the cursor.
    pub fn fetch_all_rows(&self) -> Vec<Row> {
        self.rows.clone()
    }

    /// First value of every row. Does not touch the cursor.
    pub fn fetch_first_column(&self) -> Vec<SqlValue> {
        self.rows
            .iter()
            .filter_map(|row| row.first_value().cloned())
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column count of the first row; zero when the set is empty.
    pub fn column_count(&self) -> usize {
        self.rows.first().map_or(0, Row::len)
    }

    /// Rewind the cursor to the first row.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    fn advance(&mut self) -> Option<&Row> {
        let row = self.rows.get(self.cursor)?;
        self.cursor += 1;
        Some(row)
    }
}

impl From<Vec<Row>> for RowSet {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows)
    }
}

// ============================================================================
// ITERATOR FAMILY
// ============================================================================

/// Owning iterator over materialized rows.
///
/// The iterate family of reads is lazy only in shape: the rows were already
/// fully read into memory (or replayed from the cache) before the iterator
/// exists, and a consumed iterator is restarted by recreating it.
#[derive(Debug)]
pub struct RowIter {
    inner: std::vec::IntoIter<Row>,
}

impl RowIter {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            inner: rows.into_iter(),
        }
    }
}

impl Iterator for RowIter {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RowIter {}

impl From<Vec<Row>> for RowIter {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows)
    }
}

/// Owning iterator over the first value of each materialized row.
#[derive(Debug)]
pub struct ValueIter {
    inner: std::vec::IntoIter<SqlValue>,
}

impl ValueIter {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self {
            inner: values.into_iter(),
        }
    }
}

impl Iterator for ValueIter {
    type Item = SqlValue;

    fn next(&mut self) -> Option<SqlValue> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for ValueIter {}

impl From<Vec<SqlValue>> for ValueIter {
    fn from(values: Vec<SqlValue>) -> Self {
        Self::new(values)
    }
}

// ============================================================================
// TESTS
// ============================================================================
