//! SQL scalar and row representation.
//!
//! Parameters, cached payloads, and replayed result sets all move through
//! these two types. Serialization is byte-stable: enum variants are
//! externally tagged and row columns keep their SELECT order, so the same
//! logical value always produces the same bytes. Floats travel as their
//! IEEE 754 bit pattern, which gives non-finite values an encoding and
//! keeps distinct values distinct.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SQL VALUES
// ============================================================================

/// A single SQL scalar crossing the connection boundary.
///
/// The serialized form carries the variant tag, so two parameters that render
/// identically but differ in type (`1` vs `"1"`) never produce the same
/// bytes. Cache keys rely on this: the value is its own type hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(#[serde(with = "float_bits")] f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Whether this value may stand in for a primary key in a row-scoped
    /// invalidation tag. `Null` and `Bytes` never do.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            SqlValue::Bool(_) | SqlValue::Int(_) | SqlValue::Float(_) | SqlValue::Text(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Borrow the text content, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The integer content, if this is an `Int` value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => Ok(()),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlValue::Null,
        }
    }
}

/// Serde representation for `Float`: the IEEE 754 bit pattern as a `u64`.
/// JSON has no number form for NaN or the infinities (`serde_json` renders
/// them as `null`); the bit pattern covers every value and keeps distinct
/// values distinct.
mod float_bits {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        value.to_bits().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        u64::deserialize(deserializer).map(f64::from_bits)
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// One result row: an ordered list of `(column, value)` pairs.
///
/// Column order is the SELECT order and is preserved through serialization.
/// Lookup by name scans the pair list; rows are small and this keeps the
/// representation deterministic without an ordered-map dependency.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row(Vec<(String, SqlValue)>);

impl Row {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_pairs<I, C, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, V)>,
        C: Into<String>,
        V: Into<SqlValue>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(c, v)| (c.into(), v.into()))
                .collect(),
        )
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.0.push((column.into(), value.into()));
    }

    /// First value bound to `column`, if present.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Column names in SELECT order.
    pub fn columns(&self) -> Vec<&str> {
        self.0.iter().map(|(c, _)| c.as_str()).collect()
    }

    /// Values in SELECT order, cloned.
    pub fn values(&self) -> Vec<SqlValue> {
        self.0.iter().map(|(_, v)| v.clone()).collect()
    }

    /// The value in the first column, if the row has any columns.
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.0.first().map(|(_, v)| v)
    }

    /// The value at a zero-based column position.
    pub fn value_at(&self, index: usize) -> Option<&SqlValue> {
        self.0.get(index).map(|(_, v)| v)
    }

    /// Split off the first column: its value plus a row of the remaining
    /// columns. Used by indexed fetches, where the first column becomes the
    /// index and the rest stay a keyed record.
    pub fn split_first(&self) -> Option<(SqlValue, Row)> {
        let (_, first) = self.0.first()?;
        let rest = Row(self.0[1..].to_vec());
        Some((first.clone(), rest))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, SqlValue)> {
        self.0.iter()
    }
}

impl IntoIterator for Row {
    type Item = (String, SqlValue);
    type IntoIter = std::vec::IntoIter<(String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
