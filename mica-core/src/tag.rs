//! Invalidation tag model.
//!
//! A tag is a sanitized string naming an invalidation scope: a bare table
//! name, or `<table>_<id>` for a single row. Tags are derived on the fly
//! from SQL text, write criteria, or entity identity; they are never stored
//! by this layer itself.

use crate::value::SqlValue;

/// Characters stripped from raw identifiers before they become tags.
/// Backticks and quotes come from dialect-specific identifier quoting,
/// the control characters from multi-line SQL.
const STRIPPED: [char; 6] = ['`', '"', '\'', '\t', '\r', '\n'];

/// Sanitize a raw identifier into tag form: strip quoting and control
/// characters, then trim surrounding whitespace. Interior characters other
/// than the stripped set are kept as-is (`table.name`, `table$name` and
/// similar are all legal tags).
pub fn sanitize_tag(raw: &str) -> String {
    raw.chars()
        .filter(|c| !STRIPPED.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Identifiers beginning with `#` follow the temporary-table convention and
/// never become tags.
pub fn is_real_table(name: &str) -> bool {
    !name.starts_with('#')
}

/// Row-scoped tag: `<table>_<id>`.
pub fn row_tag(table_tag: &str, id: &SqlValue) -> String {
    format!("{}_{}", table_tag, id)
}

// ============================================================================
// TESTS
// ============================================================================
