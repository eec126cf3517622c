//! SQL connection contract.
//!
//! `Connection` is the full surface the caching proxy decorates: the read
//! operations it intercepts, the write operations it invalidates after, and
//! everything else it forwards untouched. Implementations adapt a concrete
//! driver; the proxy and the tests only ever talk to this trait.

use mica_core::{MicaResult, Row, SqlValue};
use serde::{Deserialize, Serialize};

use crate::result::{RowIter, RowSet, ValueIter};

// ============================================================================
// SUPPORTING TYPES
// ============================================================================

/// Standard transaction isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionIsolation {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Default for TransactionIsolation {
    fn default() -> Self {
        TransactionIsolation::ReadCommitted
    }
}

/// Caller-supplied caching profile for a single query.
///
/// When a caller passes a profile to `execute_query`, it takes over result
/// caching for that call: the proxy steps aside entirely and delegates,
/// leaving the profile to whatever layer the caller wired underneath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryProfile {
    /// Lifetime of the cached result, in seconds.
    pub ttl_secs: u64,
    /// Explicit cache key; derived from the query when absent.
    pub key: Option<String>,
}

impl QueryProfile {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl_secs,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

// ============================================================================
// CONNECTION TRAIT
// ============================================================================

/// A synchronous SQL connection.
///
/// Reads take the SQL text and positional parameters and return progressively
/// richer projections of the same result set. Writes return the affected row
/// count. Transaction control mirrors the usual nesting model: savepoints by
/// name, a rollback-only latch, and an auto-commit flag.
pub trait Connection: Send + Sync {
    // === Reads ===

    /// First row of the result, or `None` when the result is empty.
    fn fetch_row(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Option<Row>>;

    /// Every row of the result.
    fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Vec<Row>>;

    /// First value of the first row, or `None` when the result is empty.
    fn fetch_scalar(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Option<SqlValue>>;

    /// First value of every row.
    fn fetch_column(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Vec<SqlValue>>;

    /// First two values of every row, as ordered pairs.
    fn fetch_key_value(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> MicaResult<Vec<(SqlValue, SqlValue)>>;

    /// First value of every row paired with the remainder of that row.
    fn fetch_indexed(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Vec<(SqlValue, Row)>>;

    /// Rows as an owning iterator.
    fn iterate(&self, sql: &str, params: &[SqlValue]) -> MicaResult<RowIter>;

    /// First column as an owning iterator.
    fn iterate_column(&self, sql: &str, params: &[SqlValue]) -> MicaResult<ValueIter>;

    /// Execute a query and return a replayable cursor over its rows.
    ///
    /// `profile` hands caching control to the caller for this one call; see
    /// [`QueryProfile`].
    fn execute_query(
        &self,
        sql: &str,
        params: &[SqlValue],
        profile: Option<&QueryProfile>,
    ) -> MicaResult<RowSet>;

    // === Writes ===

    /// Insert one row of column/value pairs. Returns the affected row count.
    fn insert(&self, table: &str, values: &Row) -> MicaResult<u64>;

    /// Update rows matching `criteria` (ANDed column/value equalities).
    fn update(&self, table: &str, values: &Row, criteria: &Row) -> MicaResult<u64>;

    /// Delete rows matching `criteria`.
    fn delete(&self, table: &str, criteria: &Row) -> MicaResult<u64>;

    /// Execute a raw write statement. Returns the affected row count.
    fn execute_statement(&self, sql: &str, params: &[SqlValue]) -> MicaResult<u64>;

    // === Transactions ===

    fn begin_transaction(&self) -> MicaResult<()>;

    fn commit(&self) -> MicaResult<()>;

    fn rollback(&self) -> MicaResult<()>;

    fn is_transaction_active(&self) -> bool;

    /// Current transaction nesting depth; zero outside any transaction.
    fn transaction_nesting_level(&self) -> u32;

    fn create_savepoint(&self, name: &str) -> MicaResult<()>;

    fn release_savepoint(&self, name: &str) -> MicaResult<()>;

    fn rollback_to_savepoint(&self, name: &str) -> MicaResult<()>;

    /// Mark the active transaction so that only a rollback can end it.
    fn set_rollback_only(&self) -> MicaResult<()>;

    /// Whether the active transaction is marked rollback-only. Fails when no
    /// transaction is active.
    fn is_rollback_only(&self) -> MicaResult<bool>;

    fn set_auto_commit(&self, auto_commit: bool) -> MicaResult<()>;

    fn is_auto_commit(&self) -> bool;

    fn transaction_isolation(&self) -> TransactionIsolation;

    fn set_transaction_isolation(&self, level: TransactionIsolation) -> MicaResult<()>;

    // === Connection state and metadata ===

    fn is_connected(&self) -> bool;

    fn close(&self);

    /// Quote a string literal for inline use in SQL text.
    fn quote(&self, value: &str) -> String;

    /// Identity generated by the most recent insert, if the driver tracks one.
    fn last_insert_id(&self) -> MicaResult<Option<SqlValue>>;

    /// Name of the currently selected database, if any.
    fn database(&self) -> MicaResult<Option<String>>;

    /// Names of the tables visible to this connection.
    fn table_names(&self) -> MicaResult<Vec<String>>;

    /// Convert a value into its database representation for `type_name`.
    fn convert_to_database(&self, value: &SqlValue, type_name: &str) -> MicaResult<SqlValue>;

    /// Convert a database value back into its runtime representation.
    fn convert_from_database(&self, value: &SqlValue, type_name: &str) -> MicaResult<SqlValue>;
}

// ============================================================================
// EXTENSION TRAIT
// ============================================================================

/// Convenience operations derived from the base [`Connection`] contract.
pub trait ConnectionExt: Connection {
    /// Run `f` inside a transaction: begin, then commit on success or roll
    /// back on failure. The closure's error is returned unchanged; a failure
    /// of the rollback itself is discarded in its favor.
    fn with_transaction<T, F>(&self, f: F) -> MicaResult<T>
    where
        F: FnOnce(&Self) -> MicaResult<T>,
        Self: Sized,
    {
        self.begin_transaction()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = self.rollback();
                Err(err)
            }
        }
    }
}

impl<C: Connection> ConnectionExt for C {}

// ============================================================================
// TESTS
// ============================================================================
