//! In-memory mock connection for testing.
//!
//! `MockConnection` serves canned rows keyed by exact SQL text, journals
//! every write, counts how often each query actually executes, and keeps
//! real transaction state (nesting depth, savepoints, the rollback-only
//! latch, auto-commit, closed). Failures are scripted per query or per
//! write target.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use mica_core::{ConnectionError, MicaResult, Row, SqlValue};

use crate::connection::{Connection, QueryProfile, TransactionIsolation};
use crate::result::{RowIter, RowSet, ValueIter};

/// One recorded write, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCall {
    Insert {
        table: String,
        values: Row,
    },
    Update {
        table: String,
        values: Row,
        criteria: Row,
    },
    Delete {
        table: String,
        criteria: Row,
    },
    Statement {
        sql: String,
        params: Vec<SqlValue>,
    },
}

/// Scripted in-memory connection.
///
/// Reads return the rows registered for the exact SQL text, or an empty
/// result when nothing is registered. Writes succeed with one affected row
/// unless the table (or raw statement text) is scripted to fail.
#[derive(Debug)]
pub struct MockConnection {
    rows: RwLock<HashMap<String, Vec<Row>>>,
    tables: RwLock<Vec<String>>,
    failing_queries: RwLock<HashSet<String>>,
    failing_statements: RwLock<HashSet<String>>,
    query_counts: RwLock<HashMap<String, u64>>,
    writes: RwLock<Vec<WriteCall>>,
    tx_depth: Mutex<u32>,
    savepoints: Mutex<Vec<String>>,
    isolation: Mutex<TransactionIsolation>,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    rollback_only: AtomicBool,
    auto_commit: AtomicBool,
    closed: AtomicBool,
    insert_sequence: AtomicI64,
    last_insert: Mutex<Option<i64>>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            tables: RwLock::new(Vec::new()),
            failing_queries: RwLock::new(HashSet::new()),
            failing_statements: RwLock::new(HashSet::new()),
            query_counts: RwLock::new(HashMap::new()),
            writes: RwLock::new(Vec::new()),
            tx_depth: Mutex::new(0),
            savepoints: Mutex::new(Vec::new()),
            isolation: Mutex::new(TransactionIsolation::default()),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            rollback_only: AtomicBool::new(false),
            auto_commit: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            insert_sequence: AtomicI64::new(0),
            last_insert: Mutex::new(None),
        }
    }
}

impl MockConnection {
    /// Create a new mock connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rows that `sql` returns.
    pub fn canned_rows(&self, sql: impl Into<String>, rows: Vec<Row>) {
        self.rows.write().unwrap().insert(sql.into(), rows);
    }

    /// Register the names reported by `table_names`.
    pub fn set_tables(&self, tables: Vec<String>) {
        *self.tables.write().unwrap() = tables;
    }

    /// Make every read of `sql` fail.
    pub fn fail_queries(&self, sql: impl Into<String>) {
        self.failing_queries.write().unwrap().insert(sql.into());
    }

    /// Make writes against `target` fail: the table name for structured
    /// writes, the statement text for raw statements.
    pub fn fail_statements(&self, target: impl Into<String>) {
        self.failing_statements.write().unwrap().insert(target.into());
    }

    /// Clear scripted failures, keeping canned rows and journals.
    pub fn clear_failures(&self) {
        self.failing_queries.write().unwrap().clear();
        self.failing_statements.write().unwrap().clear();
    }

    /// How many times `sql` actually executed against this connection.
    pub fn query_count(&self, sql: &str) -> u64 {
        self.query_counts
            .read()
            .unwrap()
            .get(sql)
            .copied()
            .unwrap_or(0)
    }

    /// Total read executions across all queries.
    pub fn total_queries(&self) -> u64 {
        self.query_counts.read().unwrap().values().sum()
    }

    /// Every recorded write, in call order.
    pub fn writes(&self) -> Vec<WriteCall> {
        self.writes.read().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.read().unwrap().len()
    }

    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn rollback_count(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    /// Clear journals and counters, keeping canned rows and scripts.
    pub fn clear_activity(&self) {
        self.query_counts.write().unwrap().clear();
        self.writes.write().unwrap().clear();
        self.commits.store(0, Ordering::Relaxed);
        self.rollbacks.store(0, Ordering::Relaxed);
    }

    fn ensure_open(&self) -> MicaResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(ConnectionError::Closed.into());
        }
        Ok(())
    }

    fn run_read(&self, sql: &str) -> MicaResult<Vec<Row>> {
        self.ensure_open()?;
        if self.failing_queries.read().unwrap().contains(sql) {
            return Err(ConnectionError::QueryFailed {
                sql: sql.to_string(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }
        *self
            .query_counts
            .write()
            .unwrap()
            .entry(sql.to_string())
            .or_insert(0) += 1;
        Ok(self.rows.read().unwrap().get(sql).cloned().unwrap_or_default())
    }

    fn check_write(&self, target: &str, statement: String) -> MicaResult<()> {
        self.ensure_open()?;
        if self.failing_statements.read().unwrap().contains(target) {
            return Err(ConnectionError::StatementFailed {
                sql: statement,
                reason: "scripted failure".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    fn fetch_row(&self, sql: &str, _params: &[SqlValue]) -> MicaResult<Option<Row>> {
        Ok(self.run_read(sql)?.into_iter().next())
    }

    fn fetch_all(&self, sql: &str, _params: &[SqlValue]) -> MicaResult<Vec<Row>> {
        self.run_read(sql)
    }

    fn fetch_scalar(&self, sql: &str, _params: &[SqlValue]) -> MicaResult<Option<SqlValue>> {
        Ok(self
            .run_read(sql)?
            .first()
            .and_then(|row| row.first_value().cloned()))
    }

    fn fetch_column(&self, sql: &str, _params: &[SqlValue]) -> MicaResult<Vec<SqlValue>> {
        Ok(self
            .run_read(sql)?
            .iter()
            .filter_map(|row| row.first_value().cloned())
            .collect())
    }

    fn fetch_key_value(
        &self,
        sql: &str,
        _params: &[SqlValue],
    ) -> MicaResult<Vec<(SqlValue, SqlValue)>> {
        Ok(self
            .run_read(sql)?
            .iter()
            .map(|row| {
                (
                    row.value_at(0).cloned().unwrap_or(SqlValue::Null),
                    row.value_at(1).cloned().unwrap_or(SqlValue::Null),
                )
            })
            .collect())
    }

    fn fetch_indexed(&self, sql: &str, _params: &[SqlValue]) -> MicaResult<Vec<(SqlValue, Row)>> {
        Ok(self
            .run_read(sql)?
            .iter()
            .filter_map(Row::split_first)
            .collect())
    }

    fn iterate(&self, sql: &str, _params: &[SqlValue]) -> MicaResult<RowIter> {
        Ok(RowIter::new(self.run_read(sql)?))
    }

    fn iterate_column(&self, sql: &str, _params: &[SqlValue]) -> MicaResult<ValueIter> {
        Ok(ValueIter::new(
            self.run_read(sql)?
                .iter()
                .filter_map(|row| row.first_value().cloned())
                .collect(),
        ))
    }

    fn execute_query(
        &self,
        sql: &str,
        _params: &[SqlValue],
        _profile: Option<&QueryProfile>,
    ) -> MicaResult<RowSet> {
        Ok(RowSet::new(self.run_read(sql)?))
    }

    fn insert(&self, table: &str, values: &Row) -> MicaResult<u64> {
        self.check_write(table, format!("INSERT INTO {}", table))?;
        let id = self.insert_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_insert.lock().unwrap() = Some(id);
        self.writes.write().unwrap().push(WriteCall::Insert {
            table: table.to_string(),
            values: values.clone(),
        });
        Ok(1)
    }

    fn update(&self, table: &str, values: &Row, criteria: &Row) -> MicaResult<u64> {
        self.check_write(table, format!("UPDATE {}", table))?;
        self.writes.write().unwrap().push(WriteCall::Update {
            table: table.to_string(),
            values: values.clone(),
            criteria: criteria.clone(),
        });
        Ok(1)
    }

    fn delete(&self, table: &str, criteria: &Row) -> MicaResult<u64> {
        self.check_write(table, format!("DELETE FROM {}", table))?;
        self.writes.write().unwrap().push(WriteCall::Delete {
            table: table.to_string(),
            criteria: criteria.clone(),
        });
        Ok(1)
    }

    fn execute_statement(&self, sql: &str, params: &[SqlValue]) -> MicaResult<u64> {
        self.check_write(sql, sql.to_string())?;
        self.writes.write().unwrap().push(WriteCall::Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(1)
    }

    fn begin_transaction(&self) -> MicaResult<()> {
        self.ensure_open()?;
        *self.tx_depth.lock().unwrap() += 1;
        Ok(())
    }

    fn commit(&self) -> MicaResult<()> {
        let mut depth = self.tx_depth.lock().unwrap();
        if *depth == 0 {
            return Err(ConnectionError::NoActiveTransaction.into());
        }
        if self.rollback_only.load(Ordering::Relaxed) {
            return Err(ConnectionError::TransactionFailed {
                reason: "transaction is marked rollback-only".to_string(),
            }
            .into());
        }
        *depth -= 1;
        self.commits.fetch_add(1, Ordering::Relaxed);
        if *depth == 0 {
            self.savepoints.lock().unwrap().clear();
        }
        Ok(())
    }

    fn rollback(&self) -> MicaResult<()> {
        let mut depth = self.tx_depth.lock().unwrap();
        if *depth == 0 {
            return Err(ConnectionError::NoActiveTransaction.into());
        }
        *depth -= 1;
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        if *depth == 0 {
            self.rollback_only.store(false, Ordering::Relaxed);
            self.savepoints.lock().unwrap().clear();
        }
        Ok(())
    }

    fn is_transaction_active(&self) -> bool {
        *self.tx_depth.lock().unwrap() > 0
    }

    fn transaction_nesting_level(&self) -> u32 {
        *self.tx_depth.lock().unwrap()
    }

    fn create_savepoint(&self, name: &str) -> MicaResult<()> {
        self.ensure_open()?;
        self.savepoints.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn release_savepoint(&self, name: &str) -> MicaResult<()> {
        let mut savepoints = self.savepoints.lock().unwrap();
        match savepoints.iter().position(|s| s == name) {
            Some(index) => {
                savepoints.remove(index);
                Ok(())
            }
            None => Err(ConnectionError::UnknownSavepoint {
                name: name.to_string(),
            }
            .into()),
        }
    }

    fn rollback_to_savepoint(&self, name: &str) -> MicaResult<()> {
        let mut savepoints = self.savepoints.lock().unwrap();
        match savepoints.iter().position(|s| s == name) {
            Some(index) => {
                // Savepoints created after the target are gone; the target
                // itself survives.
                savepoints.truncate(index + 1);
                Ok(())
            }
            None => Err(ConnectionError::UnknownSavepoint {
                name: name.to_string(),
            }
            .into()),
        }
    }

    fn set_rollback_only(&self) -> MicaResult<()> {
        if !self.is_transaction_active() {
            return Err(ConnectionError::NoActiveTransaction.into());
        }
        self.rollback_only.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn is_rollback_only(&self) -> MicaResult<bool> {
        if !self.is_transaction_active() {
            return Err(ConnectionError::NoActiveTransaction.into());
        }
        Ok(self.rollback_only.load(Ordering::Relaxed))
    }

    fn set_auto_commit(&self, auto_commit: bool) -> MicaResult<()> {
        self.auto_commit.store(auto_commit, Ordering::Relaxed);
        Ok(())
    }

    fn is_auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::Relaxed)
    }

    fn transaction_isolation(&self) -> TransactionIsolation {
        *self.isolation.lock().unwrap()
    }

    fn set_transaction_isolation(&self, level: TransactionIsolation) -> MicaResult<()> {
        *self.isolation.lock().unwrap() = level;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Relaxed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    fn quote(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn last_insert_id(&self) -> MicaResult<Option<SqlValue>> {
        Ok(self.last_insert.lock().unwrap().map(SqlValue::Int))
    }

    fn database(&self) -> MicaResult<Option<String>> {
        self.ensure_open()?;
        Ok(Some("mock".to_string()))
    }

    fn table_names(&self) -> MicaResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.tables.read().unwrap().clone())
    }

    fn convert_to_database(&self, value: &SqlValue, _type_name: &str) -> MicaResult<SqlValue> {
        Ok(value.clone())
    }

    fn convert_from_database(&self, value: &SqlValue, _type_name: &str) -> MicaResult<SqlValue> {
        Ok(value.clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================
