//! Transparent result-caching connection decorator.
//!
//! `CacheConnection` wraps any [`Connection`] and serves repeated reads from
//! a tag-aware cache store. Routes call the connection contract unchanged;
//! writes invalidate the tags they touch on the way through. Every operation
//! outside the read and write paths forwards to the wrapped connection
//! one-to-one.
//!
//! # Consistency
//!
//! Caching is best-effort, not linearizable: a read that began before a
//! concurrent write completed may cache a result that is stale relative to
//! that write. The proxy also does not check for an open transaction before
//! caching a read, so a read inside a transaction that later rolls back can
//! cache data that never committed. Known gap; callers that cannot tolerate
//! it should disable caching around such reads via `set_caching_enabled`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use mica_cache::{CachePolicy, PolicyChain, TagAwareCache};
use mica_core::{compute_content_hash, CacheConfig, CacheStoreError, MicaResult, Row, SqlValue};

use crate::connection::{Connection, QueryProfile, TransactionIsolation};
use crate::result::{RowIter, RowSet, ValueIter};
use crate::tags::{extract_tags, mutation_tags};

// ============================================================================
// CACHE KEY
// ============================================================================

/// Derive the cache key for one read operation.
///
/// The key is the operation name plus a content hash over the serialized
/// query text and parameters. Serialization is type-tagged, so parameters
/// that render identically but differ in type produce different keys.
pub fn cache_key(op: &str, sql: &str, params: &[SqlValue]) -> MicaResult<String> {
    let payload =
        serde_json::to_vec(&(sql, params)).map_err(|err| CacheStoreError::SerializationFailed {
            key: format!("sql_{}", op),
            reason: err.to_string(),
        })?;
    Ok(format!(
        "sql_{}_{}",
        op,
        hex::encode(compute_content_hash(&payload))
    ))
}

// ============================================================================
// CACHING CONNECTION PROXY
// ============================================================================

/// A [`Connection`] decorator that caches read results by invalidation tag.
///
/// # Read path
///
/// A read is served from the store when the kill switch is on, every policy
/// voter approves the query, and the proxy's own runtime flag is enabled.
/// On a miss the store runs the underlying fetch once per key, attaching the
/// tags extracted from the SQL text and the TTL resolved from configuration.
/// When the runtime flag is off, the stale entry for the key is deleted
/// best-effort and the read goes straight to the wrapped connection.
///
/// # Write path
///
/// `insert`, `update`, `delete`, and `execute_statement` delegate first and
/// then invalidate the affected tags unconditionally. An invalidation
/// failure is logged and swallowed; the write's own result or error is
/// surfaced unchanged.
pub struct CacheConnection<C, S>
where
    C: Connection,
    S: TagAwareCache,
{
    /// The wrapped connection.
    inner: C,
    /// The tag-aware cache store.
    store: Arc<S>,
    /// Voters gating which queries may be cached.
    policies: PolicyChain,
    /// Kill switch and TTL resolution.
    config: CacheConfig,
    /// Runtime enable flag, togglable without touching config or policies.
    cache_open: AtomicBool,
}

impl<C, S> CacheConnection<C, S>
where
    C: Connection,
    S: TagAwareCache,
{
    /// Create a new caching proxy around `inner`.
    pub fn new(inner: C, store: Arc<S>, policies: PolicyChain, config: CacheConfig) -> Self {
        Self {
            inner,
            store,
            policies,
            config,
            cache_open: AtomicBool::new(true),
        }
    }

    /// Create a proxy with an empty policy chain and default configuration.
    pub fn with_defaults(inner: C, store: Arc<S>) -> Self {
        Self::new(inner, store, PolicyChain::new(), CacheConfig::default())
    }

    /// Whether this proxy currently uses its cache.
    pub fn is_caching_enabled(&self) -> bool {
        self.cache_open.load(Ordering::Relaxed)
    }

    /// Toggle cache usage at runtime. Does not affect the kill switch or the
    /// policy chain; a disabled proxy still discards stale entries as reads
    /// pass through.
    pub fn set_caching_enabled(&self, enabled: bool) {
        self.cache_open.store(enabled, Ordering::Relaxed);
    }

    /// Get a reference to the wrapped connection.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Get a reference to the cache store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the policy chain.
    pub fn policies(&self) -> &PolicyChain {
        &self.policies
    }

    /// Unwrap the proxy, returning the wrapped connection.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Eligibility gate: the kill switch and every policy voter must agree
    /// before the cache is consulted at all.
    fn should_cache(&self, sql: &str, params: &[SqlValue]) -> bool {
        self.config.enabled && self.policies.approves(sql, params)
    }

    /// Shared read path. `fetch` runs the operation against the wrapped
    /// connection; it is invoked directly when caching does not apply, and
    /// at most once per key inside the store otherwise.
    fn call_cached<T, F>(&self, op: &str, sql: &str, params: &[SqlValue], fetch: F) -> MicaResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> MicaResult<T>,
    {
        if !self.should_cache(sql, params) {
            return fetch();
        }

        let key = cache_key(op, sql, params)?;
        let tags = extract_tags(sql);

        if !self.is_caching_enabled() {
            self.discard_entry(&key);
            return fetch();
        }

        let ttl_secs = self.config.ttl_for_tags(&tags);
        self.store.get_or_compute(&key, |entry| {
            entry.add_tags(tags.iter().cloned());
            entry.set_ttl(Duration::from_secs(ttl_secs));
            let result = fetch();
            // Logged on the failure path too, mirroring the write attempt.
            tracing::debug!(
                operation = op,
                tags = ?tags,
                ttl_secs,
                sql,
                "Caching query result"
            );
            result
        })
    }

    /// Best-effort delete of a stale entry while caching is disabled.
    fn discard_entry(&self, key: &str) {
        if let Err(err) = self.store.delete(key) {
            tracing::warn!(key, error = %err, "Failed to discard cache entry");
        }
    }

    /// Best-effort tag invalidation after a write. Never surfaces a store
    /// failure; the write's own outcome must win.
    fn invalidate(&self, tags: &[String]) {
        if let Err(err) = self.store.invalidate_tags(tags) {
            tracing::warn!(tags = ?tags, error = %err, "Cache invalidation failed");
        }
    }
}

impl<C, S> Connection for CacheConnection<C, S>
where
    C: Connection,
    S: TagAwareCache,
{
    // ========================================================================
    // CACHED READ OPERATIONS
    // ========================================================================

    fn fetch_row(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Option<Row>> {
        self.call_cached("fetch_row", sql, params, || self.inner.fetch_row(sql, params))
    }

    fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Vec<Row>> {
        self.call_cached("fetch_all", sql, params, || self.inner.fetch_all(sql, params))
    }

    fn fetch_scalar(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Option<SqlValue>> {
        self.call_cached("fetch_scalar", sql, params, || {
            self.inner.fetch_scalar(sql, params)
        })
    }

    fn fetch_column(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Vec<SqlValue>> {
        self.call_cached("fetch_column", sql, params, || {
            self.inner.fetch_column(sql, params)
        })
    }

    fn fetch_key_value(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> MicaResult<Vec<(SqlValue, SqlValue)>> {
        self.call_cached("fetch_key_value", sql, params, || {
            self.inner.fetch_key_value(sql, params)
        })
    }

    fn fetch_indexed(&self, sql: &str, params: &[SqlValue]) -> MicaResult<Vec<(SqlValue, Row)>> {
        self.call_cached("fetch_indexed", sql, params, || {
            self.inner.fetch_indexed(sql, params)
        })
    }

    fn iterate(&self, sql: &str, params: &[SqlValue]) -> MicaResult<RowIter> {
        // The cache holds the materialized rows; the iterator shape is
        // recreated on every call, cached or not.
        let rows = self.call_cached("iterate", sql, params, || {
            self.inner.iterate(sql, params).map(|iter| iter.collect())
        })?;
        Ok(RowIter::new(rows))
    }

    fn iterate_column(&self, sql: &str, params: &[SqlValue]) -> MicaResult<ValueIter> {
        let values = self.call_cached("iterate_column", sql, params, || {
            self.inner
                .iterate_column(sql, params)
                .map(|iter| iter.collect())
        })?;
        Ok(ValueIter::new(values))
    }

    fn execute_query(
        &self,
        sql: &str,
        params: &[SqlValue],
        profile: Option<&QueryProfile>,
    ) -> MicaResult<RowSet> {
        // A caller-supplied profile owns caching for this call.
        if profile.is_some() {
            return self.inner.execute_query(sql, params, profile);
        }
        let rows = self.call_cached("execute_query", sql, params, || {
            self.inner
                .execute_query(sql, params, None)
                .map(RowSet::into_rows)
        })?;
        Ok(RowSet::new(rows))
    }

    // ========================================================================
    // INVALIDATING WRITE OPERATIONS
    // ========================================================================

    fn insert(&self, table: &str, values: &Row) -> MicaResult<u64> {
        let result = self.inner.insert(table, values);
        self.invalidate(&mutation_tags(table, None));
        result
    }

    fn update(&self, table: &str, values: &Row, criteria: &Row) -> MicaResult<u64> {
        let result = self.inner.update(table, values, criteria);
        self.invalidate(&mutation_tags(table, Some(criteria)));
        result
    }

    fn delete(&self, table: &str, criteria: &Row) -> MicaResult<u64> {
        let result = self.inner.delete(table, criteria);
        self.invalidate(&mutation_tags(table, Some(criteria)));
        result
    }

    fn execute_statement(&self, sql: &str, params: &[SqlValue]) -> MicaResult<u64> {
        let result = self.inner.execute_statement(sql, params);
        self.invalidate(&extract_tags(sql));
        result
    }

    // ========================================================================
    // FORWARDED OPERATIONS
    // ========================================================================

    fn begin_transaction(&self) -> MicaResult<()> {
        self.inner.begin_transaction()
    }

    fn commit(&self) -> MicaResult<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> MicaResult<()> {
        self.inner.rollback()
    }

    fn is_transaction_active(&self) -> bool {
        self.inner.is_transaction_active()
    }

    fn transaction_nesting_level(&self) -> u32 {
        self.inner.transaction_nesting_level()
    }

    fn create_savepoint(&self, name: &str) -> MicaResult<()> {
        self.inner.create_savepoint(name)
    }

    fn release_savepoint(&self, name: &str) -> MicaResult<()> {
        self.inner.release_savepoint(name)
    }

    fn rollback_to_savepoint(&self, name: &str) -> MicaResult<()> {
        self.inner.rollback_to_savepoint(name)
    }

    fn set_rollback_only(&self) -> MicaResult<()> {
        self.inner.set_rollback_only()
    }

    fn is_rollback_only(&self) -> MicaResult<bool> {
        self.inner.is_rollback_only()
    }

    fn set_auto_commit(&self, auto_commit: bool) -> MicaResult<()> {
        self.inner.set_auto_commit(auto_commit)
    }

    fn is_auto_commit(&self) -> bool {
        self.inner.is_auto_commit()
    }

    fn transaction_isolation(&self) -> TransactionIsolation {
        self.inner.transaction_isolation()
    }

    fn set_transaction_isolation(&self, level: TransactionIsolation) -> MicaResult<()> {
        self.inner.set_transaction_isolation(level)
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn close(&self) {
        self.inner.close()
    }

    fn quote(&self, value: &str) -> String {
        self.inner.quote(value)
    }

    fn last_insert_id(&self) -> MicaResult<Option<SqlValue>> {
        self.inner.last_insert_id()
    }

    fn database(&self) -> MicaResult<Option<String>> {
        self.inner.database()
    }

    fn table_names(&self) -> MicaResult<Vec<String>> {
        self.inner.table_names()
    }

    fn convert_to_database(&self, value: &SqlValue, type_name: &str) -> MicaResult<SqlValue> {
        self.inner.convert_to_database(value, type_name)
    }

    fn convert_from_database(&self, value: &SqlValue, type_name: &str) -> MicaResult<SqlValue> {
        self.inner.convert_from_database(value, type_name)
    }
}

// ============================================================================
// TESTS
// ============================================================================
