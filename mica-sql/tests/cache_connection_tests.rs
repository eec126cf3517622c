//! End-to-end tests for the caching connection proxy over a real store.
//!
//! Tests verify:
//! - Repeated reads compute once against the wrapped connection
//! - Writes (structured and raw SQL) invalidate exactly the tags they touch
//! - The kill switch, policy chain, and runtime flag bypass the store
//! - TTL overrides resolve per tag, including zero-TTL immediate expiry
//! - Failed reads leave the store empty and stay retryable
//! - Row sets, typed projections, and transactions survive the proxy

use std::sync::Arc;

use mica_sql::{
    CacheConfig, CacheConnection, Connection, ConnectionExt, DomainEntity, EntityChangeListener,
    MemoryTagCache, MockConnection, PolicyChain, QueryProfile, Row, SqlValue,
};

// Extraction anchors on keyword-delimited identifiers, so every cached
// statement here keeps a clause after the table name.
const USERS_SQL: &str = "SELECT * FROM users WHERE active = 1 ";
const POSTS_SQL: &str = "SELECT * FROM posts ORDER BY id ";

fn user_rows() -> Vec<Row> {
    vec![
        Row::from_pairs(vec![("id", SqlValue::Int(1)), ("name", SqlValue::from("ada"))]),
        Row::from_pairs(vec![("id", SqlValue::Int(2)), ("name", SqlValue::from("bob"))]),
    ]
}

fn proxy() -> CacheConnection<MockConnection, MemoryTagCache> {
    let conn = MockConnection::new();
    conn.canned_rows(USERS_SQL, user_rows());
    conn.canned_rows(POSTS_SQL, vec![Row::from_pairs(vec![("id", SqlValue::Int(9))])]);
    CacheConnection::with_defaults(conn, Arc::new(MemoryTagCache::new()))
}

// ============================================================================
// READ PATH
// ============================================================================

#[test]
fn test_repeated_read_computes_once() {
    let proxy = proxy();

    let first = proxy.fetch_all(USERS_SQL, &[]).unwrap();
    let second = proxy.fetch_all(USERS_SQL, &[]).unwrap();

    assert_eq!(first, user_rows());
    assert_eq!(first, second);
    assert_eq!(proxy.inner().query_count(USERS_SQL), 1);
    assert_eq!(proxy.store().len(), 1);
}

#[test]
fn test_distinct_parameters_cache_separately() {
    let proxy = proxy();

    proxy.fetch_all(USERS_SQL, &[SqlValue::Int(1)]).unwrap();
    proxy.fetch_all(USERS_SQL, &[SqlValue::Int(2)]).unwrap();
    // Same text rendered from a different type is a different query.
    proxy
        .fetch_all(USERS_SQL, &[SqlValue::Text("1".into())])
        .unwrap();

    assert_eq!(proxy.inner().query_count(USERS_SQL), 3);
    assert_eq!(proxy.store().len(), 3);
}

#[test]
fn test_projections_round_trip_through_store() {
    let proxy = proxy();

    // Miss populates, hit deserializes; both must agree per projection.
    for _ in 0..2 {
        assert_eq!(
            proxy.fetch_scalar(USERS_SQL, &[]).unwrap(),
            Some(SqlValue::Int(1))
        );
        assert_eq!(
            proxy.fetch_column(USERS_SQL, &[]).unwrap(),
            vec![SqlValue::Int(1), SqlValue::Int(2)]
        );
        assert_eq!(
            proxy.fetch_key_value(USERS_SQL, &[]).unwrap(),
            vec![
                (SqlValue::Int(1), SqlValue::Text("ada".into())),
                (SqlValue::Int(2), SqlValue::Text("bob".into())),
            ]
        );
        let row = proxy.fetch_row(USERS_SQL, &[]).unwrap().unwrap();
        assert_eq!(row.get("name"), Some(&SqlValue::Text("ada".into())));
    }

    // Four distinct operations, one underlying execution each.
    assert_eq!(proxy.inner().query_count(USERS_SQL), 4);
}

#[test]
fn test_row_set_replays_through_proxy() {
    let proxy = proxy();

    // Second call is served from the store; the cursor must still work.
    proxy.execute_query(USERS_SQL, &[], None).unwrap();
    let mut set = proxy.execute_query(USERS_SQL, &[], None).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 1);

    assert_eq!(set.fetch_one(), Some(SqlValue::Int(1)));
    assert_eq!(set.fetch_one(), Some(SqlValue::Int(2)));
    assert_eq!(set.fetch_one(), None);
    set.reset();
    assert_eq!(set.fetch_row().unwrap().get("name"), Some(&SqlValue::Text("ada".into())));
}

#[test]
fn test_profile_bypasses_store() {
    let proxy = proxy();
    let profile = QueryProfile::new(60);

    proxy.execute_query(USERS_SQL, &[], Some(&profile)).unwrap();
    proxy.execute_query(USERS_SQL, &[], Some(&profile)).unwrap();

    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
    assert!(proxy.store().is_empty());
}

#[test]
fn test_failed_read_leaves_store_empty_and_retryable() {
    let proxy = proxy();
    proxy.inner().fail_queries(USERS_SQL);

    assert!(proxy.fetch_all(USERS_SQL, &[]).is_err());
    assert!(proxy.store().is_empty());

    // Once the connection recovers, the same key caches normally.
    proxy.inner().clear_failures();
    assert_eq!(proxy.fetch_all(USERS_SQL, &[]).unwrap(), user_rows());
    assert_eq!(proxy.fetch_all(USERS_SQL, &[]).unwrap(), user_rows());
    assert_eq!(proxy.inner().query_count(USERS_SQL), 1);
}

// ============================================================================
// WRITE-PATH INVALIDATION
// ============================================================================

#[test]
fn test_update_invalidates_only_matching_reads() {
    let proxy = proxy();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy.fetch_all(POSTS_SQL, &[]).unwrap();
    assert_eq!(proxy.store().len(), 2);

    let affected = proxy
        .update(
            "users",
            &Row::from_pairs(vec![("name", "eve")]),
            &Row::from_pairs(vec![("id", SqlValue::Int(1))]),
        )
        .unwrap();
    assert_eq!(affected, 1);

    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy.fetch_all(POSTS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
    assert_eq!(proxy.inner().query_count(POSTS_SQL), 1);
}

#[test]
fn test_insert_and_delete_invalidate_their_table() {
    let proxy = proxy();

    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy
        .insert("users", &Row::from_pairs(vec![("name", "eve")]))
        .unwrap();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);

    proxy
        .delete("users", &Row::from_pairs(vec![("id", SqlValue::Int(2))]))
        .unwrap();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 3);
}

#[test]
fn test_raw_statement_invalidates_extracted_tables() {
    let proxy = proxy();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy.fetch_all(POSTS_SQL, &[]).unwrap();

    proxy
        .execute_statement("UPDATE users SET active = 0 WHERE id = ? ", &[SqlValue::Int(1)])
        .unwrap();

    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy.fetch_all(POSTS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
    assert_eq!(proxy.inner().query_count(POSTS_SQL), 1);
}

#[test]
fn test_failed_write_still_invalidates() {
    let proxy = proxy();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy.inner().fail_statements("users");

    assert!(proxy
        .insert("users", &Row::from_pairs(vec![("name", "eve")]))
        .is_err());

    // The write may have partially applied before failing; the cached read
    // is gone either way.
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
}

// ============================================================================
// BYPASS CONTROLS
// ============================================================================

#[test]
fn test_kill_switch_never_touches_store() {
    let conn = MockConnection::new();
    conn.canned_rows(USERS_SQL, user_rows());
    let proxy = CacheConnection::new(
        conn,
        Arc::new(MemoryTagCache::new()),
        PolicyChain::new(),
        CacheConfig::new().with_enabled(false),
    );

    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();

    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
    assert!(proxy.store().is_empty());
}

#[test]
fn test_rejecting_policy_never_touches_store() {
    let conn = MockConnection::new();
    conn.canned_rows(USERS_SQL, user_rows());
    let policies =
        PolicyChain::new().with_voter(Arc::new(|sql: &str, _: &[SqlValue]| !sql.contains("users")));
    let proxy = CacheConnection::new(
        conn,
        Arc::new(MemoryTagCache::new()),
        policies,
        CacheConfig::default(),
    );

    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
    assert!(proxy.store().is_empty());

    // A query the voter approves still caches.
    let posts = "SELECT * FROM posts LIMIT 10 ";
    proxy.fetch_all(posts, &[]).unwrap();
    proxy.fetch_all(posts, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(posts), 1);
}

#[test]
fn test_runtime_flag_discards_then_recaches() {
    let proxy = proxy();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.store().len(), 1);

    // Disabling serves direct reads and evicts the entry for each key read.
    proxy.set_caching_enabled(false);
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
    assert!(proxy.store().is_empty());

    proxy.set_caching_enabled(true);
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 3);
    assert_eq!(proxy.store().len(), 1);
}

#[test]
fn test_zero_ttl_override_always_recomputes() {
    let conn = MockConnection::new();
    conn.canned_rows(USERS_SQL, user_rows());
    let proxy = CacheConnection::new(
        conn,
        Arc::new(MemoryTagCache::new()),
        PolicyChain::new(),
        CacheConfig::new().with_tag_ttl("users", "0"),
    );

    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
}

// ============================================================================
// TRANSACTIONS THROUGH THE PROXY
// ============================================================================

#[test]
fn test_with_transaction_commits_and_invalidates() {
    let proxy = proxy();
    proxy.fetch_all(USERS_SQL, &[]).unwrap();

    proxy
        .with_transaction(|conn| {
            conn.insert("users", &Row::from_pairs(vec![("name", "eve")]))
        })
        .unwrap();

    assert_eq!(proxy.inner().commit_count(), 1);
    assert!(!proxy.is_transaction_active());

    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
}

#[test]
fn test_with_transaction_rolls_back_on_closure_error() {
    let proxy = proxy();
    proxy.inner().fail_queries("SELECT * FROM broken ");

    let result: Result<(), _> = proxy.with_transaction(|conn| {
        conn.insert("users", &Row::from_pairs(vec![("name", "eve")]))?;
        conn.fetch_all("SELECT * FROM broken ", &[])?;
        Ok(())
    });

    assert!(result.is_err());
    assert_eq!(proxy.inner().commit_count(), 0);
    assert_eq!(proxy.inner().rollback_count(), 1);
    assert!(!proxy.is_transaction_active());
}

// ============================================================================
// ENTITY LISTENER AGAINST PROXY-POPULATED ENTRIES
// ============================================================================

struct UserEntity {
    id: Option<SqlValue>,
}

impl DomainEntity for UserEntity {
    fn entity_name(&self) -> &str {
        "users"
    }

    fn entity_id(&self) -> Option<SqlValue> {
        self.id.clone()
    }
}

#[test]
fn test_listener_invalidates_proxy_cached_reads() {
    let store = Arc::new(MemoryTagCache::new());
    let conn = MockConnection::new();
    conn.canned_rows(USERS_SQL, user_rows());
    let proxy = CacheConnection::with_defaults(conn, Arc::clone(&store));
    let listener = EntityChangeListener::new(store);

    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    listener.entity_updated(&UserEntity {
        id: Some(SqlValue::Int(1)),
    });

    proxy.fetch_all(USERS_SQL, &[]).unwrap();
    assert_eq!(proxy.inner().query_count(USERS_SQL), 2);
}
