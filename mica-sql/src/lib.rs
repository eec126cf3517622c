//! mica sql - caching connection proxy and SQL-facing surface
//!
//! The SQL layer of mica: the [`Connection`] contract with its fetch
//! projections and transaction control, the tag extractor that maps SQL
//! text to invalidation scopes, the [`CacheConnection`] decorator that
//! serves repeated reads from a tag-aware store and invalidates on writes,
//! the entity lifecycle listener, and an in-memory [`MockConnection`] for
//! tests.

pub mod connection;
pub mod listener;
pub mod mock;
pub mod proxy;
pub mod result;
pub mod tags;

pub use connection::{Connection, ConnectionExt, QueryProfile, TransactionIsolation};
pub use listener::{DomainEntity, EntityChangeListener};
pub use mock::{MockConnection, WriteCall};
pub use proxy::{cache_key, CacheConnection};
pub use result::{RowIter, RowSet, ValueIter};
pub use tags::{extract_tags, mutation_tags};

// Re-export the foundation types callers need alongside the connection.
pub use mica_cache::{
    CachePolicy, EntrySetup, MemoryTagCache, PolicyChain, TagAwareCache,
};
pub use mica_core::{CacheConfig, MicaError, MicaResult, Row, SqlValue};
