//! Tag-aware cache store contract.
//!
//! Implementations own serialization, expiry, and the tag index. Callers
//! only ever see typed values: `get_or_compute` serializes on store and
//! deserializes on hit, so the payload format never leaks out of the store.

use mica_core::MicaResult;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Tag set and expiry for an entry about to be created, configured by the
/// miss callback before the computed value is stored.
///
/// Mirrors the shape of item-based cache pools: tags and TTL are attached
/// inside the compute callback, which also means they are only ever
/// computed on a miss.
#[derive(Debug, Clone, Default)]
pub struct EntrySetup {
    tags: Vec<String>,
    ttl: Option<Duration>,
}

impl EntrySetup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach invalidation tags to the entry. Appends; duplicate tags are
    /// tolerated and collapse in the store's index.
    pub fn add_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
    }

    /// Set the entry's time-to-live. A zero duration means the entry is
    /// already expired for every subsequent read. Never calling this leaves
    /// the expiry to the store (which may cache indefinitely).
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = Some(ttl);
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

/// A key/value cache with tag-based invalidation.
///
/// # Single-flight
///
/// `get_or_compute` must guarantee at-most-one concurrent computation per
/// key: when several callers miss the same key at once, one runs `init`
/// and the rest receive the stored value. The compute callback must not
/// re-enter the store for the same key.
///
/// # Failure contract
///
/// A failed `init` propagates unchanged and must leave no entry behind.
/// `delete` reports whether an entry existed. `invalidate_tags` is
/// idempotent; invalidating a tag nothing carries is a no-op.
pub trait TagAwareCache: Send + Sync {
    /// Return the value stored under `key`, or run `init` to compute,
    /// store, and return it.
    fn get_or_compute<T, F>(&self, key: &str, init: F) -> MicaResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut EntrySetup) -> MicaResult<T>;

    /// Remove the entry under `key`. Returns true iff an entry existed.
    fn delete(&self, key: &str) -> MicaResult<bool>;

    /// Remove every entry carrying any of `tags`. Returns true on success,
    /// including when no entry matched.
    fn invalidate_tags(&self, tags: &[String]) -> MicaResult<bool>;
}
