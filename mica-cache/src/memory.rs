//! In-memory tag-aware cache store.
//!
//! The reference [`TagAwareCache`] implementation: a `RwLock`-guarded entry
//! map plus a tag-to-keys index, per-key computation locks for single-flight
//! get-or-compute, and lazy expiry (an expired entry is reaped by the read
//! that discovers it). Payloads are stored as serialized bytes, so the store
//! never depends on the concrete payload type.

use crate::store::{EntrySetup, TagAwareCache};
use mica_core::{CacheStoreError, MicaResult};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Statistics about cache usage.
///
/// Hits count reads served from the store; misses count computations
/// actually run. A caller that waited out another caller's computation and
/// then read the stored value counts as a hit.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries currently in the map, including expired-but-unreaped ones.
    pub entry_count: u64,
    /// Entries removed through tag invalidation.
    pub invalidations: u64,
    /// Entries reaped on read after their TTL ran out.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct StoredEntry {
    payload: Vec<u8>,
    tags: Vec<String>,
    /// None means no expiry: the entry lives until deleted or invalidated.
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, StoredEntry>,
    /// Secondary index: tag -> keys carrying it.
    tag_index: HashMap<String, HashSet<String>>,
}

impl CacheInner {
    /// Remove an entry and unlink it from every tag it carries.
    fn remove_entry(&mut self, key: &str) -> Option<StoredEntry> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        Some(entry)
    }
}

/// In-memory [`TagAwareCache`] with TTL expiry and single-flight computes.
#[derive(Debug, Default)]
pub struct MemoryTagCache {
    inner: RwLock<CacheInner>,
    /// Per-key computation locks. An entry is removed once no caller holds
    /// a clone, so the map stays bounded by in-flight computations.
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryTagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in the map, including expired-but-unreaped ones.
    pub fn len(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live (unexpired) entry exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.inner
            .read()
            .map(|inner| {
                inner
                    .entries
                    .get(key)
                    .map(|entry| !entry.is_expired(now))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Drop every entry. Counters keep accumulating.
    pub fn clear(&self) -> MicaResult<()> {
        let mut inner = self.write_inner()?;
        inner.entries.clear();
        inner.tag_index.clear();
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.len() as u64,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn read_inner(&self) -> MicaResult<RwLockReadGuard<'_, CacheInner>> {
        self.inner
            .read()
            .map_err(|_| CacheStoreError::LockPoisoned.into())
    }

    fn write_inner(&self) -> MicaResult<RwLockWriteGuard<'_, CacheInner>> {
        self.inner
            .write()
            .map_err(|_| CacheStoreError::LockPoisoned.into())
    }

    /// Read the live value under `key`, reaping it if its TTL ran out.
    /// Records no hit/miss; callers decide what the outcome counts as.
    fn lookup<T: DeserializeOwned>(&self, key: &str) -> MicaResult<Option<T>> {
        let now = Instant::now();
        {
            let inner = self.read_inner()?;
            match inner.entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => {
                    let value = serde_json::from_slice(&entry.payload).map_err(|e| {
                        CacheStoreError::DeserializationFailed {
                            key: key.to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                    return Ok(Some(value));
                }
                Some(_) => {}
            }
        }
        // Expired: reap under the write lock, re-checking in case the entry
        // was replaced in between.
        let mut inner = self.write_inner()?;
        let still_expired = inner
            .entries
            .get(key)
            .map(|entry| entry.is_expired(Instant::now()))
            .unwrap_or(false);
        if still_expired {
            inner.remove_entry(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(None)
    }

    /// The computation lock for `key`, created on demand.
    fn flight(&self, key: &str) -> MicaResult<Arc<Mutex<()>>> {
        let mut flights = self.flights.lock().map_err(|_| CacheStoreError::LockPoisoned)?;
        Ok(flights
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Drop the computation lock for `key` once nobody else holds it.
    fn release_flight(&self, key: &str) {
        if let Ok(mut flights) = self.flights.lock() {
            if let Some(lock) = flights.get(key) {
                if Arc::strong_count(lock) == 1 {
                    flights.remove(key);
                }
            }
        }
    }

    fn run_flight<T, F>(&self, key: &str, flight: &Mutex<()>, init: F) -> MicaResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut EntrySetup) -> MicaResult<T>,
    {
        let _guard = flight.lock().map_err(|_| CacheStoreError::LockPoisoned)?;
        // Another caller may have stored the value while we waited.
        if let Some(value) = self.lookup(key)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let mut setup = EntrySetup::new();
        let value = init(&mut setup)?;
        let payload = serde_json::to_vec(&value).map_err(|e| CacheStoreError::SerializationFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store(key, payload, &setup)?;
        Ok(value)
    }

    fn store(&self, key: &str, payload: Vec<u8>, setup: &EntrySetup) -> MicaResult<()> {
        // A TTL too large for the monotonic clock saturates to "no expiry".
        let expires_at = setup.ttl().and_then(|ttl| Instant::now().checked_add(ttl));
        let mut inner = self.write_inner()?;
        inner.remove_entry(key);
        for tag in setup.tags() {
            inner
                .tag_index
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        inner.entries.insert(
            key.to_string(),
            StoredEntry {
                payload,
                tags: setup.tags().to_vec(),
                expires_at,
            },
        );
        Ok(())
    }
}

impl TagAwareCache for MemoryTagCache {
    fn get_or_compute<T, F>(&self, key: &str, init: F) -> MicaResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut EntrySetup) -> MicaResult<T>,
    {
        if let Some(value) = self.lookup(key)? {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        let flight = self.flight(key)?;
        let result = self.run_flight(key, &flight, init);
        drop(flight);
        self.release_flight(key);
        result
    }

    fn delete(&self, key: &str) -> MicaResult<bool> {
        let mut inner = self.write_inner()?;
        Ok(inner.remove_entry(key).is_some())
    }

    fn invalidate_tags(&self, tags: &[String]) -> MicaResult<bool> {
        let mut inner = self.write_inner()?;
        let mut removed = 0u64;
        for tag in tags {
            let keys: Vec<String> = inner
                .tag_index
                .get(tag)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            for key in keys {
                if inner.remove_entry(&key).is_some() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            self.invalidations.fetch_add(removed, Ordering::Relaxed);
        }
        Ok(true)
    }
}

// ============================================================================
// TESTS
// ============================================================================
