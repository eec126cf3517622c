//! Entity lifecycle invalidation hooks.
//!
//! When the object-mapping layer persists, updates, or removes a domain
//! object, cached query results touching that object's backing table are
//! stale. `EntityChangeListener` reacts to those lifecycle events by
//! invalidating the entity-scope tag and the row-scope tag derived from
//! the object's identity. Invalidation runs after the fact and is strictly
//! best-effort: a failure here must never abort or roll back the business
//! operation that triggered the event.

use std::sync::Arc;

use mica_cache::TagAwareCache;
use mica_core::{row_tag, sanitize_tag, SqlValue};

/// What a mapped domain object must expose for tag derivation.
pub trait DomainEntity {
    /// Logical entity name, the analog of the backing table.
    fn entity_name(&self) -> &str;

    /// Primary identity of this instance, `None` when not retrievable
    /// (unpersisted object, composite key the mapper cannot flatten).
    fn entity_id(&self) -> Option<SqlValue>;
}

/// Invalidates entity- and row-scoped cache tags after lifecycle events.
///
/// All three hooks funnel into one refresh routine. A missing identity or
/// a store failure is logged at error level and swallowed.
pub struct EntityChangeListener<S>
where
    S: TagAwareCache,
{
    store: Arc<S>,
}

impl<S> EntityChangeListener<S>
where
    S: TagAwareCache,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn entity_created(&self, entity: &dyn DomainEntity) {
        self.refresh(entity);
    }

    pub fn entity_updated(&self, entity: &dyn DomainEntity) {
        self.refresh(entity);
    }

    pub fn entity_removed(&self, entity: &dyn DomainEntity) {
        self.refresh(entity);
    }

    fn refresh(&self, entity: &dyn DomainEntity) {
        let name = sanitize_tag(entity.entity_name());
        let id = match entity.entity_id() {
            Some(id) if id.is_scalar() => id,
            _ => {
                tracing::error!(
                    entity = %name,
                    "Entity has no retrievable identity, cache tags not invalidated"
                );
                return;
            }
        };

        let tags = vec![name.clone(), row_tag(&name, &id)];
        if let Err(err) = self.store.invalidate_tags(&tags) {
            tracing::error!(
                entity = %name,
                error = %err,
                "Entity cache invalidation failed"
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mica_cache::MemoryTagCache;
    use mica_core::{CacheStoreError, MicaResult};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct TestEntity {
        name: &'static str,
        id: Option<SqlValue>,
    }

    impl DomainEntity for TestEntity {
        fn entity_name(&self) -> &str {
            self.name
        }

        fn entity_id(&self) -> Option<SqlValue> {
            self.id.clone()
        }
    }

    fn seed(store: &MemoryTagCache, key: &str, tags: &[&str]) {
        store
            .get_or_compute(key, |setup| {
                setup.add_tags(tags.iter().copied());
                Ok("payload".to_string())
            })
            .unwrap();
        assert!(store.contains(key));
    }

    #[test]
    fn test_lifecycle_hooks_invalidate_entity_and_row_tags() {
        let store = Arc::new(MemoryTagCache::new());
        let listener = EntityChangeListener::new(Arc::clone(&store));
        let entity = TestEntity {
            name: "users",
            id: Some(SqlValue::Int(7)),
        };

        for hook in [
            EntityChangeListener::entity_created,
            EntityChangeListener::entity_updated,
            EntityChangeListener::entity_removed,
        ] {
            seed(&store, "list", &["users"]);
            seed(&store, "detail", &["users_7"]);
            seed(&store, "other", &["posts"]);

            hook(&listener, &entity);

            assert!(!store.contains("list"));
            assert!(!store.contains("detail"));
            assert!(store.contains("other"));
            store.clear().unwrap();
        }
    }

    #[test]
    fn test_entity_name_is_sanitized() {
        let store = Arc::new(MemoryTagCache::new());
        let listener = EntityChangeListener::new(Arc::clone(&store));
        seed(&store, "list", &["users"]);

        listener.entity_updated(&TestEntity {
            name: "`users`\n",
            id: Some(SqlValue::Int(1)),
        });

        assert!(!store.contains("list"));
    }

    #[test]
    fn test_missing_identity_invalidates_nothing() {
        let store = Arc::new(MemoryTagCache::new());
        let listener = EntityChangeListener::new(Arc::clone(&store));
        seed(&store, "list", &["users"]);

        listener.entity_removed(&TestEntity {
            name: "users",
            id: None,
        });

        assert!(store.contains("list"));
    }

    #[test]
    fn test_non_scalar_identity_is_treated_as_missing() {
        let store = Arc::new(MemoryTagCache::new());
        let listener = EntityChangeListener::new(Arc::clone(&store));
        seed(&store, "list", &["users"]);

        listener.entity_updated(&TestEntity {
            name: "users",
            id: Some(SqlValue::Bytes(vec![1, 2, 3])),
        });

        assert!(store.contains("list"));
    }

    /// Store double whose invalidation always fails, recording the attempt.
    #[derive(Default)]
    struct BrokenStore {
        attempts: AtomicU64,
        last_tags: Mutex<Vec<String>>,
    }

    impl TagAwareCache for BrokenStore {
        fn get_or_compute<T, F>(&self, _key: &str, init: F) -> MicaResult<T>
        where
            T: serde::Serialize + serde::de::DeserializeOwned,
            F: FnOnce(&mut mica_cache::EntrySetup) -> MicaResult<T>,
        {
            let mut setup = mica_cache::EntrySetup::new();
            init(&mut setup)
        }

        fn delete(&self, _key: &str) -> MicaResult<bool> {
            Ok(false)
        }

        fn invalidate_tags(&self, tags: &[String]) -> MicaResult<bool> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            *self.last_tags.lock().unwrap() = tags.to_vec();
            Err(CacheStoreError::InvalidationFailed {
                reason: "backend down".to_string(),
            }
            .into())
        }
    }

    #[test]
    fn test_store_failure_is_swallowed() {
        let store = Arc::new(BrokenStore::default());
        let listener = EntityChangeListener::new(Arc::clone(&store));

        listener.entity_created(&TestEntity {
            name: "users",
            id: Some(SqlValue::Int(3)),
        });

        assert_eq!(store.attempts.load(Ordering::Relaxed), 1);
        assert_eq!(
            *store.last_tags.lock().unwrap(),
            vec!["users".to_string(), "users_3".to_string()]
        );
    }
}
