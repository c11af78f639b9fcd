//! Identity-preserving cache of materialized entities.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::models::EntityKind;
use crate::traits::Entity;

type CacheKey = (EntityKind, String);
type Slot = Arc<dyn Any + Send + Sync>;

/// Maps `(kind, id)` to the one shared instance of that entity.
///
/// Every path that materializes an entity goes through
/// [`get_or_create`](Self::get_or_create), so an id observed twice yields
/// the same `Arc` and the same relation state. Entries live until
/// invalidated; there is no eviction.
#[derive(Default)]
pub struct EntityCache {
    entries: Mutex<HashMap<CacheKey, Slot>>,
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl EntityCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached instance, if any.
    pub fn get<E: Entity>(&self, id: &str) -> Option<Arc<E>> {
        let slot = self.lock().get(&(E::KIND, id.to_string())).cloned()?;
        slot.downcast::<E>().ok()
    }

    /// Return the cached instance or build, store and return a new one.
    ///
    /// The builder runs under the cache lock, so concurrent callers for the
    /// same key never construct two instances. Builders must not touch the
    /// cache themselves.
    ///
    /// # Errors
    ///
    /// Returns the builder's error; nothing is stored in that case.
    pub fn get_or_create<E, F>(&self, id: &str, builder: F) -> Result<Arc<E>>
    where
        E: Entity,
        F: FnOnce() -> Result<E>,
    {
        let mut entries = self.lock();
        let key = (E::KIND, id.to_string());

        if let Some(existing) = entries.get(&key) {
            if let Ok(entity) = Arc::clone(existing).downcast::<E>() {
                return Ok(entity);
            }
        }

        let entity = Arc::new(builder()?);
        entries.insert(key, Arc::clone(&entity) as Slot);
        Ok(entity)
    }

    /// Whether an entry exists for `(kind, id)`.
    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.lock().contains_key(&(kind, id.to_string()))
    }

    /// Remove one entry. Returns whether it was present.
    pub fn invalidate(&self, kind: EntityKind, id: &str) -> bool {
        self.lock().remove(&(kind, id.to_string())).is_some()
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
