//! A thread-safe LRU cache wrapping any [`ObjectStore`].
//!
//! Grounded on `lib/src/store.rs`'s `Store`, which wraps a `Box<dyn
//! Backend>` with a `Mutex<CLruCache<CommitId, Arc<backend::Commit>>>`
//! (and the same for trees): read-through on a cache miss, populate the
//! cache on both reads and writes. Here there's a single object kind
//! (`Oid -> Object`) rather than jj's per-kind caches, so a single
//! `Mutex<CLruCache<...>>` suffices.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use clru::CLruCache;

use crate::error::PgResult;
use crate::object::Object;
use crate::oid::Oid;

use super::ObjectStore;

/// Default capacity, in objects, of a [`CachedObjectStore`]'s LRU.
pub const DEFAULT_CAPACITY: usize = 5000;

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

pub struct CachedObjectStore<S> {
    inner: S,
    cache: Mutex<CLruCache<Oid, Arc<Object>>>,
    stats: CacheStats,
}

impl<S: ObjectStore> CachedObjectStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: S, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner,
            cache: Mutex::new(CLruCache::new(capacity)),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Drops all cached objects without touching the backing store.
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    fn cache_len_before_insert(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

impl<S: ObjectStore> ObjectStore for CachedObjectStore<S> {
    fn has(&self, oid: &Oid) -> bool {
        if self.cache.lock().unwrap().contains(oid) {
            return true;
        }
        self.inner.has(oid)
    }

    fn read(&self, oid: &Oid) -> PgResult<Object> {
        if let Some(object) = self.cache.lock().unwrap().get(oid) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok((**object).clone());
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        let object = self.inner.read(oid)?;
        let before = self.cache_len_before_insert();
        let mut cache = self.cache.lock().unwrap();
        cache.put(*oid, Arc::new(object.clone()));
        if cache.len() <= before {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(object)
    }

    fn write(&self, object: &Object) -> PgResult<Oid> {
        let oid = self.inner.write(object)?;
        let before = self.cache_len_before_insert();
        let mut cache = self.cache.lock().unwrap();
        cache.put(oid, Arc::new(object.clone()));
        if cache.len() <= before {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        Ok(oid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Blob;
    use crate::store::LooseObjectStore;

    fn temp_cached_store() -> (tempfile::TempDir, CachedObjectStore<LooseObjectStore>) {
        let dir = tempfile::tempdir().unwrap();
        let loose = LooseObjectStore::open(dir.path()).unwrap();
        (dir, CachedObjectStore::new(loose))
    }

    #[test]
    fn read_after_write_is_a_cache_hit() {
        let (_dir, store) = temp_cached_store();
        let object = Object::Blob(Blob::new(b"cache me".to_vec()));
        let oid = store.write(&object).unwrap();

        assert_eq!(store.stats().hits(), 0);
        let read_back = store.read(&oid).unwrap();
        assert_eq!(read_back, object);
        assert_eq!(store.stats().hits(), 1);
        assert_eq!(store.stats().misses(), 0);
    }

    #[test]
    fn first_read_after_clearing_cache_is_a_miss() {
        let (_dir, store) = temp_cached_store();
        let object = Object::Blob(Blob::new(b"evict me".to_vec()));
        let oid = store.write(&object).unwrap();

        store.clear_cache();
        let read_back = store.read(&oid).unwrap();
        assert_eq!(read_back, object);
        assert_eq!(store.stats().misses(), 1);
    }

    #[test]
    fn capacity_one_evicts_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let loose = LooseObjectStore::open(dir.path()).unwrap();
        let store = CachedObjectStore::with_capacity(loose, 1);

        let first = Object::Blob(Blob::new(b"first".to_vec()));
        let second = Object::Blob(Blob::new(b"second".to_vec()));
        let first_oid = store.write(&first).unwrap();
        let second_oid = store.write(&second).unwrap();
        assert!(store.stats().evictions() >= 1);

        // Both objects are still retrievable: eviction only drops the cache
        // entry, the loose backend still has them on disk.
        assert_eq!(store.read(&first_oid).unwrap(), first);
        assert_eq!(store.read(&second_oid).unwrap(), second);
    }
}
