//! Content-addressed object storage.
//!
//! `ObjectStore` is the common interface; [`loose::LooseObjectStore`] is the
//! on-disk backend (component 4) and [`cache::CachedObjectStore`] wraps any
//! `ObjectStore` with a thread-safe LRU (component 5).

mod cache;
mod loose;

pub use cache::{CacheStats, CachedObjectStore, DEFAULT_CAPACITY};
pub use loose::LooseObjectStore;

use crate::error::PgResult;
use crate::object::Object;
use crate::oid::Oid;

/// Common interface implemented by both the loose backend and the cached
/// wrapper, so callers (snapshot builder, diff engine, repository façade)
/// can be generic over either.
pub trait ObjectStore: Send + Sync {
    fn has(&self, oid: &Oid) -> bool;
    fn read(&self, oid: &Oid) -> PgResult<Object>;
    fn write(&self, object: &Object) -> PgResult<Oid>;
}
