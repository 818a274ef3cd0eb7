//! The advisory rehash-avoidance index: a concurrent `path -> IndexEntry`
//! map persisted as JSON beside the repository metadata.
//!
//! Grounded on `klardotsh-gawsh`'s `dashmap` dependency (one of the pack's
//! own example repos, not the teacher) for the concurrent map, and on
//! `lib/src/file_util.rs`'s temp-file-then-rename pattern for the
//! persisted form, same as the loose object store. Correctness of a
//! snapshot never depends on this index being present or accurate: it is
//! a cache of `(size, mtime) -> blob oid` pairs the snapshot builder
//! consults to skip rehashing files that look unchanged, per spec.md
//! §4.6 and §9.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{IoResultExt as _, PgResult};
use crate::oid::Oid;

/// A single cached observation: what a path looked like (size, mtime) the
/// last time it was hashed, and the blob oid that hash produced.
///
/// `path` is carried on the entry itself (rather than only as a `DashMap`
/// key) so `index.json` serializes as a flat JSON array of `IndexEntry`
/// objects, the on-disk shape spec.md documents, instead of an array of
/// `[path, entry]` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub path: String,
    pub size: u64,
    pub mtime_unix_nanos: i128,
    pub blob_oid: Oid,
}

/// In-memory, thread-safe index keyed by repository-relative path.
pub struct Index {
    entries: DashMap<String, IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Loads a previously persisted index, or an empty one if the file
    /// doesn't exist yet. A corrupt index file is treated the same way a
    /// missing one is: the index is advisory, so the safe fallback is to
    /// rehash everything rather than fail the whole repository open.
    pub fn load(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::new();
        };
        let Ok(entries) = serde_json::from_str::<Vec<IndexEntry>>(&text) else {
            return Self::new();
        };
        let map = DashMap::new();
        for entry in entries {
            map.insert(entry.path.clone(), entry);
        }
        Self { entries: map }
    }

    /// Persists the index to `path` via the same atomic temp-file-then-rename
    /// pattern the object store uses.
    pub fn save(&self, path: &Path) -> PgResult<()> {
        let snapshot: Vec<IndexEntry> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let json = serde_json::to_vec_pretty(&snapshot).expect("IndexEntry always serializes");

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).path_context(dir)?;
        let temp_file = NamedTempFile::new_in(dir).path_context(dir)?;
        fs::write(temp_file.path(), &json).path_context(temp_file.path())?;
        temp_file.as_file().sync_all().path_context(temp_file.path())?;
        temp_file
            .persist(path)
            .map_err(|e| crate::error::PathError {
                path: path.to_path_buf(),
                source: e.error,
            })?;
        Ok(())
    }

    /// Returns the cached blob oid for `relative_path` if its on-disk
    /// `(size, mtime)` still matches what was last observed.
    pub fn lookup_unchanged(
        &self,
        relative_path: &str,
        size: u64,
        mtime: SystemTime,
    ) -> Option<Oid> {
        let entry = self.entries.get(relative_path)?;
        let mtime_nanos = to_unix_nanos(mtime);
        if entry.size == size && entry.mtime_unix_nanos == mtime_nanos {
            Some(entry.blob_oid)
        } else {
            None
        }
    }

    /// Records the `(size, mtime) -> blob oid` observation made while
    /// hashing `relative_path`.
    pub fn record(&self, relative_path: String, size: u64, mtime: SystemTime, blob_oid: Oid) {
        self.entries.insert(
            relative_path.clone(),
            IndexEntry {
                path: relative_path,
                size,
                mtime_unix_nanos: to_unix_nanos(mtime),
                blob_oid,
            },
        );
    }

    /// Drops entries for paths that no longer exist in the working tree,
    /// keyed by whatever `still_present` reports.
    pub fn prune(&self, still_present: impl Fn(&str) -> bool) {
        self.entries.retain(|path, _| still_present(path));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

fn to_unix_nanos(t: SystemTime) -> i128 {
    match t.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i128,
        Err(e) => -(e.duration().as_nanos() as i128),
    }
}
