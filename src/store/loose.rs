//! Loose object backend: one Deflate-compressed file per object, fanned
//! out by the first two hex digits of its id.
//!
//! Grounded on `other_examples/.../lf--rgit/src-objects.rs`'s
//! `path_for_object`/`has_id`/`store` (2-hex/62-hex fanout, skip-if-exists
//! dedup) combined with `lib/src/file_util.rs`'s
//! `persist_content_addressed_temp_file` (temp-file-in-same-dir, fsync,
//! rename-into-place) for crash-safe, idempotent, atomic writes.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::compress;
use crate::error::{CorruptionReason, IoResultExt as _, PgError, PgResult};
use crate::object::{self, Object};
use crate::oid::Oid;

use super::ObjectStore;

pub struct LooseObjectStore {
    objects_dir: PathBuf,
}

impl LooseObjectStore {
    /// Opens (and, if needed, creates) the loose object store rooted at
    /// `<metadata_root>/objects`.
    pub fn open(metadata_root: &Path) -> PgResult<Self> {
        let objects_dir = metadata_root.join("objects");
        fs::create_dir_all(&objects_dir).path_context(&objects_dir)?;
        Ok(Self { objects_dir })
    }

    fn path_for(&self, oid: &Oid) -> PathBuf {
        let (dir, rest) = oid.fanout();
        self.objects_dir.join(dir).join(rest)
    }

    fn fanout_dir_for(&self, oid: &Oid) -> PathBuf {
        let (dir, _) = oid.fanout();
        self.objects_dir.join(dir)
    }
}

impl ObjectStore for LooseObjectStore {
    fn has(&self, oid: &Oid) -> bool {
        self.path_for(oid).is_file()
    }

    fn read(&self, oid: &Oid) -> PgResult<Object> {
        let path = self.path_for(oid);
        let compressed = fs::read(&path).path_context(&path)?;
        let framed = compress::decompress(&compressed).map_err(|_| PgError::Corrupted {
            oid: *oid,
            reason: CorruptionReason::Unparseable,
        })?;

        let recomputed = Oid::of(&framed);
        if recomputed != *oid {
            return Err(PgError::Corrupted {
                oid: *oid,
                reason: CorruptionReason::HashMismatch,
            });
        }

        object::parse(&framed).map_err(|_| PgError::Corrupted {
            oid: *oid,
            reason: CorruptionReason::Unparseable,
        })
    }

    fn write(&self, object: &Object) -> PgResult<Oid> {
        let framed = object.framed();
        let oid = Oid::of(&framed);
        let path = self.path_for(&oid);

        if path.is_file() {
            // Content-addressed dedup: identical content, nothing to do.
            return Ok(oid);
        }

        let dir = self.fanout_dir_for(&oid);
        fs::create_dir_all(&dir).path_context(&dir)?;

        let compressed = compress::compress(&framed)?;
        let temp_file = NamedTempFile::new_in(&dir).path_context(&dir)?;
        fs::write(temp_file.path(), &compressed).path_context(temp_file.path())?;
        temp_file.as_file().sync_all().path_context(temp_file.path())?;
        persist_idempotent(temp_file, &path)?;

        Ok(oid)
    }
}

/// Persists `temp_file` at `dest`, tolerating a concurrent writer that got
/// there first with the same (content-addressed) bytes.
fn persist_idempotent(temp_file: NamedTempFile, dest: &Path) -> PgResult<()> {
    match temp_file.persist(dest) {
        Ok(_) => Ok(()),
        Err(err) if dest.is_file() => {
            let _ = err;
            Ok(())
        }
        Err(err) => Err(PgError::Io(crate::error::PathError {
            path: dest.to_path_buf(),
            source: err.error,
        })),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::object::Blob;

    fn temp_store() -> (tempfile::TempDir, LooseObjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseObjectStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_dir, store) = temp_store();
        let object = Object::Blob(Blob::new(b"hello\n".to_vec()));
        let oid = store.write(&object).unwrap();
        assert!(store.has(&oid));
        assert_eq!(store.read(&oid).unwrap(), object);
    }

    #[test]
    fn write_is_idempotent() {
        let (_dir, store) = temp_store();
        let object = Object::Blob(Blob::new(b"same content".to_vec()));
        let oid1 = store.write(&object).unwrap();
        let oid2 = store.write(&object).unwrap();
        assert_eq!(oid1, oid2);
    }

    #[test]
    fn missing_object_is_io_error() {
        let (_dir, store) = temp_store();
        let oid = Oid::of(b"blob 1\0x");
        assert!(!store.has(&oid));
        assert!(store.read(&oid).is_err());
    }

    #[test]
    fn corrupted_bytes_on_disk_are_detected() {
        let (dir, store) = temp_store();
        let object = Object::Blob(Blob::new(b"original".to_vec()));
        let oid = store.write(&object).unwrap();
        let (fanout_dir, rest) = oid.fanout();
        let path = dir.path().join("objects").join(fanout_dir).join(rest);

        // Tamper with the stored bytes directly.
        let tampered = compress::compress(b"blob 7\0tamper!").unwrap();
        fs::write(&path, tampered).unwrap();

        let err = store.read(&oid).unwrap_err();
        assert_matches!(err, PgError::Corrupted { .. });
    }

    #[test]
    fn fanout_layout_matches_spec() {
        let (dir, store) = temp_store();
        let object = Object::Blob(Blob::new(b"fanout check".to_vec()));
        let oid = store.write(&object).unwrap();
        let (fanout_dir, rest) = oid.fanout();
        assert!(dir
            .path()
            .join("objects")
            .join(&fanout_dir)
            .join(&rest)
            .is_file());
        assert_eq!(fanout_dir.len(), 2);
        assert_eq!(rest.len(), 62);
    }
}
