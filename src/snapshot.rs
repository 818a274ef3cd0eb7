//! Snapshot Builder: walks the working tree, reuses the index to skip
//! rehashing unchanged files, and emits blobs/trees/a commit.
//!
//! Grounded on spec.md §4.8's algorithm directly; the suspension-point
//! and progress-sink shape mirrors how the teacher's long operations
//! (e.g. `Store::get_commit`'s cache-then-backend fallthrough) keep I/O
//! and bookkeeping separated from the caller-visible contract.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{PgError, PgResult};
use crate::ignore::IgnoreMatcher;
use crate::index::Index;
use crate::object::{Commit, Mode, Object, Tree, TreeEntry};
use crate::oid::Oid;
use crate::store::ObjectStore;
use crate::walk::{self, WalkEntry, WalkKind};

/// A single `(fraction, status)` progress tick.
#[derive(Debug, Clone)]
pub struct Progress {
    pub fraction: f32,
    pub status: String,
}

/// Receives progress ticks and non-fatal warnings from long operations.
/// Implemented by host UI glue; the library never assumes a particular
/// thread or sink.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: Progress);
    fn warn(&self, message: &str);
}

/// A sink that discards everything, for callers that don't care.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn report(&self, _progress: Progress) {}
    fn warn(&self, _message: &str) {}
}

/// A cheaply cloneable flag long operations poll between suspension
/// points (§5: between files, between tree entries, between
/// rename-candidate rows).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Inputs to a single snapshot build (spec.md §4.8).
pub struct SnapshotRequest<'a> {
    pub message: String,
    pub author: String,
    pub committer: String,
    pub parent_oid: Option<Oid>,
    pub include_roots: Vec<(String, PathBuf)>,
    pub timestamp: i64,
    pub progress: Option<&'a dyn ProgressSink>,
    pub cancel: Option<&'a CancellationToken>,
}

pub struct SnapshotBuilder<'s, S: ObjectStore> {
    store: &'s S,
    ignore: &'s IgnoreMatcher,
    index: &'s Index,
    index_path: PathBuf,
}

impl<'s, S: ObjectStore> SnapshotBuilder<'s, S> {
    pub fn new(store: &'s S, ignore: &'s IgnoreMatcher, index: &'s Index, index_path: PathBuf) -> Self {
        Self {
            store,
            ignore,
            index,
            index_path,
        }
    }

    /// Runs the full algorithm and returns the new commit's OID. Does
    /// *not* move any ref; the caller (the Repository façade) performs
    /// the journaled ref update.
    pub fn build(&self, request: SnapshotRequest<'_>) -> PgResult<Oid> {
        let progress = request.progress;
        let report = |fraction: f32, status: &str| {
            if let Some(sink) = progress {
                sink.report(Progress {
                    fraction,
                    status: status.to_string(),
                });
            }
        };

        report(0.0, "scanning working tree");
        let (entries, warnings) = walk::walk(&request.include_roots, self.ignore)?;
        for warning in &warnings {
            let message = format!("skipping unreadable path {}: {}", warning.relative_path, warning.detail);
            warn!(path = %warning.relative_path, detail = %warning.detail, "unreadable path during snapshot");
            if let Some(sink) = progress {
                sink.warn(&message);
            }
        }

        let total = entries.len().max(1);
        let mut hashed: Vec<(String, Oid)> = Vec::with_capacity(entries.len());

        for (i, entry) in entries.iter().enumerate() {
            if request.cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(PgError::Cancelled);
            }

            match self.hash_or_reuse(entry) {
                Ok(blob_oid) => hashed.push((entry.relative_path.clone(), blob_oid)),
                Err(e) => {
                    let message = format!("skipping unreadable file {}: {}", entry.relative_path, e);
                    warn!(path = %entry.relative_path, error = %e, "unreadable file during snapshot hashing");
                    if let Some(sink) = progress {
                        sink.warn(&message);
                    }
                }
            }

            report(
                0.1 + 0.7 * (i as f32 / total as f32),
                &format!("hashed {}", entry.relative_path),
            );
        }

        let hashed_paths: std::collections::HashSet<&str> =
            hashed.iter().map(|(path, _)| path.as_str()).collect();
        self.index.prune(|path| hashed_paths.contains(path));

        report(0.8, "building trees");
        let items: Vec<(Vec<&str>, Oid)> = hashed
            .iter()
            .map(|(path, oid)| (path.split('/').collect(), *oid))
            .collect();

        let tree_oid = if items.is_empty() {
            self.store.write(&Object::Tree(Tree::from_entries(Vec::new())?))?
        } else {
            self.build_tree(items, request.cancel)?
        };

        report(0.9, "writing commit");
        let commit = Commit {
            tree: tree_oid,
            parents: request.parent_oid.into_iter().collect(),
            author: request.author,
            committer: request.committer,
            timestamp: request.timestamp,
            message: request.message,
        };
        let commit_oid = self.store.write(&Object::Commit(commit))?;

        report(0.95, "saving index");
        if let Err(e) = self.index.save(&self.index_path) {
            warn!(error = %e, "failed to persist snapshot index");
        }

        report(1.0, "done");
        Ok(commit_oid)
    }

    fn hash_or_reuse(&self, entry: &WalkEntry) -> PgResult<Oid> {
        if entry.kind == WalkKind::File {
            if let Some(oid) = self
                .index
                .lookup_unchanged(&entry.relative_path, entry.size, entry.mtime)
            {
                debug!(path = %entry.relative_path, "reusing cached blob oid");
                return Ok(oid);
            }
        }

        let bytes = walk::read_entry_bytes(entry)?;
        let blob = Object::Blob(crate::object::Blob::new(bytes));
        let oid = self.store.write(&blob)?;

        if entry.kind == WalkKind::File {
            self.index
                .record(entry.relative_path.clone(), entry.size, entry.mtime, oid);
        }

        Ok(oid)
    }

    fn build_tree(
        &self,
        items: Vec<(Vec<&str>, Oid)>,
        cancel: Option<&CancellationToken>,
    ) -> PgResult<Oid> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(PgError::Cancelled);
        }

        let mut direct: Vec<(&str, Oid)> = Vec::new();
        let mut groups: BTreeMap<&str, Vec<(Vec<&str>, Oid)>> = BTreeMap::new();

        for (mut components, oid) in items {
            if components.len() == 1 {
                direct.push((components[0], oid));
            } else {
                let head = components.remove(0);
                groups.entry(head).or_default().push((components, oid));
            }
        }

        let mut entries = Vec::new();
        for (name, oid) in direct {
            entries.push(TreeEntry {
                name: name.to_string(),
                mode: Mode::File,
                oid,
            });
        }
        for (name, sub_items) in groups {
            let sub_oid = self.build_tree(sub_items, cancel)?;
            entries.push(TreeEntry {
                name: name.to_string(),
                mode: Mode::Dir,
                oid: sub_oid,
            });
        }

        let tree = Tree::from_entries(entries)?;
        self.store.write(&Object::Tree(tree))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::store::LooseObjectStore;
    use std::fs;

    struct Fixture {
        _repo_dir: tempfile::TempDir,
        work_dir: tempfile::TempDir,
        store: LooseObjectStore,
        ignore: IgnoreMatcher,
        index: Index,
        index_path: PathBuf,
    }

    fn setup() -> Fixture {
        let repo_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let store = LooseObjectStore::open(repo_dir.path()).unwrap();
        let index_path = repo_dir.path().join("index.json");
        Fixture {
            _repo_dir: repo_dir,
            work_dir,
            store,
            ignore: IgnoreMatcher::builtin_only(),
            index: Index::new(),
            index_path,
        }
    }

    #[test]
    fn snapshot_of_empty_roots_produces_empty_tree_commit() {
        let Fixture { _repo_dir, work_dir: work, store, ignore, index, index_path } = setup();
        let assets = work.path().join("Assets");
        fs::create_dir(&assets).unwrap();

        let builder = SnapshotBuilder::new(&store, &ignore, &index, index_path);
        let request = SnapshotRequest {
            message: "empty".to_string(),
            author: "a".to_string(),
            committer: "a".to_string(),
            parent_oid: None,
            include_roots: vec![("Assets".to_string(), assets)],
            timestamp: 1_700_000_000,
            progress: None,
            cancel: None,
        };
        let commit_oid = builder.build(request).unwrap();

        let Object::Commit(commit) = store.read(&commit_oid).unwrap() else {
            panic!("expected commit");
        };
        assert!(commit.parents.is_empty());
        let Object::Tree(tree) = store.read(&commit.tree).unwrap() else {
            panic!("expected tree");
        };
        assert!(tree.is_empty());
    }

    #[test]
    fn snapshot_with_files_builds_nested_tree() {
        let Fixture { _repo_dir, work_dir: work, store, ignore, index, index_path } = setup();
        let assets = work.path().join("Assets");
        fs::create_dir_all(assets.join("nested")).unwrap();
        fs::write(assets.join("top.txt"), b"top").unwrap();
        fs::write(assets.join("nested").join("deep.txt"), b"deep").unwrap();

        let builder = SnapshotBuilder::new(&store, &ignore, &index, index_path);
        let request = SnapshotRequest {
            message: "first".to_string(),
            author: "a".to_string(),
            committer: "a".to_string(),
            parent_oid: None,
            include_roots: vec![("Assets".to_string(), assets)],
            timestamp: 1_700_000_000,
            progress: None,
            cancel: None,
        };
        let commit_oid = builder.build(request).unwrap();

        let Object::Commit(commit) = store.read(&commit_oid).unwrap() else {
            panic!("expected commit");
        };
        let Object::Tree(root) = store.read(&commit.tree).unwrap() else {
            panic!("expected tree");
        };
        let assets_entry = root.get("Assets").unwrap();
        assert!(assets_entry.mode.is_dir());

        let Object::Tree(assets_tree) = store.read(&assets_entry.oid).unwrap() else {
            panic!("expected tree");
        };
        assert!(assets_tree.get("top.txt").is_some());
        assert!(assets_tree.get("nested").unwrap().mode.is_dir());
    }

    #[test]
    fn second_snapshot_reuses_unchanged_blob_via_index() {
        let Fixture { _repo_dir, work_dir: work, store, ignore, index, index_path } = setup();
        let assets = work.path().join("Assets");
        fs::create_dir(&assets).unwrap();
        fs::write(assets.join("file.txt"), b"content").unwrap();

        let builder = SnapshotBuilder::new(&store, &ignore, &index, index_path);
        let make_request = |parent| SnapshotRequest {
            message: "m".to_string(),
            author: "a".to_string(),
            committer: "a".to_string(),
            parent_oid: parent,
            include_roots: vec![("Assets".to_string(), assets.clone())],
            timestamp: 1_700_000_000,
            progress: None,
            cancel: None,
        };

        let first = builder.build(make_request(None)).unwrap();
        assert_eq!(index.len(), 1);
        let second = builder.build(make_request(Some(first))).unwrap();

        let Object::Commit(commit1) = store.read(&first).unwrap() else { panic!() };
        let Object::Commit(commit2) = store.read(&second).unwrap() else { panic!() };
        assert_eq!(commit1.tree, commit2.tree);
    }

    #[test]
    fn cancellation_before_any_work_returns_cancelled() {
        let Fixture { _repo_dir, work_dir: work, store, ignore, index, index_path } = setup();
        let assets = work.path().join("Assets");
        fs::create_dir(&assets).unwrap();
        fs::write(assets.join("file.txt"), b"content").unwrap();

        let token = CancellationToken::new();
        token.cancel();

        let builder = SnapshotBuilder::new(&store, &ignore, &index, index_path);
        let request = SnapshotRequest {
            message: "m".to_string(),
            author: "a".to_string(),
            committer: "a".to_string(),
            parent_oid: None,
            include_roots: vec![("Assets".to_string(), assets)],
            timestamp: 1,
            progress: None,
            cancel: Some(&token),
        };
        assert_matches!(builder.build(request), Err(PgError::Cancelled));
    }

    #[test]
    #[cfg(unix)]
    fn unreadable_file_is_skipped_with_a_warning_not_an_abort() {
        use std::os::unix::fs::PermissionsExt;

        let Fixture { _repo_dir, work_dir: work, store, ignore, index, index_path } = setup();
        let assets = work.path().join("Assets");
        fs::create_dir(&assets).unwrap();
        fs::write(assets.join("ok.txt"), b"readable").unwrap();
        let locked = assets.join("locked.txt");
        fs::write(&locked, b"secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        struct RecordingSink {
            warnings: std::sync::Mutex<Vec<String>>,
        }
        impl ProgressSink for RecordingSink {
            fn report(&self, _progress: Progress) {}
            fn warn(&self, message: &str) {
                self.warnings.lock().unwrap().push(message.to_string());
            }
        }
        let sink = RecordingSink { warnings: std::sync::Mutex::new(Vec::new()) };

        let builder = SnapshotBuilder::new(&store, &ignore, &index, index_path);
        let request = SnapshotRequest {
            message: "partial".to_string(),
            author: "a".to_string(),
            committer: "a".to_string(),
            parent_oid: None,
            include_roots: vec![("Assets".to_string(), assets.clone())],
            timestamp: 1_700_000_000,
            progress: Some(&sink),
            cancel: None,
        };
        let commit_oid = builder.build(request).unwrap();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

        let Object::Commit(commit) = store.read(&commit_oid).unwrap() else {
            panic!("expected commit");
        };
        let Object::Tree(root) = store.read(&commit.tree).unwrap() else {
            panic!("expected tree");
        };
        let Object::Tree(assets_tree) = store.read(&root.get("Assets").unwrap().oid).unwrap() else {
            panic!("expected tree");
        };
        assert!(assets_tree.get("ok.txt").is_some());
        assert!(assets_tree.get("locked.txt").is_none());
        assert!(sink
            .warnings
            .lock()
            .unwrap()
            .iter()
            .any(|w| w.contains("locked.txt")));
    }
}
