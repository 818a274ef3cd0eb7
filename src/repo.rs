//! Repository façade: wires every component together behind one handle
//! (component 13), mirroring the teacher's `Store::new` — construct the
//! subcomponents, wrap the backend in a cache, hand back one `Arc`-able
//! value the rest of the application drives through (spec.md §4.13).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{self, RepositorySettings};
use crate::diff::{DiffEngine, DiffOptions, FileChange, LineDiffEntry};
use crate::error::{PgError, PgResult};
use crate::ignore::IgnoreMatcher;
use crate::index::Index;
use crate::object::Object;
use crate::oid::Oid;
use crate::refs::RefDatabase;
use crate::snapshot::{CancellationToken, ProgressSink, SnapshotBuilder, SnapshotRequest};
use crate::stash::{StashEntry, StashManager};
use crate::store::{CachedObjectStore, LooseObjectStore, ObjectStore};

/// Source of commit timestamps, injectable so tests never depend on wall
/// clock time (spec.md §9). Grounded on the teacher's `Timestamp::now()`
/// convention in `lib/src/backend.rs`, generalized into a trait so the
/// Repository façade can swap in a fixed clock under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Number of rotating auto-stash slots (spec.md §4.11).
const AUTO_STASH_SLOTS: usize = 5;

const PGIGNORE_FILE_NAME: &str = ".pgignore";
const METADATA_DIR_NAME: &str = ".pg";
const INDEX_FILE_NAME: &str = "index.json";

pub struct Repository {
    project_root: PathBuf,
    meta_root: PathBuf,
    store: CachedObjectStore<LooseObjectStore>,
    refs: RefDatabase,
    index: Index,
    index_path: PathBuf,
    ignore: IgnoreMatcher,
    include_roots: Vec<(String, PathBuf)>,
    settings: RepositorySettings,
    clock: Arc<dyn Clock>,
    recovery_failures: Vec<PgError>,
    next_auto_stash_slot: AtomicUsize,
}

/// Per-call knobs for [`Repository::create_snapshot`].
pub struct CreateSnapshotOptions<'a> {
    pub committer: String,
    pub progress: Option<&'a dyn ProgressSink>,
    pub cancel: Option<&'a CancellationToken>,
}

impl Repository {
    /// Opens (creating if necessary) a repository rooted at
    /// `project_root`, using the system wall clock for commit timestamps.
    pub fn open(
        project_root: impl Into<PathBuf>,
        include_roots: Vec<(String, PathBuf)>,
        settings: RepositorySettings,
    ) -> PgResult<Self> {
        Self::open_with_clock(project_root, include_roots, settings, Arc::new(SystemClock))
    }

    /// Opens a repository with an injectable clock, for deterministic
    /// tests (spec.md §9).
    pub fn open_with_clock(
        project_root: impl Into<PathBuf>,
        include_roots: Vec<(String, PathBuf)>,
        settings: RepositorySettings,
        clock: Arc<dyn Clock>,
    ) -> PgResult<Self> {
        let project_root = project_root.into();
        let meta_root = project_root.join(METADATA_DIR_NAME);
        fs::create_dir_all(&meta_root)
            .map_err(|source| PgError::Io(crate::error::PathError { path: meta_root.clone(), source }))?;

        let loose = LooseObjectStore::open(&meta_root)?;
        let store = CachedObjectStore::with_capacity(loose, settings.cache_size);

        let refs = RefDatabase::open(&meta_root)?;
        let recovery_failures = refs.recover();
        for failure in &recovery_failures {
            warn!(error = %failure, "ref recovery failure during open");
        }

        let index_path = meta_root.join(INDEX_FILE_NAME);
        let index = Index::load(&index_path);

        let ignore = load_ignore(&project_root)?;

        if !meta_root.join("config.json").is_file() {
            config::save_envelope(&meta_root, &serde_json::json!({}))?;
        }

        info!(root = %project_root.display(), "repository opened");

        Ok(Self {
            project_root,
            meta_root,
            store,
            refs,
            index,
            index_path,
            ignore,
            include_roots,
            settings,
            clock,
            recovery_failures,
            next_auto_stash_slot: AtomicUsize::new(0),
        })
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn meta_root(&self) -> &Path {
        &self.meta_root
    }

    /// Ref recovery failures observed while opening. Non-empty doesn't
    /// prevent the repository from being usable (spec.md §4.9/§7).
    pub fn recovery_failures(&self) -> &[PgError] {
        &self.recovery_failures
    }

    /// Builds a snapshot of the current working tree and advances the
    /// current branch (or `HEAD` directly, if detached) to it.
    ///
    /// The branch advance is a compare-and-swap against the parent OID
    /// read at the start of the call: if another writer moved the branch
    /// in the meantime, this returns [`PgError::RefConflict`] instead of
    /// silently overwriting it (spec.md §4.9/§7). The new commit object
    /// itself is still written to the store either way.
    pub fn create_snapshot(&self, message: impl Into<String>, options: CreateSnapshotOptions<'_>) -> PgResult<Oid> {
        let message = message.into();
        let parent_oid = self.refs.resolve_head()?;
        let timestamp = self.clock.now();

        let builder = SnapshotBuilder::new(&self.store, &self.ignore, &self.index, self.index_path.clone());
        let request = SnapshotRequest {
            message: message.clone(),
            author: options.committer.clone(),
            committer: options.committer,
            parent_oid,
            include_roots: self.include_roots.clone(),
            timestamp,
            progress: options.progress,
            cancel: options.cancel,
        };
        let commit_oid = builder.build(request)?;

        match self.refs.head_symbolic_target()? {
            Some(branch) => self.refs.update_ref(&branch, parent_oid, commit_oid, &message, timestamp)?,
            None => self.refs.set_head_direct(parent_oid, commit_oid, &message, timestamp)?,
        }

        Ok(commit_oid)
    }

    /// Creates an automatic stash in the next round-robin slot
    /// (`refs/stash/auto/0..AUTO_STASH_SLOTS`), overwriting the oldest one.
    pub fn create_auto_stash(&self, message: impl Into<String>) -> PgResult<StashEntry> {
        let slot = self.next_auto_stash_slot();
        let timestamp = self.clock.now();
        let builder = SnapshotBuilder::new(&self.store, &self.ignore, &self.index, self.index_path.clone());
        let request = SnapshotRequest {
            message: message.into(),
            author: "pakacage-guardian".to_string(),
            committer: "pakacage-guardian".to_string(),
            parent_oid: self.refs.resolve_head()?,
            include_roots: self.include_roots.clone(),
            timestamp,
            progress: None,
            cancel: None,
        };
        StashManager::new(&self.store, &self.refs).create_auto(&builder, request, slot)
    }

    fn next_auto_stash_slot(&self) -> usize {
        self.next_auto_stash_slot.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |slot| {
            Some((slot + 1) % AUTO_STASH_SLOTS)
        }).unwrap_or(0)
    }

    pub fn list_stashes(&self) -> PgResult<Vec<StashEntry>> {
        StashManager::new(&self.store, &self.refs).list()
    }

    /// Resolves `HEAD` or a named ref (e.g. `refs/heads/main`) to a
    /// commit oid.
    pub fn resolve(&self, ref_name: &str) -> PgResult<Option<Oid>> {
        if ref_name == "HEAD" {
            self.refs.resolve_head()
        } else {
            self.refs.resolve(ref_name)
        }
    }

    pub fn diff_commits(&self, old: Option<Oid>, new: Option<Oid>, options: DiffOptions) -> PgResult<Vec<FileChange>> {
        DiffEngine::new(&self.store, options).diff_commits(old, new)
    }

    pub fn diff_working_to_tree(&self, tree_oid: Option<Oid>, options: DiffOptions) -> PgResult<Vec<FileChange>> {
        DiffEngine::new(&self.store, options).diff_working_to_tree(
            &self.include_roots,
            &self.ignore,
            &self.index,
            tree_oid,
        )
    }

    /// Line-diffs two blobs directly; binary blobs on either side diff to
    /// no lines rather than an error (spec.md §4.10).
    pub fn diff_text(&self, old_blob: Oid, new_blob: Oid) -> PgResult<Vec<LineDiffEntry>> {
        let old_lines = self.read_blob_lines(old_blob)?;
        let new_lines = self.read_blob_lines(new_blob)?;
        match (old_lines, new_lines) {
            (Some(old), Some(new)) => Ok(crate::diff::diff_lines(&old, &new, crate::diff::DEFAULT_LOOKAHEAD)),
            _ => Ok(Vec::new()),
        }
    }

    fn read_blob_lines(&self, oid: Oid) -> PgResult<Option<Vec<String>>> {
        match self.store.read(&oid)? {
            Object::Blob(blob) => Ok(crate::diff::lines_of(&blob.data).ok()),
            other => Err(PgError::BadFormat {
                where_: "diff_text".to_string(),
                detail: format!("{} is not a blob", other.object_type()),
            }),
        }
    }

    pub fn read_object(&self, oid: &Oid) -> PgResult<Object> {
        self.store.read(oid)
    }
}

fn load_ignore(project_root: &Path) -> PgResult<IgnoreMatcher> {
    let path = project_root.join(PGIGNORE_FILE_NAME);
    match fs::read_to_string(&path) {
        Ok(text) => IgnoreMatcher::compile(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IgnoreMatcher::builtin_only()),
        Err(source) => Err(PgError::Io(crate::error::PathError { path, source })),
    }
}
