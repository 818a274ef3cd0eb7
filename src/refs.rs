//! Ref database: `HEAD` plus named refs under `refs/`, with a
//! write-ahead journal for crash recovery.
//!
//! jj-lib has no direct counterpart (its `op_store`/`op_walk` log a much
//! richer operation history out of scope here); this module's shape is
//! original to this crate but follows the teacher's file-I/O idioms
//! throughout: atomic temp-file-then-rename writes (`file_util.rs`) and a
//! `thiserror`-based error surface that converges on `PgError`.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{IoResultExt as _, PgError, PgResult};
use crate::oid::Oid;

const HEAD_SYMBOLIC_PREFIX: &str = "ref: ";

/// What a ref file (or `HEAD`) currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    Direct(Oid),
    Symbolic(String),
}

impl RefValue {
    fn to_text(&self) -> String {
        match self {
            Self::Direct(oid) => oid.hex(),
            Self::Symbolic(target) => format!("{HEAD_SYMBOLIC_PREFIX}{target}"),
        }
    }

    fn parse(text: &str) -> Result<Self, PgError> {
        let text = text.trim();
        if let Some(target) = text.strip_prefix(HEAD_SYMBOLIC_PREFIX) {
            return Ok(Self::Symbolic(target.to_string()));
        }
        Oid::try_from_hex(text)
            .map(Self::Direct)
            .map_err(|_| PgError::BadFormat {
                where_: "ref".to_string(),
                detail: format!("not a hex oid or symbolic ref: {text:?}"),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalRecord {
    ref_name: String,
    old_value: Option<String>,
    new_value: String,
    message: String,
    timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommitMarker {
    committed_for: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum JournalLine {
    Commit(CommitMarker),
    Update(JournalRecord),
}

pub struct RefDatabase {
    root: PathBuf,
}

impl RefDatabase {
    /// Opens the ref database rooted at the repository metadata directory
    /// (the `.pg` directory), creating `refs/heads` and `refs/stash/auto`
    /// and an initial symbolic `HEAD` if they don't exist yet.
    pub fn open(root: &Path) -> PgResult<Self> {
        fs::create_dir_all(root.join("refs").join("heads")).path_context(root)?;
        fs::create_dir_all(root.join("refs").join("stash").join("auto")).path_context(root)?;

        let db = Self {
            root: root.to_path_buf(),
        };
        if !db.head_path().is_file() {
            db.write_ref_file("HEAD", &RefValue::Symbolic("refs/heads/main".to_string()).to_text())?;
        }
        Ok(db)
    }

    fn head_path(&self) -> PathBuf {
        self.root.join("HEAD")
    }

    fn journal_path(&self) -> PathBuf {
        self.root.join("journal.log")
    }

    fn ref_file_path(&self, ref_name: &str) -> PathBuf {
        if ref_name == "HEAD" {
            self.head_path()
        } else {
            self.root.join(ref_name)
        }
    }

    fn read_ref_raw(&self, ref_name: &str) -> PgResult<Option<String>> {
        let path = self.ref_file_path(ref_name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PgError::Io(crate::error::PathError { path, source: e })),
        }
    }

    fn write_ref_file(&self, ref_name: &str, text: &str) -> PgResult<()> {
        let path = self.ref_file_path(ref_name);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).path_context(dir)?;
        let mut temp_file = NamedTempFile::new_in(dir).path_context(dir)?;
        writeln!(temp_file, "{text}").path_context(temp_file.path())?;
        temp_file.as_file().sync_all().path_context(temp_file.path())?;
        temp_file
            .persist(&path)
            .map_err(|e| PgError::Io(crate::error::PathError {
                path: path.clone(),
                source: e.error,
            }))?;
        Ok(())
    }

    fn append_journal_line(&self, line: &JournalLine) -> PgResult<()> {
        let path = self.journal_path();
        let json = serde_json::to_string(line).expect("journal records always serialize");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .path_context(&path)?;
        writeln!(file, "{json}").path_context(&path)?;
        file.sync_all().path_context(&path)?;
        Ok(())
    }

    fn truncate_journal(&self) -> PgResult<()> {
        let path = self.journal_path();
        fs::write(&path, b"").path_context(&path)?;
        Ok(())
    }

    /// Resolves a named ref (e.g. `refs/heads/main`) to its direct OID, if
    /// it exists. Symbolic refs are not expected under `refs/`; only
    /// `HEAD` may be symbolic.
    pub fn resolve(&self, ref_name: &str) -> PgResult<Option<Oid>> {
        let Some(text) = self.read_ref_raw(ref_name)? else {
            return Ok(None);
        };
        match RefValue::parse(&text)? {
            RefValue::Direct(oid) => Ok(Some(oid)),
            RefValue::Symbolic(target) => Err(PgError::BadFormat {
                where_: "ref".to_string(),
                detail: format!("{ref_name} unexpectedly symbolic, pointing at {target}"),
            }),
        }
    }

    /// Resolves `HEAD`, following one level of symbolic indirection.
    pub fn resolve_head(&self) -> PgResult<Option<Oid>> {
        let Some(text) = self.read_ref_raw("HEAD")? else {
            return Ok(None);
        };
        match RefValue::parse(&text)? {
            RefValue::Direct(oid) => Ok(Some(oid)),
            RefValue::Symbolic(target) => self.resolve(&target),
        }
    }

    /// The ref `HEAD` currently points at symbolically, if it isn't
    /// detached.
    pub fn head_symbolic_target(&self) -> PgResult<Option<String>> {
        let Some(text) = self.read_ref_raw("HEAD")? else {
            return Ok(None);
        };
        match RefValue::parse(&text)? {
            RefValue::Symbolic(target) => Ok(Some(target)),
            RefValue::Direct(_) => Ok(None),
        }
    }

    /// Reads `ref_name`'s current value as a plain OID: `None` if the ref
    /// doesn't exist or currently holds a symbolic value (only `HEAD` is
    /// ever symbolic; a direct-value CAS against it never matches that
    /// case and falls through to a conflict).
    fn current_direct_value(&self, ref_name: &str) -> PgResult<Option<Oid>> {
        let Some(text) = self.read_ref_raw(ref_name)? else {
            return Ok(None);
        };
        match RefValue::parse(&text)? {
            RefValue::Direct(oid) => Ok(Some(oid)),
            RefValue::Symbolic(_) => Ok(None),
        }
    }

    /// Journaled, compare-and-swap update of `ref_name` to `new_oid`.
    /// `expected` must match the ref's current direct value (`None` if it
    /// doesn't exist yet) or the write is rejected with
    /// [`PgError::RefConflict`] instead of silently overwriting a
    /// concurrent change (spec.md §4.9/§7).
    pub fn update_ref(
        &self,
        ref_name: &str,
        expected: Option<Oid>,
        new_oid: Oid,
        message: &str,
        timestamp: i64,
    ) -> PgResult<()> {
        self.journaled_write(ref_name, expected, &RefValue::Direct(new_oid), message, timestamp)
    }

    pub fn set_head_direct(
        &self,
        expected: Option<Oid>,
        oid: Oid,
        message: &str,
        timestamp: i64,
    ) -> PgResult<()> {
        self.journaled_write("HEAD", expected, &RefValue::Direct(oid), message, timestamp)
    }

    pub fn set_head_symbolic(&self, ref_name: &str, message: &str, timestamp: i64) -> PgResult<()> {
        self.journaled_write_unchecked(
            "HEAD",
            &RefValue::Symbolic(ref_name.to_string()),
            message,
            timestamp,
        )
    }

    fn journaled_write(
        &self,
        ref_name: &str,
        expected: Option<Oid>,
        new_value: &RefValue,
        message: &str,
        timestamp: i64,
    ) -> PgResult<()> {
        let actual = self.current_direct_value(ref_name)?;
        if actual != expected {
            return Err(PgError::RefConflict {
                ref_name: ref_name.to_string(),
                expected,
                actual,
            });
        }
        self.journaled_write_unchecked(ref_name, new_value, message, timestamp)
    }

    fn journaled_write_unchecked(
        &self,
        ref_name: &str,
        new_value: &RefValue,
        message: &str,
        timestamp: i64,
    ) -> PgResult<()> {
        let old_value = self.read_ref_raw(ref_name)?;
        let new_text = new_value.to_text();

        self.append_journal_line(&JournalLine::Update(JournalRecord {
            ref_name: ref_name.to_string(),
            old_value,
            new_value: new_text.clone(),
            message: message.to_string(),
            timestamp,
        }))?;

        self.write_ref_file(ref_name, &new_text)?;

        self.append_journal_line(&JournalLine::Commit(CommitMarker {
            committed_for: ref_name.to_string(),
        }))?;

        self.truncate_journal()?;
        Ok(())
    }

    /// Lists ref names under `prefix` (e.g. `refs/heads`, `refs/stash`),
    /// sorted, with `/`-separated names relative to the metadata root.
    pub fn list(&self, prefix: &str) -> PgResult<Vec<String>> {
        let base = self.root.join(prefix);
        let mut names = Vec::new();
        collect_ref_names(&base, prefix, &mut names)?;
        names.sort();
        Ok(names)
    }

    /// Replays any journal entries left behind by a crash: for every ref
    /// whose last journal record has no matching commit marker, rewrites
    /// the ref file with that record's `new_value`. Returns the refs that
    /// failed to recover; these don't prevent the repository from
    /// opening (spec.md §4.9 / §7).
    pub fn recover(&self) -> Vec<PgError> {
        let mut failures = Vec::new();
        let path = self.journal_path();
        let Ok(contents) = fs::read_to_string(&path) else {
            return failures;
        };
        if contents.trim().is_empty() {
            return failures;
        }

        let mut pending: HashMap<String, JournalRecord> = HashMap::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalLine>(line) {
                Ok(JournalLine::Commit(marker)) => {
                    pending.remove(&marker.committed_for);
                }
                Ok(JournalLine::Update(record)) => {
                    pending.insert(record.ref_name.clone(), record);
                }
                Err(e) => {
                    warn!(%e, line, "skipping unparseable journal line during recovery");
                }
            }
        }

        for (ref_name, record) in pending {
            warn!(ref_name, "reapplying uncommitted journal entry");
            if let Err(e) = self.write_ref_file(&ref_name, &record.new_value) {
                warn!(ref_name, error = %e, "journal recovery failed for ref");
                failures.push(PgError::RecoveryFailed(ref_name));
            }
        }

        if let Err(e) = self.truncate_journal() {
            warn!(error = %e, "failed to clear journal after recovery");
        }

        failures
    }
}

fn collect_ref_names(dir: &Path, prefix: &str, out: &mut Vec<String>) -> PgResult<()> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Ok(());
    };
    for entry in read_dir {
        let entry = entry.path_context(dir)?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let child_prefix = format!("{prefix}/{name}");
        if path.is_dir() {
            collect_ref_names(&path, &child_prefix, out)?;
        } else {
            out.push(child_prefix);
        }
    }
    Ok(())
}
