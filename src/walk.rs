//! Sorted working-tree traversal shared by the Snapshot Builder and the
//! working-tree side of the Diff Engine.
//!
//! Grounded on the general shape of jj-lib's `local_working_copy.rs`
//! (a working-copy scanner feeding a snapshot), adapted to spec.md
//! §4.8's simpler contract: one sorted recursive walk per root, ignore
//! rules applied as it goes, symlinks recorded but never followed.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::IoResultExt as _;
use crate::error::PgResult;
use crate::ignore::IgnoreMatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkKind {
    File,
    Symlink,
}

#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// `/`-separated path including the root name, e.g. `Assets/foo.txt`.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub kind: WalkKind,
    pub size: u64,
    pub mtime: SystemTime,
}

/// A warning produced for a path that couldn't be read; reported through
/// the caller's progress sink rather than aborting the walk.
#[derive(Debug, Clone)]
pub struct WalkWarning {
    pub relative_path: String,
    pub detail: String,
}

/// Walks every root, skipping ignored paths, and returns files and
/// symlinks in sorted order (directories are not themselves entries).
/// Unreadable entries are collected as warnings instead of aborting.
pub fn walk(
    roots: &[(String, PathBuf)],
    ignore: &IgnoreMatcher,
) -> PgResult<(Vec<WalkEntry>, Vec<WalkWarning>)> {
    let mut entries = Vec::new();
    let mut warnings = Vec::new();
    for (root_name, root_path) in roots {
        if !root_path.is_dir() {
            continue;
        }
        walk_dir(root_path, root_name, ignore, &mut entries, &mut warnings)?;
    }
    Ok((entries, warnings))
}

fn walk_dir(
    abs_dir: &Path,
    relative_dir: &str,
    ignore: &IgnoreMatcher,
    entries: &mut Vec<WalkEntry>,
    warnings: &mut Vec<WalkWarning>,
) -> PgResult<()> {
    let read_dir = match fs::read_dir(abs_dir) {
        Ok(rd) => rd,
        Err(e) => {
            warnings.push(WalkWarning {
                relative_path: relative_dir.to_string(),
                detail: e.to_string(),
            });
            return Ok(());
        }
    };

    let mut children: Vec<_> = read_dir.filter_map(Result::ok).collect();
    children.sort_by_key(|entry| entry.file_name());

    for child in children {
        let name = child.file_name().to_string_lossy().into_owned();
        let relative_path = format!("{relative_dir}/{name}");
        let absolute_path = child.path();

        let metadata = match fs::symlink_metadata(&absolute_path) {
            Ok(m) => m,
            Err(e) => {
                warnings.push(WalkWarning {
                    relative_path,
                    detail: e.to_string(),
                });
                continue;
            }
        };

        let is_dir_for_ignore = metadata.is_dir();
        if ignore.is_ignored(&relative_path, is_dir_for_ignore) {
            continue;
        }

        if metadata.file_type().is_symlink() {
            let target_len = match fs::read_link(&absolute_path) {
                Ok(target) => target.to_string_lossy().len() as u64,
                Err(e) => {
                    warnings.push(WalkWarning {
                        relative_path,
                        detail: e.to_string(),
                    });
                    continue;
                }
            };
            entries.push(WalkEntry {
                relative_path,
                absolute_path,
                kind: WalkKind::Symlink,
                size: target_len,
                mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        } else if metadata.is_dir() {
            walk_dir(&absolute_path, &relative_path, ignore, entries, warnings)?;
        } else {
            entries.push(WalkEntry {
                relative_path,
                absolute_path,
                kind: WalkKind::File,
                size: metadata.len(),
                mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
    }

    Ok(())
}

/// Reads the logical content of a walked entry: file bytes, or the
/// symlink's target path text for a symlink (never the bytes of what it
/// points at).
pub fn read_entry_bytes(entry: &WalkEntry) -> PgResult<Vec<u8>> {
    match entry.kind {
        WalkKind::File => fs::read(&entry.absolute_path).path_context(&entry.absolute_path),
        WalkKind::Symlink => fs::read_link(&entry.absolute_path)
            .map(|target| target.to_string_lossy().into_owned().into_bytes())
            .path_context(&entry.absolute_path),
    }
    .map_err(Into::into)
}
