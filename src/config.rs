//! Host-supplied repository settings and the reserved `config.json`
//! envelope (spec.md §6).
//!
//! Grounded on `lib/src/config.rs` only for the *idea* of a dedicated
//! config module with its own error surface; the layered TOML
//! resolution/migration machinery there (`config_resolver.rs`,
//! multi-layer merge, `ConfigMigrateError`) isn't used, since spec.md §6
//! describes settings as a flat struct the host passes in at
//! construction time, not a layered user config file (see DESIGN.md).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{IoResultExt as _, PgResult};

/// Mirrors spec.md §6's `settings` block, plus the rename-detection
/// defaults SPEC_FULL.md §2 calls out as part of the ambient
/// configuration surface. Any field missing from a deserialized value
/// falls back to [`Default::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySettings {
    pub enabled: bool,
    pub auto_snapshot_on_save: bool,
    pub auto_stash_on_scene_save: bool,
    pub auto_stash_on_pkg_change: bool,
    pub debounce_ms: u64,
    pub cache_size: usize,
    pub rename_threshold: f32,
    pub rename_limit: usize,
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_snapshot_on_save: true,
            auto_stash_on_scene_save: true,
            auto_stash_on_pkg_change: true,
            debounce_ms: 500,
            cache_size: crate::store::DEFAULT_CAPACITY,
            rename_threshold: 0.5,
            rename_limit: 1000,
        }
    }
}

/// Reads `<meta_root>/config.json`, treating a missing or blank file as
/// the reserved empty envelope spec.md §6 says is valid.
pub fn load_envelope(meta_root: &Path) -> PgResult<serde_json::Value> {
    let path = meta_root.join("config.json");
    match fs::read_to_string(&path) {
        Ok(text) if text.trim().is_empty() => Ok(serde_json::json!({})),
        Ok(text) => serde_json::from_str(&text).map_err(|_| crate::error::PgError::BadFormat {
            where_: "config.json".to_string(),
            detail: "not valid JSON".to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(serde_json::json!({})),
        Err(e) => Err(crate::error::PgError::Io(crate::error::PathError { path, source: e })),
    }
}

/// Persists the envelope atomically, same temp-file-then-rename pattern
/// used throughout the crate for crash-safe writes.
pub fn save_envelope(meta_root: &Path, value: &serde_json::Value) -> PgResult<()> {
    let path = meta_root.join("config.json");
    let json = serde_json::to_vec_pretty(value).expect("JSON value always serializes");

    fs::create_dir_all(meta_root).path_context(meta_root)?;
    let temp_file = NamedTempFile::new_in(meta_root).path_context(meta_root)?;
    fs::write(temp_file.path(), &json).path_context(temp_file.path())?;
    temp_file.as_file().sync_all().path_context(temp_file.path())?;
    temp_file
        .persist(&path)
        .map_err(|e| crate::error::PgError::Io(crate::error::PathError { path, source: e.error }))?;
    Ok(())
}
