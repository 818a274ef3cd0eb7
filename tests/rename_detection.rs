//! End-to-end rename detection: two snapshots of a working tree where a
//! file was renamed without its content changing, diffed through the
//! `Repository` façade (walk + ignore + snapshot + diff + rename all
//! wired together, not just the diff engine in isolation).

use std::fs;

use assert_matches::assert_matches;
use pakacage_guardian::config::RepositorySettings;
use pakacage_guardian::diff::{ChangeKind, DiffOptions};
use pakacage_guardian::repo::{CreateSnapshotOptions, Repository};

fn snapshot_options() -> CreateSnapshotOptions<'static> {
    CreateSnapshotOptions {
        committer: "tester".to_string(),
        progress: None,
        cancel: None,
    }
}

#[test]
fn renaming_a_file_between_snapshots_is_reported_as_a_rename() {
    let project = tempfile::tempdir().unwrap();
    let assets = project.path().join("Assets");
    fs::create_dir(&assets).unwrap();
    fs::write(assets.join("old_name.txt"), b"unchanged content\n").unwrap();

    let repo = Repository::open(
        project.path(),
        vec![("Assets".to_string(), assets.clone())],
        RepositorySettings::default(),
    )
    .unwrap();

    let first = repo.create_snapshot("add file", snapshot_options()).unwrap();

    fs::rename(assets.join("old_name.txt"), assets.join("new_name.txt")).unwrap();
    let second = repo.create_snapshot("rename file", snapshot_options()).unwrap();

    let changes = repo
        .diff_commits(
            Some(first),
            Some(second),
            DiffOptions { detect_renames: true, ..DiffOptions::default() },
        )
        .unwrap();

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].old_path.as_deref(), Some("Assets/old_name.txt"));
    assert_eq!(changes[0].new_path.as_deref(), Some("Assets/new_name.txt"));
    assert_matches!(changes[0].kind, ChangeKind::Renamed { similarity } if similarity == 1.0);
}

#[test]
fn without_rename_detection_enabled_a_rename_is_a_delete_plus_an_add() {
    let project = tempfile::tempdir().unwrap();
    let assets = project.path().join("Assets");
    fs::create_dir(&assets).unwrap();
    fs::write(assets.join("old_name.txt"), b"unchanged content\n").unwrap();

    let repo = Repository::open(
        project.path(),
        vec![("Assets".to_string(), assets.clone())],
        RepositorySettings::default(),
    )
    .unwrap();
    let first = repo.create_snapshot("add file", snapshot_options()).unwrap();

    fs::rename(assets.join("old_name.txt"), assets.join("new_name.txt")).unwrap();
    let second = repo.create_snapshot("rename file", snapshot_options()).unwrap();

    let changes = repo.diff_commits(Some(first), Some(second), DiffOptions::default()).unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().any(|c| matches!(c.kind, ChangeKind::Deleted)));
    assert!(changes.iter().any(|c| matches!(c.kind, ChangeKind::Added)));
}
