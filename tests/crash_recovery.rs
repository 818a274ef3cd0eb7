//! Ref updates are written through a journal before the ref file itself
//! changes; a process that crashes between those two steps leaves behind
//! an uncommitted journal record that the next `RefDatabase::open` +
//! `recover()` must replay. This simulates that crash from the outside by
//! writing a journal line directly, matching the documented on-disk
//! format (JSON Lines, `SPEC_FULL.md` §3) rather than reaching into the
//! module's private journal types.

use std::fs;
use std::io::Write as _;
use std::sync::{Arc, Mutex};

use pakacage_guardian::oid::Oid;
use pakacage_guardian::refs::RefDatabase;
use tracing_subscriber::fmt::MakeWriter;

#[test]
fn uncommitted_journal_entry_is_replayed_on_next_open() {
    let dir = tempfile::tempdir().unwrap();

    // Open once to lay down the refs/ directory structure and HEAD.
    RefDatabase::open(dir.path()).unwrap();

    let oid = Oid::of(b"commit 0\0crash-recovery");
    let mut journal = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.path().join("journal.log"))
        .unwrap();
    writeln!(
        journal,
        r#"{{"ref_name":"refs/heads/main","old_value":null,"new_value":"{}","message":"crashed snapshot","timestamp":1700000000}}"#,
        oid.hex()
    )
    .unwrap();
    drop(journal);

    // No commit marker was appended, so the ref file itself was never
    // touched: reopening before recovery still shows no main branch.
    let db = RefDatabase::open(dir.path()).unwrap();
    assert_eq!(db.resolve("refs/heads/main").unwrap(), None);

    let failures = db.recover();
    assert!(failures.is_empty());
    assert_eq!(db.resolve("refs/heads/main").unwrap(), Some(oid));

    // Recovery clears the journal so a second recovery pass is a no-op.
    assert!(db.recover().is_empty());
    let journal_contents = fs::read_to_string(dir.path().join("journal.log")).unwrap();
    assert!(journal_contents.trim().is_empty());
}

#[test]
fn reopening_after_a_clean_update_needs_no_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let db = RefDatabase::open(dir.path()).unwrap();
    let oid = Oid::of(b"commit 0\0clean");
    db.update_ref("refs/heads/main", None, oid, "snapshot", 1_700_000_000).unwrap();

    // Reopen as a fresh process would.
    let reopened = RefDatabase::open(dir.path()).unwrap();
    assert!(reopened.recover().is_empty());
    assert_eq!(reopened.resolve("refs/heads/main").unwrap(), Some(oid));
}

/// A host that never polls progress should still see a recovery replay in
/// its log output, since `recover()` emits `tracing::warn!` events
/// independent of any progress sink.
#[derive(Clone, Default)]
struct CapturingWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturingWriter {
    type Writer = CapturingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn recovery_emits_a_tracing_warning_for_the_replayed_ref() {
    let writer = CapturingWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer.clone())
        .with_ansi(false)
        .finish();

    let dir = tempfile::tempdir().unwrap();
    RefDatabase::open(dir.path()).unwrap();

    let oid = Oid::of(b"commit 0\0crash-recovery-log");
    let mut journal = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.path().join("journal.log"))
        .unwrap();
    writeln!(
        journal,
        r#"{{"ref_name":"refs/heads/main","old_value":null,"new_value":"{}","message":"crashed snapshot","timestamp":1700000000}}"#,
        oid.hex()
    )
    .unwrap();
    drop(journal);

    tracing::subscriber::with_default(subscriber, || {
        let db = RefDatabase::open(dir.path()).unwrap();
        assert!(db.recover().is_empty());
    });

    let logged = String::from_utf8(writer.0.lock().unwrap().clone()).unwrap();
    assert!(logged.contains("reapplying uncommitted journal entry"));
}
