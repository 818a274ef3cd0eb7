//! Stash Manager: snapshots taken ad hoc (named) or automatically before
//! a risky operation (auto, round-robin slotted), stored as commits under
//! `refs/stash` rather than on the current branch (spec.md §4.11).
//!
//! No teacher equivalent — jj-lib has no stash concept, and its closest
//! analog (the operation log) is out of scope per DESIGN.md — so this
//! module is a direct implementation of spec.md §4.11 built on the
//! Snapshot Builder and Ref Database this crate already has.

use tracing::warn;

use crate::error::PgResult;
use crate::object::Object;
use crate::oid::Oid;
use crate::refs::RefDatabase;
use crate::snapshot::{SnapshotBuilder, SnapshotRequest};
use crate::store::ObjectStore;

/// One entry under `refs/stash` or `refs/stash/auto`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashEntry {
    pub ref_name: String,
    pub oid: Oid,
    pub timestamp: i64,
    pub message: String,
}

pub struct StashManager<'s, S: ObjectStore> {
    store: &'s S,
    refs: &'s RefDatabase,
}

impl<'s, S: ObjectStore> StashManager<'s, S> {
    pub fn new(store: &'s S, refs: &'s RefDatabase) -> Self {
        Self { store, refs }
    }

    /// Creates an automatic stash in `refs/stash/auto/<slot>`, overwriting
    /// whatever was previously in that slot (spec.md §4.11's round-robin
    /// retention; slot selection is the caller's responsibility).
    pub fn create_auto(
        &self,
        builder: &SnapshotBuilder<'_, S>,
        request: SnapshotRequest<'_>,
        slot: usize,
    ) -> PgResult<StashEntry> {
        self.create(builder, request, &format!("refs/stash/auto/{slot}"))
    }

    /// Creates a named stash in `refs/stash/<name>`.
    pub fn create_named(
        &self,
        builder: &SnapshotBuilder<'_, S>,
        request: SnapshotRequest<'_>,
        name: &str,
    ) -> PgResult<StashEntry> {
        self.create(builder, request, &format!("refs/stash/{name}"))
    }

    fn create(
        &self,
        builder: &SnapshotBuilder<'_, S>,
        request: SnapshotRequest<'_>,
        ref_name: &str,
    ) -> PgResult<StashEntry> {
        let message = request.message.clone();
        let timestamp = request.timestamp;
        let oid = builder.build(request)?;
        // Stash slots are round-robin overwritten by design (spec.md
        // §4.11), so the CAS is against whatever this slot currently
        // holds rather than requiring it to be empty.
        let expected = self.refs.resolve(ref_name)?;
        self.refs.update_ref(ref_name, expected, oid, &message, timestamp)?;
        Ok(StashEntry {
            ref_name: ref_name.to_string(),
            oid,
            timestamp,
            message,
        })
    }

    /// Lists every stash entry (named and auto), sorted by ref name.
    /// Refs whose commit can't be read are skipped with a warning rather
    /// than failing the whole listing.
    pub fn list(&self) -> PgResult<Vec<StashEntry>> {
        let mut entries = Vec::new();
        for ref_name in self.refs.list("refs/stash")? {
            let Some(oid) = self.refs.resolve(&ref_name)? else {
                continue;
            };
            match self.store.read(&oid) {
                Ok(Object::Commit(commit)) => entries.push(StashEntry {
                    ref_name,
                    oid,
                    timestamp: commit.timestamp,
                    message: commit.message,
                }),
                Ok(_) => warn!(ref_name, "stash ref does not point at a commit, skipping"),
                Err(e) => warn!(ref_name, error = %e, "unreadable stash commit, skipping"),
            }
        }
        Ok(entries)
    }
}
