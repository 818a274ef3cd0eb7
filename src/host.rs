//! Host integration surface (spec.md §6, SPEC_FULL.md §1).
//!
//! This crate never touches UI or the host's editor APIs directly; the
//! embedding application implements these traits and calls into the
//! engine from its own save/import/package hooks. Pakacage Guardian only
//! defines the shape of the call.

use std::path::PathBuf;

/// A package that appeared, disappeared, or changed version between two
/// observations of the host's package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSetSummary {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl PackageSetSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// The user's answer to a host-presented dialog (spec.md §6's "prompt
/// before auto-stashing on destructive package operations").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogChoice {
    Proceed,
    Cancel,
}

/// Notifications the host delivers as its own events fire. The engine
/// reacts by scheduling debounced snapshot/stash work through
/// [`crate::task::TaskRunner`]; it does not poll the host.
pub trait HostEvents: Send + Sync {
    fn on_file_saved(&self, path: &std::path::Path);
    fn on_package_set_changed(&self, summary: &PackageSetSummary);
    fn on_assets_imported(&self, paths: &[PathBuf]);
}

/// A host-provided way to ask the user something before a disruptive
/// operation. Implementations back this with whatever native dialog the
/// host environment provides.
pub trait HostDialog: Send + Sync {
    fn show_dialog(&self, title: &str, message: &str) -> DialogChoice;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_reports_empty() {
        let summary = PackageSetSummary {
            added: Vec::new(),
            removed: Vec::new(),
            changed: Vec::new(),
        };
        assert!(summary.is_empty());
    }

    #[test]
    fn non_empty_summary_reports_not_empty() {
        let summary = PackageSetSummary {
            added: vec!["com.example.pkg".to_string()],
            removed: Vec::new(),
            changed: Vec::new(),
        };
        assert!(!summary.is_empty());
    }
}
