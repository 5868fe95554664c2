//! Per-session change staging.
//!
//! # Data Flow
//! ```text
//! session opens   → candidate = active.clone(), base_version recorded
//! set / delete    → applied to the candidate, logged as PendingChange
//! validate        → validator reads the candidate
//! commit / apply  → commit engine consumes a snapshot, clears on success
//! discard         → candidate and log dropped; active untouched
//! ```
//!
//! # Design Decisions
//! - One candidate per session, never shared; sessions that open concurrently
//!   each clone whatever was active at that moment
//! - A failed change is rejected alone; earlier changes stay staged
//! - The log records net effect: last write wins per path, and a change that
//!   brings a path back to its base state drops out of the log
//! - Change sets are never persisted; only committed versions are durable

pub mod session;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::tree::{ConfigPath, ConfigTree};

pub use session::{SessionId, SessionManager, SessionSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Set,
    Delete,
}

/// One staged mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub kind: ChangeKind,
    pub path: ConfigPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl PendingChange {
    pub fn set(path: ConfigPath, value: Option<String>) -> Self {
        Self {
            kind: ChangeKind::Set,
            path,
            value,
            comment: None,
        }
    }

    pub fn delete(path: ConfigPath) -> Self {
        Self {
            kind: ChangeKind::Delete,
            path,
            value: None,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }
}

/// A change that could not be staged.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedChange {
    pub index: usize,
    pub path: ConfigPath,
    pub error: String,
}

/// Candidate tree plus the log of changes that produced it.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    base_version: u64,
    base: Arc<ConfigTree>,
    candidate: ConfigTree,
    changes: Vec<PendingChange>,
    revision: u64,
}

impl ChangeSet {
    /// Open a change set over `base`. The candidate is a deep copy.
    pub fn open(base_version: u64, base: Arc<ConfigTree>) -> Self {
        let candidate = base.as_ref().clone();
        Self {
            base_version,
            base,
            candidate,
            changes: Vec::new(),
            revision: 0,
        }
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn base(&self) -> &ConfigTree {
        &self.base
    }

    pub fn candidate(&self) -> &ConfigTree {
        &self.candidate
    }

    pub fn changes(&self) -> &[PendingChange] {
        &self.changes
    }

    pub fn pending_count(&self) -> usize {
        self.changes.len()
    }

    /// Bumped on every accepted change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Apply one change to the candidate.
    ///
    /// On error the candidate and log are unchanged.
    pub fn apply_change(&mut self, change: PendingChange) -> EngineResult<()> {
        check_change(&change)?;
        match change.kind {
            ChangeKind::Set => self.candidate.set_with_description(
                &change.path,
                change.value.clone(),
                change.comment.clone(),
            )?,
            ChangeKind::Delete => {
                self.candidate.delete(&change.path)?;
            }
        }

        // Entries at or below this path are superseded by the new one.
        self.changes
            .retain(|earlier| !earlier.path.starts_with(&change.path));
        if change.kind == ChangeKind::Delete {
            self.drop_implicit_containers(&change.path);
        }

        // Any earlier entry may have been undone by this change.
        let (base, candidate) = (&self.base, &self.candidate);
        self.changes
            .retain(|earlier| base.get(&earlier.path) != candidate.get(&earlier.path));

        // A set under a logged ancestor stays so the log replays; a delete
        // under a logged delete is already implied by it.
        let keep = match change.kind {
            ChangeKind::Set => {
                self.covered_by(&change.path, None) || !self.is_net_noop(&change.path)
            }
            ChangeKind::Delete => {
                !self.covered_by(&change.path, Some(ChangeKind::Delete))
                    && !self.is_net_noop(&change.path)
            }
        };
        if keep {
            self.changes.push(change);
        }
        self.revision += 1;
        Ok(())
    }

    /// A logged entry, of `kind` when given, sits at or above `path`.
    fn covered_by(&self, path: &ConfigPath, kind: Option<ChangeKind>) -> bool {
        self.changes.iter().any(|earlier| {
            kind.map_or(true, |kind| earlier.kind == kind) && path.starts_with(&earlier.path)
        })
    }

    /// Remove empty ancestors of `path` that this session created only as
    /// intermediate containers. Base nodes the session has not deleted, and
    /// nodes staged explicitly, stay.
    fn drop_implicit_containers(&mut self, path: &ConfigPath) {
        let mut current = path.parent();
        while let Some(ancestor) = current {
            let from_base = self.base.contains(&ancestor)
                && !self.covered_by(&ancestor, Some(ChangeKind::Delete));
            let staged = self
                .changes
                .iter()
                .any(|c| c.kind == ChangeKind::Set && c.path == ancestor);
            if ancestor.is_root() || from_base || staged {
                break;
            }
            let empty = self
                .candidate
                .get(&ancestor)
                .is_some_and(|node| node.is_leaf() && node.value.is_none());
            if !empty || self.candidate.delete(&ancestor).is_err() {
                break;
            }
            current = ancestor.parent();
        }
    }

    /// Apply changes in order; failures are reported and skipped.
    pub fn apply_all(&mut self, changes: Vec<PendingChange>, stop_on_error: bool) -> Vec<RejectedChange> {
        let mut rejected = Vec::new();
        for (index, change) in changes.into_iter().enumerate() {
            let path = change.path.clone();
            if let Err(e) = self.apply_change(change) {
                rejected.push(RejectedChange {
                    index,
                    path,
                    error: e.to_string(),
                });
                if stop_on_error {
                    break;
                }
            }
        }
        rejected
    }

    /// Candidate state at `path` matches the base.
    fn is_net_noop(&self, path: &ConfigPath) -> bool {
        self.base.get(path) == self.candidate.get(path)
    }
}

/// Validate a client-supplied change before staging.
pub fn check_change(change: &PendingChange) -> EngineResult<()> {
    if change.path.is_root() {
        return Err(EngineError::invalid_path(&change.path, "empty path"));
    }
    if change.kind == ChangeKind::Delete && change.value.is_some() {
        return Err(EngineError::invalid_path(
            &change.path,
            "delete does not take a value",
        ));
    }
    Ok(())
}
