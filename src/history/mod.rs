//! Version history subsystem.
//!
//! # Data Flow
//! ```text
//! commit engine (holding the apply lock)
//!     → ConfigVersion::new (timestamp, content hash)
//!     → store.rs append (JSON-lines file first, then memory)
//!
//! readers (no lock on the apply path)
//!     → store.rs list / get / tree_at
//!     → diff.rs structural comparison of two snapshots
//!     → format.rs text rendering of a diff
//! ```
//!
//! # Design Decisions
//! - Append-only: versions are never rewritten, a rollback is a new version
//! - Version ids are contiguous from 1; id 0 is the initial empty tree and
//!   never appears in the log
//! - Snapshots are shared `Arc<ConfigTree>` values, so the active pointer and
//!   the log point at the same tree

pub mod diff;
pub mod format;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::EngineResult;
use crate::tree::{ConfigPath, ConfigTree};

pub use diff::{ConfigDiff, ValueChange};
pub use store::HistoryStore;

/// What produced a version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    #[default]
    Configure,
    Rollback,
    Import,
}

/// An immutable committed snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigVersion {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub change_type: ChangeType,
    /// SHA-256 of the canonical JSON snapshot, hex encoded.
    pub hash: String,
    pub tree: Arc<ConfigTree>,
}

impl ConfigVersion {
    pub fn new(
        version: u64,
        tree: Arc<ConfigTree>,
        comment: Option<String>,
        author: Option<String>,
        change_type: ChangeType,
    ) -> EngineResult<Self> {
        let hash = content_hash(&tree)?;
        Ok(Self {
            version,
            timestamp: Utc::now(),
            comment,
            author,
            change_type,
            hash,
            tree,
        })
    }

    /// Metadata view without the snapshot.
    pub fn entry(&self) -> ConfigHistoryEntry {
        ConfigHistoryEntry {
            version: self.version,
            timestamp: self.timestamp,
            comment: self.comment.clone(),
            author: self.author.clone(),
            change_type: self.change_type,
            hash: self.hash.clone(),
            node_count: self.tree.root().node_count() - 1,
        }
    }
}

/// Hex SHA-256 of the tree's JSON form. Children are sorted maps, so equal
/// trees always hash equally.
pub fn content_hash(tree: &ConfigTree) -> EngineResult<String> {
    let bytes = serde_json::to_vec(tree)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Listing view of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigHistoryEntry {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub change_type: ChangeType,
    pub hash: String,
    pub node_count: usize,
}

/// History query. All bounds are inclusive.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoryFilter {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
    /// Only versions that changed the subtree at this path.
    pub node: Option<ConfigPath>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub entries: Vec<ConfigHistoryEntry>,
    pub total: usize,
    pub has_more: bool,
}
