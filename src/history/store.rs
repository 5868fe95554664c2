//! Append-only version log with optional JSON-lines persistence.

use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::diff::ConfigDiff;
use super::{ConfigVersion, HistoryFilter, HistoryPage};
use crate::error::{EngineError, EngineResult};
use crate::tree::ConfigTree;

/// The committed version log.
///
/// Only the commit engine appends, and it does so while holding the apply
/// lock. Readers take a short read lock and never wait on activation.
pub struct HistoryStore {
    versions: RwLock<Vec<Arc<ConfigVersion>>>,
    persistence_path: Option<PathBuf>,
    max_page_size: usize,
}

pub const DEFAULT_PAGE_SIZE: usize = 50;

impl HistoryStore {
    pub fn in_memory() -> Self {
        Self {
            versions: RwLock::new(Vec::new()),
            persistence_path: None,
            max_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Open a store backed by a JSON-lines file, loading any existing log.
    pub fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let path = path.into();
        let versions = if path.exists() {
            load_log(&path)?
        } else {
            Vec::new()
        };
        tracing::info!(
            path = %path.display(),
            versions = versions.len(),
            "Loaded version history"
        );
        Ok(Self {
            versions: RwLock::new(versions),
            persistence_path: Some(path),
            max_page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    /// Append the next version. Its id must follow the latest one.
    ///
    /// The file is written before the in-memory log, so a failed write leaves
    /// the store unchanged.
    pub fn append(&self, version: ConfigVersion) -> EngineResult<Arc<ConfigVersion>> {
        let mut versions = self.versions.write();
        let expected = versions.last().map(|v| v.version).unwrap_or(0) + 1;
        if version.version != expected {
            return Err(EngineError::Conflict(format!(
                "version {} does not follow {}",
                version.version,
                expected - 1
            )));
        }
        if let Some(path) = &self.persistence_path {
            append_line(path, &version)?;
        }
        let version = Arc::new(version);
        versions.push(version.clone());
        Ok(version)
    }

    pub fn latest(&self) -> Option<Arc<ConfigVersion>> {
        self.versions.read().last().cloned()
    }

    pub fn latest_version(&self) -> u64 {
        self.versions.read().last().map(|v| v.version).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.versions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.read().is_empty()
    }

    pub fn get(&self, version: u64) -> Option<Arc<ConfigVersion>> {
        let versions = self.versions.read();
        let index = usize::try_from(version).ok()?.checked_sub(1)?;
        versions.get(index).cloned()
    }

    /// Snapshot at `version`; version 0 is the empty tree.
    pub fn tree_at(&self, version: u64) -> EngineResult<Arc<ConfigTree>> {
        if version == 0 {
            return Ok(Arc::new(ConfigTree::new()));
        }
        self.get(version)
            .map(|v| v.tree.clone())
            .ok_or_else(|| EngineError::NotFound(format!("version {}", version)))
    }

    /// Newest-first page of entries matching `filter`.
    pub fn list(&self, filter: &HistoryFilter) -> HistoryPage {
        let versions = self.versions.read();
        let limit = filter
            .limit
            .unwrap_or(self.max_page_size)
            .min(self.max_page_size);

        let matching: Vec<&Arc<ConfigVersion>> = versions
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, v)| filter.since.map_or(true, |since| v.timestamp >= since))
            .filter(|(_, v)| filter.until.map_or(true, |until| v.timestamp <= until))
            .filter(|(index, v)| match &filter.node {
                None => true,
                Some(node) => {
                    let previous = index
                        .checked_sub(1)
                        .and_then(|i| versions.get(i))
                        .and_then(|p| p.tree.get(node));
                    previous != v.tree.get(node)
                }
            })
            .map(|(_, v)| v)
            .collect();

        let total = matching.len();
        let entries: Vec<_> = matching
            .iter()
            .skip(filter.offset)
            .take(limit)
            .map(|v| v.entry())
            .collect();
        let has_more = filter.offset + entries.len() < total;
        HistoryPage {
            entries,
            total,
            has_more,
        }
    }

    /// Diff between two versions; `to` defaults to the latest.
    pub fn diff(&self, from: u64, to: Option<u64>) -> EngineResult<ConfigDiff> {
        let to = to.unwrap_or_else(|| self.latest_version());
        let from_tree = self.tree_at(from)?;
        let to_tree = self.tree_at(to)?;
        Ok(ConfigDiff::between(&from_tree, &to_tree))
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn load_log(path: &Path) -> EngineResult<Vec<Arc<ConfigVersion>>> {
    let file = File::open(path).map_err(|e| persistence(path, e))?;
    let mut versions: Vec<Arc<ConfigVersion>> = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| persistence(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let version: ConfigVersion = serde_json::from_str(&line).map_err(|e| {
            EngineError::Persistence(format!("{}:{}: {}", path.display(), number + 1, e))
        })?;
        let expected = versions.last().map(|v| v.version).unwrap_or(0) + 1;
        if version.version != expected {
            return Err(EngineError::Persistence(format!(
                "{}:{}: expected version {}, found {}",
                path.display(),
                number + 1,
                expected,
                version.version
            )));
        }
        versions.push(Arc::new(version));
    }
    Ok(versions)
}

fn append_line(path: &Path, version: &ConfigVersion) -> EngineResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| persistence(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, version)?;
    writer.write_all(b"\n").map_err(|e| persistence(path, e))?;
    writer.flush().map_err(|e| persistence(path, e))
}

fn persistence(path: &Path, error: std::io::Error) -> EngineError {
    EngineError::Persistence(format!("{}: {}", path.display(), error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::ChangeType;

    fn version(id: u64, host: &str) -> ConfigVersion {
        let mut tree = ConfigTree::new();
        tree.set(&"system host-name".parse().unwrap(), Some(host.into()))
            .unwrap();
        ConfigVersion::new(id, Arc::new(tree), Some(format!("v{}", id)), None, ChangeType::Configure)
            .unwrap()
    }

    #[test]
    fn test_append_requires_next_id() {
        let store = HistoryStore::in_memory();
        store.append(version(1, "a")).unwrap();
        assert!(matches!(store.append(version(3, "b")), Err(EngineError::Conflict(_))));
        assert_eq!(store.latest_version(), 1);
    }

    #[test]
    fn test_list_newest_first_with_paging() {
        let store = HistoryStore::in_memory();
        for id in 1..=5 {
            store.append(version(id, &format!("h{}", id))).unwrap();
        }

        let page = store.list(&HistoryFilter {
            limit: Some(2),
            offset: 1,
            ..HistoryFilter::default()
        });
        let ids: Vec<u64> = page.entries.iter().map(|e| e.version).collect();
        assert_eq!(ids, vec![4, 3]);
        assert_eq!(page.total, 5);
        assert!(page.has_more);

        let last = store.list(&HistoryFilter {
            limit: Some(2),
            offset: 4,
            ..HistoryFilter::default()
        });
        assert_eq!(last.entries.len(), 1);
        assert!(!last.has_more);
    }

    #[test]
    fn test_list_limit_is_capped() {
        let store = HistoryStore::in_memory().with_max_page_size(2);
        for id in 1..=3 {
            store.append(version(id, "x")).unwrap();
        }
        let page = store.list(&HistoryFilter {
            limit: Some(100),
            ..HistoryFilter::default()
        });
        assert_eq!(page.entries.len(), 2);
    }

    #[test]
    fn test_list_node_filter() {
        let store = HistoryStore::in_memory();
        store.append(version(1, "a")).unwrap();
        store.append(version(2, "a")).unwrap();
        store.append(version(3, "b")).unwrap();

        let page = store.list(&HistoryFilter {
            node: Some("system".parse().unwrap()),
            ..HistoryFilter::default()
        });
        let ids: Vec<u64> = page.entries.iter().map(|e| e.version).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_tree_at_zero_is_empty() {
        let store = HistoryStore::in_memory();
        assert!(store.tree_at(0).unwrap().is_empty());
        assert!(matches!(store.tree_at(7), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_diff_defaults_to_latest() {
        let store = HistoryStore::in_memory();
        store.append(version(1, "a")).unwrap();
        store.append(version(2, "b")).unwrap();
        assert_eq!(store.diff(1, None).unwrap().changed.len(), 1);
        assert!(store.diff(2, None).unwrap().is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");

        let store = HistoryStore::open(&path).unwrap();
        store.append(version(1, "a")).unwrap();
        store.append(version(2, "b")).unwrap();
        drop(store);

        let reopened = HistoryStore::open(&path).unwrap();
        assert_eq!(reopened.latest_version(), 2);
        let v1 = reopened.get(1).unwrap();
        assert_eq!(v1.comment.as_deref(), Some("v1"));
        assert_eq!(v1.hash, version(1, "a").hash);
    }

    #[test]
    fn test_corrupt_log_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();
        assert!(matches!(HistoryStore::open(&path), Err(EngineError::Persistence(_))));
    }
}
