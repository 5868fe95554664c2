//! Session registry for open change sets.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::ChangeSet;
use crate::observability::metrics;
use crate::tree::ConfigTree;

/// Editing session identifier. Requests without one share `default`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub const DEFAULT: &'static str = "default";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

struct SessionEntry {
    changes: ChangeSet,
    last_touched: Instant,
}

/// Operator-facing view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub base_version: u64,
    pub pending_changes: usize,
    pub idle_secs: u64,
}

/// Thread-safe map of session → change set.
#[derive(Clone, Default)]
pub struct SessionManager {
    inner: Arc<DashMap<SessionId, SessionEntry>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the session's change set, opening it over the base
    /// returned by `base` if it does not exist yet.
    pub fn with_session<R>(
        &self,
        id: &SessionId,
        base: impl FnOnce() -> (u64, Arc<ConfigTree>),
        f: impl FnOnce(&mut ChangeSet) -> R,
    ) -> R {
        let mut entry = self.inner.entry(id.clone()).or_insert_with(|| {
            let (version, tree) = base();
            tracing::debug!(session = %id, base_version = version, "Session opened");
            SessionEntry {
                changes: ChangeSet::open(version, tree),
                last_touched: Instant::now(),
            }
        });
        entry.last_touched = Instant::now();
        let result = f(&mut entry.changes);
        drop(entry);
        self.record_gauges();
        result
    }

    /// Copy of the session's change set, if open.
    pub fn snapshot(&self, id: &SessionId) -> Option<ChangeSet> {
        self.inspect(id, ChangeSet::clone)
    }

    /// Read the session's change set in place, if open. `f` runs under the
    /// map's shard lock and should only copy out what it needs.
    pub fn inspect<R>(&self, id: &SessionId, f: impl FnOnce(&ChangeSet) -> R) -> Option<R> {
        self.inner.get(id).map(|entry| f(&entry.changes))
    }

    pub fn pending_count(&self, id: &SessionId) -> usize {
        self.inner
            .get(id)
            .map(|entry| entry.changes.pending_count())
            .unwrap_or(0)
    }

    /// Drop the session. Returns the number of changes discarded.
    pub fn discard(&self, id: &SessionId) -> usize {
        let dropped = self
            .inner
            .remove(id)
            .map(|(_, entry)| entry.changes.pending_count())
            .unwrap_or(0);
        self.record_gauges();
        dropped
    }

    /// Drop the session only if nothing was staged since `revision`.
    ///
    /// A session edited while its snapshot was being committed is kept; its
    /// base is then stale and the next apply reports a lineage conflict.
    pub fn clear_committed(&self, id: &SessionId, revision: u64) -> bool {
        let removed = self
            .inner
            .remove_if(id, |_, entry| entry.changes.revision() == revision)
            .is_some();
        self.record_gauges();
        removed
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .inner
            .iter()
            .map(|entry| SessionSummary {
                id: entry.key().clone(),
                base_version: entry.changes.base_version(),
                pending_changes: entry.changes.pending_count(),
                idle_secs: entry.last_touched.elapsed().as_secs(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        summaries
    }

    /// Drop sessions idle for longer than `max_idle`.
    pub fn expire_idle(&self, max_idle: Duration) -> usize {
        let before = self.inner.len();
        self.inner
            .retain(|_, entry| entry.last_touched.elapsed() <= max_idle);
        let expired = before.saturating_sub(self.inner.len());
        if expired > 0 {
            tracing::info!(expired, "Expired idle sessions");
        }
        self.record_gauges();
        expired
    }

    fn record_gauges(&self) {
        let pending: usize = self
            .inner
            .iter()
            .map(|entry| entry.changes.pending_count())
            .sum();
        metrics::record_sessions(self.inner.len(), pending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::PendingChange;

    fn empty_base() -> (u64, Arc<ConfigTree>) {
        (0, Arc::new(ConfigTree::new()))
    }

    fn stage(manager: &SessionManager, id: &SessionId, path: &str, value: &str) {
        manager
            .with_session(id, empty_base, |set| {
                set.apply_change(PendingChange::set(path.parse().unwrap(), Some(value.into())))
            })
            .unwrap();
    }

    #[test]
    fn test_sessions_are_isolated() {
        let manager = SessionManager::new();
        let alice = SessionId::from("alice");
        let bob = SessionId::from("bob");

        stage(&manager, &alice, "system host-name", "a");
        stage(&manager, &bob, "system domain-name", "lan");

        let alice_set = manager.snapshot(&alice).unwrap();
        assert!(!alice_set.candidate().contains(&"system domain-name".parse().unwrap()));
        assert_eq!(manager.count(), 2);
        assert_eq!(manager.pending_count(&bob), 1);
    }

    #[test]
    fn test_inspect_reads_without_opening() {
        let manager = SessionManager::new();
        let id = SessionId::from("alice");
        assert_eq!(manager.inspect(&id, ChangeSet::pending_count), None);
        assert_eq!(manager.count(), 0);

        stage(&manager, &id, "system host-name", "a");
        let value = manager.inspect(&id, |set| {
            set.candidate()
                .get(&"system host-name".parse().unwrap())
                .and_then(|node| node.value.clone())
        });
        assert_eq!(value, Some(Some("a".to_string())));
        assert_eq!(manager.pending_count(&id), 1);
    }

    #[test]
    fn test_discard() {
        let manager = SessionManager::new();
        let id = SessionId::default();
        stage(&manager, &id, "a", "1");

        assert_eq!(manager.discard(&id), 1);
        assert!(manager.snapshot(&id).is_none());
        assert_eq!(manager.discard(&id), 0);
    }

    #[test]
    fn test_clear_committed_respects_revision() {
        let manager = SessionManager::new();
        let id = SessionId::default();
        stage(&manager, &id, "a", "1");
        let revision = manager.snapshot(&id).unwrap().revision();
        stage(&manager, &id, "b", "2");

        assert!(!manager.clear_committed(&id, revision));
        let revision = manager.snapshot(&id).unwrap().revision();
        assert!(manager.clear_committed(&id, revision));
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_expire_idle() {
        let manager = SessionManager::new();
        stage(&manager, &SessionId::from("old"), "a", "1");

        assert_eq!(manager.expire_idle(Duration::from_secs(3600)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(manager.expire_idle(Duration::from_millis(5)), 1);
        assert!(manager.summaries().is_empty());
    }
}
