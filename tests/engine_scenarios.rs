mod common;

use futures_util::future::join_all;
use proptest::prelude::*;
use std::sync::Arc;

use common::{engine, path, tree};
use staged_config::changeset::{ChangeSet, PendingChange, SessionId};
use staged_config::commit::ApplyFailure;
use staged_config::history::{ConfigDiff, HistoryFilter};
use staged_config::ConfigTree;

#[tokio::test]
async fn test_set_validate_apply_get() {
    let engine = engine();
    let session = SessionId::default();

    engine
        .stage(
            &session,
            PendingChange::set(path("interfaces eth0 address"), Some("192.168.1.1/24".into())),
        )
        .unwrap();
    let report = engine.validate_session(&session);
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let result = engine.commit_session(&session, None, false).await;
    assert!(result.success, "{:?}", result.message);
    assert_eq!(result.version, Some(1));

    let view = engine.view(&session);
    let node = view.tree.get(&path("interfaces eth0 address")).unwrap();
    assert_eq!(node.value.as_deref(), Some("192.168.1.1/24"));
    assert_eq!(view.pending_changes, 0);
}

#[tokio::test]
async fn test_out_of_range_port_is_rejected() {
    let engine = engine();
    let session = SessionId::new("ops");

    engine
        .stage(
            &session,
            PendingChange::set(path("firewall rule 100 destination-port"), Some("99999".into())),
        )
        .unwrap();
    let report = engine.validate_session(&session);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, path("firewall rule 100 destination-port"));

    let result = engine.commit_session(&session, None, false).await;
    assert!(!result.success);
    assert_eq!(result.failure, Some(ApplyFailure::Validation));
    assert_eq!(engine.active_version(), 0);
    // The candidate survives for the operator to fix.
    assert_eq!(engine.pending_count(&session), 1);
}

#[tokio::test]
async fn test_rollback_creates_new_version_equal_to_target() {
    let engine = engine();
    for name in ["one", "two", "three"] {
        let result = engine
            .apply_tree(tree(&[("system host-name", Some(name))]), None, None)
            .await;
        assert!(result.success);
    }

    let result = engine.rollback(2, None, None, None).await.unwrap();
    assert_eq!(result.version, Some(4));
    assert!(engine.diff(2, Some(4)).unwrap().is_empty());
    assert!(engine.diff(4, None).unwrap().is_empty());

    let v4 = engine.history_get(4).unwrap();
    assert_eq!(v4.hash, engine.history_get(2).unwrap().hash);
    assert_eq!(v4.comment.as_deref(), Some("Rollback to version 2"));
}

#[tokio::test]
async fn test_concurrent_commits_on_one_lineage() {
    let engine = engine();
    let sessions: Vec<SessionId> = (0..8).map(|i| SessionId::new(format!("op-{}", i))).collect();
    for (i, session) in sessions.iter().enumerate() {
        engine
            .stage(
                session,
                PendingChange::set(path("system host-name"), Some(format!("host-{}", i))),
            )
            .unwrap();
    }

    let tasks: Vec<_> = sessions
        .iter()
        .cloned()
        .map(|session| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.commit_session(&session, None, false).await })
        })
        .collect();

    let mut committed = 0;
    for task in tasks {
        let result = task.await.unwrap();
        if result.success {
            committed += 1;
        } else {
            assert_eq!(result.failure, Some(ApplyFailure::Conflict));
        }
    }
    assert_eq!(committed, 1);
    assert_eq!(engine.active_version(), 1);
    assert_eq!(engine.history().len(), 1);
}

#[tokio::test]
async fn test_concurrent_full_tree_applies_are_serialized() {
    let engine = engine();
    let tasks = (0..5).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let name = format!("host-{}", i);
            engine
                .apply_tree(tree(&[("system host-name", Some(name.as_str()))]), None, None)
                .await
        })
    });

    let mut versions = Vec::new();
    for result in join_all(tasks).await {
        let result = result.unwrap();
        assert!(result.success);
        versions.push(result.version.unwrap());
    }
    versions.sort_unstable();
    assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    assert_eq!(engine.active_version(), 5);
}

#[tokio::test]
async fn test_history_lists_newest_first() {
    let engine = engine();
    for name in ["a", "b", "c"] {
        engine
            .apply_tree(tree(&[("system host-name", Some(name))]), Some(name.to_string()), None)
            .await;
    }

    let page = engine.history_list(&HistoryFilter {
        limit: Some(2),
        ..HistoryFilter::default()
    });
    let versions: Vec<u64> = page.entries.iter().map(|e| e.version).collect();
    assert_eq!(versions, vec![3, 2]);
    assert_eq!(page.total, 3);
    assert!(page.has_more);
}

fn segment() -> impl Strategy<Value = String> {
    "[a-c]{1,2}"
}

fn entries() -> impl Strategy<Value = Vec<(Vec<String>, Option<String>)>> {
    prop::collection::vec(
        (
            prop::collection::vec(segment(), 1..4),
            prop::option::of("[0-9]{1,3}"),
        ),
        0..16,
    )
}

/// Entries that would break leaf/container rules are skipped.
fn build(entries: &[(Vec<String>, Option<String>)]) -> ConfigTree {
    let mut tree = ConfigTree::new();
    for (segments, value) in entries {
        if let Ok(p) = staged_config::ConfigPath::new(segments.clone()) {
            let _ = tree.set(&p, value.clone());
        }
    }
    tree
}

proptest! {
    #[test]
    fn prop_disjoint_changes_commute(
        sets in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{1,6}", 0..8),
        deletes in prop::collection::btree_set("[a-z]{1,6}", 0..8),
        seed in any::<u64>(),
    ) {
        let base = {
            let mut base = ConfigTree::new();
            for key in &deletes {
                base.set(&path(&format!("beta {}", key)), Some("x".into())).unwrap();
            }
            base.set(&path("gamma keep"), Some("y".into())).unwrap();
            Arc::new(base)
        };

        let mut changes: Vec<PendingChange> = sets
            .iter()
            .map(|(k, v)| PendingChange::set(path(&format!("alpha {}", k)), Some(v.clone())))
            .chain(deletes.iter().map(|k| PendingChange::delete(path(&format!("beta {}", k)))))
            .collect();

        let mut forward = ChangeSet::open(0, base.clone());
        for change in changes.clone() {
            forward.apply_change(change).unwrap();
        }

        // Deterministic permutation from the seed.
        let mut state = seed;
        for i in (1..changes.len()).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (state >> 33) as usize % (i + 1);
            changes.swap(i, j);
        }
        let mut shuffled = ChangeSet::open(0, base);
        for change in changes {
            shuffled.apply_change(change).unwrap();
        }

        prop_assert_eq!(forward.candidate(), shuffled.candidate());
    }

    #[test]
    fn prop_diff_with_self_is_empty(e in entries()) {
        let t = build(&e);
        prop_assert!(ConfigDiff::between(&t, &t).is_empty());
    }

    #[test]
    fn prop_added_and_removed_are_disjoint(a in entries(), b in entries()) {
        let from = build(&a);
        let to = build(&b);
        let diff = ConfigDiff::between(&from, &to);
        for added in &diff.added {
            prop_assert!(!diff.removed.contains(added));
        }
        prop_assert_eq!(diff.is_empty(), from == to);
    }
}
