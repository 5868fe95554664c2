//! Structural comparison of two snapshots.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::btree_map;
use std::iter::Peekable;

use crate::tree::{ConfigNode, ConfigPath, ConfigTree, PathNode};

/// A leaf whose scalar value differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChange {
    pub path: ConfigPath,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Differences from one snapshot to another.
///
/// `added` and `removed` carry whole subtrees: a container present only on
/// one side is reported once, not leaf by leaf. A path that turns from leaf
/// into container (or back) shows up as one removal plus one addition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigDiff {
    pub added: Vec<PathNode>,
    pub removed: Vec<PathNode>,
    pub changed: Vec<ValueChange>,
}

impl ConfigDiff {
    /// Compare `from` to `to`. Descriptions are not compared.
    pub fn between(from: &ConfigTree, to: &ConfigTree) -> Self {
        let mut diff = ConfigDiff::default();
        diff_children(&ConfigPath::root(), from.root(), to.root(), &mut diff);
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

type Children<'a> = Peekable<btree_map::Iter<'a, String, ConfigNode>>;

fn diff_children(path: &ConfigPath, from: &ConfigNode, to: &ConfigNode, out: &mut ConfigDiff) {
    let mut left: Children<'_> = from.children.iter().peekable();
    let mut right: Children<'_> = to.children.iter().peekable();

    loop {
        let order = match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((a, _)), Some((b, _))) => a.cmp(b),
        };
        match order {
            Ordering::Less => {
                if let Some((name, node)) = left.next() {
                    out.removed.push(path_node(path.child(name.clone()), node));
                }
            }
            Ordering::Greater => {
                if let Some((name, node)) = right.next() {
                    out.added.push(path_node(path.child(name.clone()), node));
                }
            }
            Ordering::Equal => {
                if let (Some((name, old)), Some((_, new))) = (left.next(), right.next()) {
                    diff_node(path.child(name.clone()), old, new, out);
                }
            }
        }
    }
}

fn diff_node(path: ConfigPath, old: &ConfigNode, new: &ConfigNode, out: &mut ConfigDiff) {
    match (old.is_container(), new.is_container()) {
        (true, true) => diff_children(&path, old, new, out),
        (false, false) => {
            if old.value != new.value {
                out.changed.push(ValueChange {
                    path,
                    old_value: old.value.clone(),
                    new_value: new.value.clone(),
                });
            }
        }
        _ => {
            out.removed.push(path_node(path.clone(), old));
            out.added.push(path_node(path, new));
        }
    }
}

fn path_node(path: ConfigPath, node: &ConfigNode) -> PathNode {
    PathNode {
        path,
        node: node.without_descriptions(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[(&str, Option<&str>)]) -> ConfigTree {
        let mut tree = ConfigTree::new();
        for (path, value) in entries {
            tree.set(&path.parse().unwrap(), value.map(str::to_string))
                .unwrap();
        }
        tree
    }

    #[test]
    fn test_identical_trees_have_empty_diff() {
        let a = tree(&[("interfaces eth0 address", Some("10.0.0.1/24"))]);
        assert!(ConfigDiff::between(&a, &a.clone()).is_empty());
    }

    #[test]
    fn test_added_removed_changed() {
        let from = tree(&[
            ("system host-name", Some("edge")),
            ("service ssh port", Some("22")),
        ]);
        let to = tree(&[
            ("system host-name", Some("core")),
            ("interfaces eth0 address", Some("10.0.0.1/24")),
        ]);

        let diff = ConfigDiff::between(&from, &to);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].path.to_string(), "interfaces");
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].path.to_string(), "service");
        assert_eq!(
            diff.changed,
            vec![ValueChange {
                path: "system host-name".parse().unwrap(),
                old_value: Some("edge".into()),
                new_value: Some("core".into()),
            }]
        );
    }

    #[test]
    fn test_leaf_to_container_is_remove_plus_add() {
        let from = tree(&[("service dns", Some("on"))]);
        let to = tree(&[("service dns forwarding", Some("yes"))]);

        let diff = ConfigDiff::between(&from, &to);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.removed[0].path, diff.added[0].path);
        assert_ne!(diff.removed[0], diff.added[0]);
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn test_valueless_leaf_gaining_value_is_change() {
        let from = tree(&[("service ssh disable", None)]);
        let to = tree(&[("service ssh disable", Some("true"))]);
        let diff = ConfigDiff::between(&from, &to);
        assert_eq!(diff.changed.len(), 1);
        assert_eq!(diff.changed[0].old_value, None);
    }

    #[test]
    fn test_descriptions_are_ignored() {
        let from = tree(&[("system host-name", Some("edge"))]);
        let mut to = from.clone();
        to.set_with_description(
            &"system host-name".parse().unwrap(),
            Some("edge".into()),
            Some("primary router".into()),
        )
        .unwrap();
        assert!(ConfigDiff::between(&from, &to).is_empty());
    }
}
