//! Configuration tree subsystem.
//!
//! # Data Flow
//! ```text
//! active ConfigTree (immutable, shared via Arc)
//!     → clone() per editing session (candidate)
//!     → set()/delete() from the change set manager
//!     → validator reads it, commit engine activates it
//!     → history stores it as a version snapshot
//! ```
//!
//! # Design Decisions
//! - Children are a sorted map keyed by segment: unique names, stable order
//! - Leaf/container are mutually exclusive: a node with children holds no value
//! - Deletes remove only the addressed subtree; the parent stays even when
//!   left without children

pub mod node;
pub mod search;
pub mod section;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

pub use node::{ConfigNode, ConfigPath, PathNode};
pub use search::SearchOptions;
pub use section::ConfigSection;

/// A configuration snapshot.
///
/// `Clone` is a deep copy; a candidate cloned from the active tree never
/// aliases it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree {
    root: ConfigNode,
}

/// Shape statistics of a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeStats {
    pub total_nodes: usize,
    pub leaf_nodes: usize,
    pub container_nodes: usize,
    pub max_depth: usize,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_root(root: ConfigNode) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &ConfigNode {
        &self.root
    }

    pub fn into_root(self) -> ConfigNode {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Look up the node at `path`. The root path returns the root node.
    pub fn get(&self, path: &ConfigPath) -> Option<&ConfigNode> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    pub fn contains(&self, path: &ConfigPath) -> bool {
        self.get(path).is_some()
    }

    /// Set the value at `path`, creating intermediate containers.
    ///
    /// Fails with `InvalidPath` if an ancestor holds a value, or if a value is
    /// set on a node that already has children. Setting `None` on an existing
    /// container leaves it as is.
    pub fn set(&mut self, path: &ConfigPath, value: Option<String>) -> EngineResult<()> {
        self.set_with_description(path, value, None)
    }

    /// Like [`ConfigTree::set`], also replacing the node's description when
    /// one is given.
    pub fn set_with_description(
        &mut self,
        path: &ConfigPath,
        value: Option<String>,
        description: Option<String>,
    ) -> EngineResult<()> {
        let Some((last, ancestors)) = path.segments().split_last() else {
            return Err(EngineError::invalid_path(path, "cannot set the root"));
        };

        let mut node = &mut self.root;
        for (depth, segment) in ancestors.iter().enumerate() {
            let child = node.children.entry(segment.clone()).or_default();
            if child.value.is_some() {
                return Err(EngineError::invalid_path(
                    path,
                    format!(
                        "ancestor '{}' holds a value",
                        path.segments()[..=depth].join(" ")
                    ),
                ));
            }
            node = child;
        }

        let target = node.children.entry(last.clone()).or_default();
        if value.is_some() && target.is_container() {
            return Err(EngineError::invalid_path(
                path,
                "node has children and cannot hold a value",
            ));
        }
        if value.is_some() || target.is_leaf() {
            target.value = value;
        }
        if description.is_some() {
            target.description = description;
        }
        Ok(())
    }

    /// Replace the description of an existing node, leaving its value alone.
    pub fn describe(&mut self, path: &ConfigPath, description: Option<String>) -> EngineResult<()> {
        let mut node = &mut self.root;
        for segment in path.segments() {
            node = node
                .children
                .get_mut(segment)
                .ok_or_else(|| EngineError::NotFound(format!("path '{}'", path)))?;
        }
        node.description = description;
        Ok(())
    }

    /// Remove the subtree rooted at `path`.
    pub fn delete(&mut self, path: &ConfigPath) -> EngineResult<ConfigNode> {
        let (Some(parent), Some(leaf)) = (path.parent(), path.leaf()) else {
            return Err(EngineError::invalid_path(path, "cannot delete the root"));
        };
        let not_found = || EngineError::NotFound(format!("path '{}'", path));
        let mut node = &mut self.root;
        for segment in parent.segments() {
            node = node.children.get_mut(segment).ok_or_else(not_found)?;
        }
        node.children.remove(leaf).ok_or_else(not_found)
    }

    /// Replace (or remove, when `replacement` is `None`) the subtree at `path`.
    pub fn graft(&mut self, path: &ConfigPath, replacement: Option<ConfigNode>) -> EngineResult<()> {
        if path.is_root() {
            self.root = replacement.unwrap_or_default();
            return Ok(());
        }
        match replacement {
            Some(subtree) => {
                // Creates containers and checks ancestors.
                self.set(path, None)?;
                let Some(parent) = path.parent() else {
                    return Ok(());
                };
                let mut node = &mut self.root;
                for segment in parent.segments() {
                    node = node
                        .children
                        .get_mut(segment)
                        .ok_or_else(|| EngineError::NotFound(format!("path '{}'", parent)))?;
                }
                if let Some(leaf) = path.leaf() {
                    node.children.insert(leaf.to_string(), subtree);
                }
                Ok(())
            }
            None => match self.delete(path) {
                Ok(_) | Err(EngineError::NotFound(_)) => Ok(()),
                Err(e) => Err(e),
            },
        }
    }

    /// Overlay `other` onto this tree: leaves of `other` win.
    pub fn merge(&mut self, other: &ConfigTree) -> EngineResult<()> {
        let mut leaves = Vec::new();
        collect_leaves(&other.root, &ConfigPath::root(), &mut leaves);
        for (path, node) in leaves {
            self.set_with_description(&path, node.value.clone(), node.description.clone())?;
        }
        Ok(())
    }

    /// Depth-first walk over every node except the root, in segment order.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(&ConfigPath, &ConfigNode),
    {
        fn inner<F: FnMut(&ConfigPath, &ConfigNode)>(
            node: &ConfigNode,
            path: &ConfigPath,
            visit: &mut F,
        ) {
            for (name, child) in &node.children {
                let child_path = path.child(name.clone());
                visit(&child_path, child);
                inner(child, &child_path, visit);
            }
        }
        inner(&self.root, &ConfigPath::root(), &mut visit);
    }

    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            total_nodes: 1,
            ..TreeStats::default()
        };
        self.walk(|path, node| {
            stats.total_nodes += 1;
            if node.is_leaf() {
                stats.leaf_nodes += 1;
            } else {
                stats.container_nodes += 1;
            }
            stats.max_depth = stats.max_depth.max(path.len());
        });
        if self.root.is_container() {
            stats.container_nodes += 1;
        }
        stats
    }

    /// Check the leaf/container invariant over the whole tree.
    ///
    /// Trees built through `set` always satisfy it; imported or posted trees
    /// may not.
    pub fn structural_violations(&self) -> Vec<ConfigPath> {
        let mut violations = Vec::new();
        self.walk(|path, node| {
            if node.value.is_some() && node.is_container() {
                violations.push(path.clone());
            }
        });
        violations
    }
}

fn collect_leaves(node: &ConfigNode, path: &ConfigPath, out: &mut Vec<(ConfigPath, ConfigNode)>) {
    for (name, child) in &node.children {
        let child_path = path.child(name.clone());
        if child.is_leaf() {
            out.push((child_path, child.clone()));
        } else {
            collect_leaves(child, &child_path, out);
        }
    }
}
