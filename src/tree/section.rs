//! Named groupings of top-level paths.
//!
//! Sections reference paths in the tree; they never own nodes.

use serde::Serialize;

use super::{ConfigPath, ConfigTree};

/// Well-known top-level sections, in display order.
pub const KNOWN_SECTIONS: &[&str] = &[
    "interfaces",
    "firewall",
    "nat",
    "protocols",
    "service",
    "system",
    "vpn",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSection {
    pub name: String,
    pub paths: Vec<ConfigPath>,
}

impl ConfigSection {
    /// Sections present in `tree`: known names first, then any other
    /// top-level segment in sorted order.
    pub fn derive(tree: &ConfigTree) -> Vec<ConfigSection> {
        let top = &tree.root().children;
        let known = KNOWN_SECTIONS
            .iter()
            .filter(|name| top.contains_key(**name))
            .map(|name| name.to_string());
        let others = top
            .keys()
            .filter(|name| !KNOWN_SECTIONS.contains(&name.as_str()))
            .cloned();

        known
            .chain(others)
            .map(|name| ConfigSection {
                paths: section_paths(tree, &name),
                name,
            })
            .collect()
    }

    /// Look up one section by name.
    pub fn find(tree: &ConfigTree, name: &str) -> Option<ConfigSection> {
        Self::derive(tree).into_iter().find(|section| section.name == name)
    }
}

/// The section root plus its immediate children.
fn section_paths(tree: &ConfigTree, name: &str) -> Vec<ConfigPath> {
    let root = ConfigPath::root().child(name);
    let mut paths = vec![root.clone()];
    if let Some(node) = tree.get(&root) {
        paths.extend(node.children.keys().map(|child| root.child(child.clone())));
    }
    paths
}
