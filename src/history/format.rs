//! Text rendering of a diff.
//!
//! ```text
//! + interfaces eth0 address 10.0.0.1/24
//! - service ssh port 22
//! ~ system host-name edge -> core
//! ```

use super::diff::ConfigDiff;
use crate::tree::{ConfigNode, ConfigPath};

/// One line per affected leaf, sorted by path. Added and removed subtrees are
/// expanded to their leaves.
pub fn render_text(diff: &ConfigDiff) -> String {
    let mut lines: Vec<(ConfigPath, u8, String)> = Vec::new();

    for removed in &diff.removed {
        for_each_leaf(&removed.path, &removed.node, &mut |path, value| {
            lines.push((path.clone(), 0, line('-', path, value)));
        });
    }
    for added in &diff.added {
        for_each_leaf(&added.path, &added.node, &mut |path, value| {
            lines.push((path.clone(), 1, line('+', path, value)));
        });
    }
    for change in &diff.changed {
        lines.push((
            change.path.clone(),
            2,
            format!(
                "~ {} {} -> {}",
                change.path,
                change.old_value.as_deref().unwrap_or("(none)"),
                change.new_value.as_deref().unwrap_or("(none)")
            ),
        ));
    }

    lines.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    lines
        .into_iter()
        .map(|(_, _, text)| text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn line(sign: char, path: &ConfigPath, value: Option<&str>) -> String {
    match value {
        Some(value) => format!("{} {} {}", sign, path, value),
        None => format!("{} {}", sign, path),
    }
}

fn for_each_leaf(path: &ConfigPath, node: &ConfigNode, visit: &mut dyn FnMut(&ConfigPath, Option<&str>)) {
    if node.is_leaf() {
        visit(path, node.value.as_deref());
        return;
    }
    for (name, child) in &node.children {
        for_each_leaf(&path.child(name.clone()), child, visit);
    }
}
