//! Substring search over node names and values.

use serde::{Deserialize, Serialize};

use super::{ConfigPath, ConfigTree, PathNode};

/// Search options. Defaults: case-insensitive, names only, whole tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub include_values: bool,
    /// Restrict the search to the subtree at this path.
    pub scope: Option<ConfigPath>,
}

impl ConfigTree {
    /// Nodes whose own segment (or, with `include_values`, whose value)
    /// contains `query`, in depth-first segment order.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<PathNode> {
        let needle = normalize(query, options.case_sensitive);
        let scope = options.scope.clone().unwrap_or_default();
        let mut results = Vec::new();

        self.walk(|path, node| {
            if !path.starts_with(&scope) || (path.len() == scope.len() && !scope.is_root()) {
                return;
            }
            let name_hit = path
                .leaf()
                .map(|segment| normalize(segment, options.case_sensitive).contains(&needle))
                .unwrap_or(false);
            let value_hit = options.include_values
                && node
                    .value
                    .as_deref()
                    .map(|value| normalize(value, options.case_sensitive).contains(&needle))
                    .unwrap_or(false);

            if name_hit || value_hit {
                results.push(PathNode {
                    path: path.clone(),
                    node: node.clone(),
                });
            }
        });

        results
    }
}

fn normalize(text: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        text.to_string()
    } else {
        text.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigTree {
        let mut tree = ConfigTree::new();
        for (path, value) in [
            ("interfaces eth0 address", "192.168.1.1/24"),
            ("interfaces eth0 description", "Uplink"),
            ("interfaces eth1 address", "10.0.0.1/24"),
            ("system host-name", "edge-router"),
        ] {
            tree.set(&path.parse().unwrap(), Some(value.into())).unwrap();
        }
        tree
    }

    #[test]
    fn test_search_names_case_insensitive() {
        let tree = sample();
        let hits = tree.search("ETH", &SearchOptions::default());
        let paths: Vec<String> = hits.iter().map(|h| h.path.to_string()).collect();
        assert_eq!(paths, vec!["interfaces eth0", "interfaces eth1"]);
    }

    #[test]
    fn test_search_case_sensitive() {
        let tree = sample();
        let options = SearchOptions {
            case_sensitive: true,
            include_values: true,
            ..SearchOptions::default()
        };
        assert!(tree.search("uplink", &options).is_empty());
        assert_eq!(tree.search("Uplink", &options).len(), 1);
    }

    #[test]
    fn test_search_values_opt_in() {
        let tree = sample();
        assert!(tree.search("router", &SearchOptions::default()).is_empty());

        let options = SearchOptions {
            include_values: true,
            ..SearchOptions::default()
        };
        let hits = tree.search("router", &options);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path.to_string(), "system host-name");
    }

    #[test]
    fn test_search_scope() {
        let tree = sample();
        let options = SearchOptions {
            scope: Some("interfaces eth1".parse().unwrap()),
            ..SearchOptions::default()
        };
        let hits = tree.search("address", &options);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path.to_string(), "interfaces eth1 address");
    }
}
