//! Nested-document form of a tree, shared by the JSON and YAML formats.
//!
//! ```text
//! container        → map of children
//! leaf with value  → string
//! valueless leaf   → null
//! ```
//!
//! On import, numbers and booleans become string values, and a list of
//! scalars becomes one valueless child per item (`address: [a, b]`).
//! Descriptions are not carried; the cli format keeps them.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{EngineError, EngineResult};
use crate::tree::{ConfigNode, ConfigPath, ConfigTree};

/// The root always renders as a map, `{}` for an empty tree.
pub fn to_json_value(tree: &ConfigTree) -> Value {
    match node_to_json(tree.root(), None) {
        Value::Null => Value::Object(Map::new()),
        document => document,
    }
}

/// Render one subtree. Containers at `depth` are rendered as `{}` so they
/// stay distinguishable from valueless leaves.
pub fn node_to_json(node: &ConfigNode, depth: Option<usize>) -> Value {
    if node.is_container() {
        if depth == Some(0) {
            return Value::Object(Map::new());
        }
        let map: Map<String, Value> = node
            .children
            .iter()
            .map(|(name, child)| (name.clone(), node_to_json(child, depth.map(|d| d - 1))))
            .collect();
        Value::Object(map)
    } else {
        match &node.value {
            Some(value) => Value::String(value.clone()),
            None => Value::Null,
        }
    }
}

/// Every description under `node`, keyed by absolute path.
pub fn descriptions(node: &ConfigNode, at: &ConfigPath) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();
    collect_descriptions(node, at, &mut found);
    found
}

fn collect_descriptions(node: &ConfigNode, at: &ConfigPath, found: &mut BTreeMap<String, String>) {
    if let Some(description) = &node.description {
        found.insert(at.to_string(), description.clone());
    }
    for (name, child) in &node.children {
        collect_descriptions(child, &at.child(name.clone()), found);
    }
}

pub fn from_json_value(value: &Value) -> EngineResult<ConfigTree> {
    let Value::Object(map) = value else {
        return Err(EngineError::SerializationFailed(
            "document root must be a map".to_string(),
        ));
    };
    let mut tree = ConfigTree::new();
    for (name, child) in map {
        insert(&mut tree, ConfigPath::root().child(name.clone()), child)?;
    }
    Ok(tree)
}

fn insert(tree: &mut ConfigTree, path: ConfigPath, value: &Value) -> EngineResult<()> {
    // Rebuild through ConfigPath::new so segment rules apply to imported keys.
    let path = ConfigPath::new(path.segments().iter().cloned())?;
    match value {
        Value::Object(map) if map.is_empty() => tree.set(&path, None),
        Value::Object(map) => {
            for (name, child) in map {
                insert(tree, path.child(name.clone()), child)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                let segment = scalar(item).ok_or_else(|| {
                    EngineError::SerializationFailed(format!(
                        "list under '{}' may only hold scalars",
                        path
                    ))
                })?;
                let child = ConfigPath::new(path.segments().iter().cloned().chain([segment]))?;
                tree.set(&child, None)?;
            }
            Ok(())
        }
        Value::Null => tree.set(&path, None),
        other => tree.set(&path, scalar(other)),
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Convert a YAML document to the JSON data model. Non-string keys are
/// stringified; tagged values are unwrapped.
pub fn yaml_to_json(value: serde_yaml::Value) -> EngineResult<Value> {
    use serde_yaml::Value as Yaml;
    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => Value::String(n.to_string()),
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<EngineResult<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    other => {
                        return Err(EngineError::SerializationFailed(format!(
                            "unsupported YAML key {:?}",
                            other
                        )))
                    }
                };
                map.insert(key, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => {
            let tagged = *tagged;
            yaml_to_json(tagged.value)?
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_natural_shape() {
        let mut tree = ConfigTree::new();
        tree.set(&"interfaces eth0 address".parse().unwrap(), Some("10.0.0.1/24".into()))
            .unwrap();
        tree.set(&"interfaces eth0 disable".parse().unwrap(), None)
            .unwrap();
        assert_eq!(
            to_json_value(&tree),
            json!({"interfaces": {"eth0": {"address": "10.0.0.1/24", "disable": null}}})
        );
    }

    #[test]
    fn test_empty_tree_is_empty_map() {
        let value = to_json_value(&ConfigTree::new());
        assert_eq!(value, json!({}));
        assert!(from_json_value(&value).unwrap().is_empty());
    }

    #[test]
    fn test_import_scalars_and_lists() {
        let value = json!({
            "firewall": {"rule": {"100": {"destination-port": 443, "log": true}}},
            "service": {"dns": {"listen-address": ["10.0.0.1", "10.0.0.2"]}}
        });
        let tree = from_json_value(&value).unwrap();
        let port = tree
            .get(&"firewall rule 100 destination-port".parse().unwrap())
            .unwrap();
        assert_eq!(port.value.as_deref(), Some("443"));
        assert!(tree.contains(&"service dns listen-address 10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn test_import_rejects_bad_keys() {
        assert!(from_json_value(&json!({"bad key": "x"})).is_err());
        assert!(from_json_value(&json!(["not", "a", "map"])).is_err());
    }

    #[test]
    fn test_yaml_numeric_keys_become_segments() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("firewall:\n  rule:\n    100:\n      action: accept\n").unwrap();
        let tree = from_json_value(&yaml_to_json(yaml).unwrap()).unwrap();
        assert!(tree.contains(&"firewall rule 100 action".parse().unwrap()));
    }

    #[test]
    fn test_depth_keeps_containers_as_empty_maps() {
        let mut tree = ConfigTree::new();
        tree.set(&"system ntp server 0.pool.ntp.org".parse().unwrap(), None)
            .unwrap();
        tree.set(&"system host-name".parse().unwrap(), Some("edge".into()))
            .unwrap();
        assert_eq!(
            node_to_json(tree.root(), Some(2)),
            json!({"system": {"host-name": "edge", "ntp": {}}})
        );
    }

    #[test]
    fn test_descriptions_are_keyed_by_path() {
        let mut tree = ConfigTree::new();
        let path: ConfigPath = "interfaces eth0".parse().unwrap();
        tree.set_with_description(&path.child("address"), Some("10.0.0.1/24".into()), Some("lan".into()))
            .unwrap();
        let found = descriptions(tree.root(), &ConfigPath::root());
        assert_eq!(found.get("interfaces eth0 address").map(String::as_str), Some("lan"));
        assert_eq!(found.len(), 1);
    }
}
