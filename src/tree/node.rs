//! Node and path types for the configuration tree.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// A path into the tree as an ordered list of segments.
///
/// Parses from `"interfaces eth0 address"`, `"interfaces/eth0/address"` or a
/// JSON array of segments. Serializes as an array.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConfigPath(Vec<String>);

impl ConfigPath {
    /// The root path (no segments).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from segments, rejecting empty or whitespace-bearing ones.
    pub fn new<I, S>(segments: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            if segment.is_empty() || segment.chars().any(char::is_whitespace) {
                return Err(EngineError::invalid_path(
                    segments.join(" "),
                    format!("bad segment {:?}", segment),
                ));
            }
        }
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, if any.
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<ConfigPath> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn child(&self, segment: impl Into<String>) -> ConfigPath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    pub fn join(&self, other: &ConfigPath) -> ConfigPath {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// True if `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &ConfigPath) -> bool {
        self.0.len() >= other.0.len() && self.0[..other.0.len()] == other.0[..]
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

impl FromStr for ConfigPath {
    type Err = EngineError;

    /// Whitespace separates segments when present, so CIDR segments such as
    /// `10.0.0.0/8` survive; otherwise `/` does.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(char::is_whitespace) {
            ConfigPath::new(s.split_whitespace())
        } else {
            ConfigPath::new(s.split('/').filter(|segment| !segment.is_empty()))
        }
    }
}

impl<'de> Deserialize<'de> for ConfigPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Segments(Vec<String>),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Segments(segments) => ConfigPath::new(segments),
            Repr::Text(text) => text.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// A node of the configuration tree.
///
/// A node is either a leaf (optional scalar value, no children) or a container
/// (children, no value). Children are keyed by segment and kept sorted so that
/// traversal order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, ConfigNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ConfigNode {
    pub fn leaf(value: Option<String>) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    pub fn is_container(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes in this subtree, including self.
    pub fn node_count(&self) -> usize {
        1 + self.children.values().map(ConfigNode::node_count).sum::<usize>()
    }

    /// Copy of this subtree with every description removed.
    pub fn without_descriptions(&self) -> ConfigNode {
        ConfigNode {
            value: self.value.clone(),
            children: self
                .children
                .iter()
                .map(|(name, child)| (name.clone(), child.without_descriptions()))
                .collect(),
            description: None,
        }
    }
}

/// A node paired with its absolute path, as returned by queries and diffs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathNode {
    pub path: ConfigPath,
    #[serde(flatten)]
    pub node: ConfigNode,
}
