//! Serialization boundary: trees to and from json, yaml and cli text.
//!
//! Import only builds a tree; staging it, validating it and committing it
//! are the commit engine's job.

pub mod cli;
pub mod document;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};
use crate::tree::{ConfigPath, ConfigTree};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
    Cli,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Yaml => "application/yaml",
            ExportFormat::Cli => "text/plain; charset=utf-8",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
            ExportFormat::Cli => "cli",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            "cli" | "commands" => Ok(ExportFormat::Cli),
            other => Err(EngineError::SerializationFailed(format!(
                "unknown format '{}'",
                other
            ))),
        }
    }
}

pub fn export(tree: &ConfigTree, format: ExportFormat) -> EngineResult<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(&document::to_json_value(tree))?),
        ExportFormat::Yaml => Ok(serde_yaml::to_string(&document::to_json_value(tree))?),
        ExportFormat::Cli => Ok(cli::render(tree)),
    }
}

/// Export only the subtree at `node`, keeping its absolute position.
pub fn export_subtree(tree: &ConfigTree, node: &ConfigPath, format: ExportFormat) -> EngineResult<String> {
    let subtree = tree
        .get(node)
        .ok_or_else(|| EngineError::NotFound(format!("path '{}'", node)))?;
    let mut scoped = ConfigTree::new();
    scoped.graft(node, Some(subtree.clone()))?;
    export(&scoped, format)
}

pub fn import(text: &str, format: ExportFormat) -> EngineResult<ConfigTree> {
    let tree = match format {
        ExportFormat::Json => {
            let value: serde_json::Value = serde_json::from_str(text)?;
            document::from_json_value(&value)?
        }
        ExportFormat::Yaml => {
            let value: serde_yaml::Value = serde_yaml::from_str(text)?;
            document::from_json_value(&document::yaml_to_json(value)?)?
        }
        ExportFormat::Cli => cli::parse(text)?,
    };
    tracing::debug!(%format, nodes = tree.stats().total_nodes, "Imported configuration");
    Ok(tree)
}
