//! Candidate validation.
//!
//! # Responsibilities
//! - Structural checks (leaf/container invariant on posted or imported trees)
//! - Required fields (static routes need a next hop, NAT rules a translation)
//! - Value formats (CIDR, IP, ports 1-65535, host name <= 63, domain <= 255)
//! - Referential integrity between sections (rules referencing interfaces)
//! - Conflicts (the same address on two interfaces)
//!
//! # Design Decisions
//! - Returns all findings, not just the first
//! - Pure function of the tree: never mutates, no I/O, safe to run in parallel
//! - Rules run in a fixed order and walk children in sorted order, so output
//!   is reproducible for identical input
//! - Warnings never block an apply; errors always do

pub mod formats;
pub mod rules;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tree::{ConfigPath, ConfigTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigValidationError {
    pub path: ConfigPath,
    pub message: String,
    pub severity: Severity,
    /// Name of the rule that produced the finding.
    #[serde(default)]
    pub rule: String,
}

impl ConfigValidationError {
    pub fn error(path: ConfigPath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            severity: Severity::Error,
            rule: String::new(),
        }
    }

    pub fn warning(path: ConfigPath, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            severity: Severity::Warning,
            rule: String::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{} at '{}': {}", level, self.path, self.message)
    }
}

/// A validation rule. Rules append findings and never fail.
pub trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, tree: &ConfigTree, findings: &mut Vec<ConfigValidationError>);
}

/// Findings split by severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn from_findings(findings: Vec<ConfigValidationError>) -> Self {
        let (errors, warnings) = findings.into_iter().partition(ConfigValidationError::is_error);
        Self { errors, warnings }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Ordered rule set.
pub struct Validator {
    rules: Vec<Box<dyn Rule>>,
}

impl Validator {
    /// The standard rule order: structure, required, format, reference, conflict.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Box::new(rules::StructureRule),
                Box::new(rules::RequiredFieldsRule),
                Box::new(rules::FormatRule),
                Box::new(rules::ReferenceRule),
                Box::new(rules::ConflictRule),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule in order.
    pub fn validate(&self, candidate: &ConfigTree) -> Vec<ConfigValidationError> {
        let mut all = Vec::new();
        for rule in &self.rules {
            let mut findings = Vec::new();
            rule.check(candidate, &mut findings);
            for finding in &mut findings {
                finding.rule = rule.name().to_string();
            }
            all.extend(findings);
        }
        all
    }

    pub fn report(&self, candidate: &ConfigTree) -> ValidationReport {
        ValidationReport::from_findings(self.validate(candidate))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("rules", &self.rule_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[(&str, &str)]) -> ConfigTree {
        let mut tree = ConfigTree::new();
        for (path, value) in entries {
            tree.set(&path.parse().unwrap(), Some(value.to_string())).unwrap();
        }
        tree
    }

    #[test]
    fn test_valid_interface_address() {
        let candidate = tree(&[("interfaces eth0 address", "192.168.1.1/24")]);
        let report = Validator::standard().report(&candidate);
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn test_out_of_range_port_is_single_error() {
        let candidate = tree(&[("firewall rule 100 destination-port", "99999")]);
        let report = Validator::standard().report(&candidate);

        assert_eq!(report.errors.len(), 1);
        let err = &report.errors[0];
        assert_eq!(err.path.to_string(), "firewall rule 100 destination-port");
        assert_eq!(err.rule, "format");
        assert!(err.message.contains("1-65535"));
    }

    #[test]
    fn test_output_is_reproducible() {
        let candidate = tree(&[
            ("interfaces eth0 address", "bogus"),
            ("system host-name", "bad_name"),
            ("firewall rule 5 inbound-interface", "eth9"),
        ]);
        let validator = Validator::standard();
        assert_eq!(validator.validate(&candidate), validator.validate(&candidate));
    }

    #[test]
    fn test_validate_does_not_mutate() {
        let candidate = tree(&[("interfaces eth0 address", "bogus")]);
        let before = candidate.clone();
        let _ = Validator::standard().validate(&candidate);
        assert_eq!(candidate, before);
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(
            Validator::standard().rule_names(),
            vec!["structure", "required", "format", "reference", "conflict"]
        );
    }
}
