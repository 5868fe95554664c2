//! Engine error taxonomy.

use thiserror::Error;

use crate::validator::ConfigValidationError;

/// Errors surfaced by the staging, commit and history subsystems.
///
/// None of these are fatal to the process. Structural and lookup errors are
/// local to one mutation; the rest describe why an apply did not commit.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structural tree violation (leaf/container conflict, empty path).
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Path or version absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// One or more error-severity findings. The candidate is left untouched.
    #[error("Validation failed with {} error(s)", .0.len())]
    ValidationFailed(Vec<ConfigValidationError>),

    /// The activation collaborator failed; the previous version stays active.
    #[error("Activation failed: {0}")]
    ActivationFailed(String),

    /// Another activation holds the lock, or the candidate's lineage is stale.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Export/import format errors.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// History file or startup file I/O.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn invalid_path(path: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable tag, used in API bodies and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. } => "invalid_path",
            Self::NotFound(_) => "not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::ActivationFailed(_) => "activation_failed",
            Self::Conflict(_) => "conflict",
            Self::SerializationFailed(_) => "serialization_failed",
            Self::Persistence(_) => "persistence",
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationFailed(format!("JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::SerializationFailed(format!("YAML: {}", err))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::invalid_path("interfaces eth0", "ancestor holds a value");
        assert_eq!(
            err.to_string(),
            "Invalid path 'interfaces eth0': ancestor holds a value"
        );

        let err = EngineError::Conflict("apply already in progress".into());
        assert_eq!(err.kind(), "conflict");
        assert!(err.to_string().contains("in progress"));
    }

    #[test]
    fn test_validation_failed_counts_findings() {
        let err = EngineError::ValidationFailed(Vec::new());
        assert_eq!(err.to_string(), "Validation failed with 0 error(s)");
    }
}
