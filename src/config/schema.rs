//! Service settings schema.
//!
//! This module defines the complete settings structure for the service.
//! All types derive Serde traits for deserialization from TOML files, and
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::commit::EngineTuning;

/// Root settings for the configuration service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// The activation collaborator.
    pub activation: ActivationConfig,

    /// Apply pipeline and request limits.
    pub engine: EngineConfig,

    /// Version log persistence.
    pub history: HistoryConfig,

    /// Editing sessions.
    pub sessions: SessionConfig,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,
}

impl ServiceConfig {
    /// Values the engine can pick up without a restart.
    pub fn engine_tuning(&self) -> EngineTuning {
        EngineTuning {
            activation_timeout: Duration::from_secs(self.activation.timeout_secs),
            queue_timeout: Duration::from_millis(self.engine.apply_queue_timeout_ms),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivationMode {
    /// Accept every candidate without touching a live system.
    #[default]
    Noop,
    /// POST candidates to `endpoint`.
    Http,
}

/// Activation collaborator settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ActivationConfig {
    pub mode: ActivationMode,

    /// Activation endpoint URL (required for `http`).
    pub endpoint: Option<String>,

    /// Bearer token sent to the endpoint.
    pub api_key: Option<String>,

    /// Deadline on one activation call. Reloadable.
    pub timeout_secs: u64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            mode: ActivationMode::Noop,
            endpoint: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Apply pipeline and request limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a concurrent apply waits for the activation lock before
    /// returning Conflict (0 = reject immediately). Reloadable.
    pub apply_queue_timeout_ms: u64,

    /// Whole-request timeout for the REST binding.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            apply_queue_timeout_ms: 2_000,
            request_timeout_secs: 60,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Version log settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HistoryConfig {
    /// JSON-lines file holding every committed version. In memory when unset.
    pub persistence_path: Option<String>,

    /// Target of `commit {saveFile: true}`.
    pub startup_path: Option<String>,

    /// Upper bound on one history page.
    pub max_page_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            persistence_path: None,
            startup_path: None,
            max_page_size: 100,
        }
    }
}

/// Editing session settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions idle longer than this are dropped (0 disables the sweep).
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3_600,
        }
    }
}

/// Admin API settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,

    /// Bearer key for `/admin/*`. Reloadable.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter listen address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "staged_config=info,tower_http=info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
