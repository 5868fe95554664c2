//! Service settings subsystem.
//!
//! These are the settings of the service itself (listener, activation
//! collaborator, history file, sessions), not the managed configuration tree.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via ArcSwap with handlers and the admin API
//!
//! On reload (file change or SIGHUP):
//!     watcher.rs loads and validates the new file
//!     → atomic swap of the settings
//!     → engine tuning (activation / queue timeouts) updated in place
//!     → listener, history path and activator keep their startup values
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal files
//! - Validation separates syntactic (serde) from semantic checks
//! - An invalid reload never replaces the running settings

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ActivationConfig, ActivationMode, AdminConfig, EngineConfig, HistoryConfig, ListenerConfig,
    ObservabilityConfig, ServiceConfig, SessionConfig, TlsConfig,
};
pub use watcher::ConfigWatcher;
