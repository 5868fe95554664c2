//! Staged configuration service library.
//!
//! A tree of configuration nodes is edited through per-session change sets,
//! validated, activated through an external collaborator and recorded as an
//! append-only version history that can be diffed and rolled back.

// Engine
pub mod changeset;
pub mod commit;
pub mod error;
pub mod export;
pub mod history;
pub mod tree;
pub mod validator;

// Service
pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use commit::{CommitEngine, ConfigApplyResult};
pub use config::schema::ServiceConfig;
pub use error::{EngineError, EngineResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use tree::{ConfigNode, ConfigPath, ConfigTree};
