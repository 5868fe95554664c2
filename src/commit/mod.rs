//! Commit/apply subsystem.
//!
//! # Data Flow
//! ```text
//! ApplyRequest (session candidate, explicit tree, rollback or import)
//!     → Validating   validator runs, in parallel with other requests
//!         → Rejected     any error finding; active untouched
//!         → dry run      stop, report success without activating
//!     → apply lock   one activation at a time (queue with timeout, else Conflict)
//!     → lineage      candidate base must equal the active version, else Conflict
//!     → Activating   activation.rs collaborator under a deadline
//!         → RolledBack   failure or timeout; previous version stays active
//!     → Committed    history append, active pointer swap, session cleared
//! ```
//!
//! # Design Decisions
//! - The engine is an explicitly constructed value with injected history
//!   store and activator; there is no global instance
//! - Everything after the lock is acquired runs in its own task, so a client
//!   that disconnects mid-apply cannot leave activation half done
//! - The shared state channel reports the serialized section only; each
//!   request's validation outcome travels in its own result

pub mod activation;
pub mod engine;

use serde::Serialize;

pub use activation::{ActivationError, Activator, HttpActivator, NoopActivator};
pub use engine::{
    ActiveConfig, ApplyFailure, ApplyRequest, BulkOutcome, CommitEngine, ConfigApplyResult,
    ConfigView, EngineTuning, ImportMode, StageOutcome,
};

/// Apply pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    Idle,
    Validating,
    Activating,
    Committed,
    Rejected,
    RolledBack,
}
