//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Apply reaches Activating:
//!     → timeouts.rs (deadline on the activation call)
//!     → On expiry: engine takes the RolledBack path, lock released
//! ```
//!
//! # Design Decisions
//! - Every activation call has a deadline
//! - No automatic retries: activation is at-most-once per apply attempt

pub mod timeouts;

pub use timeouts::{with_deadline, DeadlineExceeded};
