//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Settings → Open history → Build activator → Restore active version
//!     → Start reload loop and session sweeper → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight requests → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Reload the settings file
//! ```
//!
//! # Design Decisions
//! - Ordered startup: settings first, then the engine, then the listener
//! - An activation in flight at shutdown runs to completion in its own task

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_engine, run, StartupError};
