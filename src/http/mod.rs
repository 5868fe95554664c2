//! HTTP binding of the configuration API.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, trace, timeout, body limit)
//!     → request.rs (session from x-session-id, JSON bodies)
//!     → handlers.rs (calls into the commit engine)
//!     → response.rs (engine errors and apply results → status + JSON)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{X_REQUEST_ID, X_SESSION_ID};
pub use response::{ApiError, ApiResult};
pub use server::{build_router, AppState, HttpServer};
