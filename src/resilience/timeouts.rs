//! Deadline enforcement for external calls.
//!
//! # Responsibilities
//! - Bound every call to an external collaborator with a deadline
//! - Report a timeout as its own error, distinct from the call's failures
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the wrapped future is dropped on expiry
//! - A zero deadline means "no deadline"

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{operation} timed out after {}ms", .after.as_millis())]
pub struct DeadlineExceeded {
    pub operation: &'static str,
    pub after: Duration,
}

/// Run `future` to completion or until `deadline` elapses.
pub async fn with_deadline<F>(
    operation: &'static str,
    deadline: Duration,
    future: F,
) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    if deadline.is_zero() {
        return Ok(future.await);
    }
    match tokio::time::timeout(deadline, future).await {
        Ok(output) => Ok(output),
        Err(_) => {
            tracing::warn!(operation, deadline_ms = deadline.as_millis() as u64, "Deadline exceeded");
            Err(DeadlineExceeded {
                operation,
                after: deadline,
            })
        }
    }
}
