//! Error and result responses.
//!
//! # Responsibilities
//! - Map engine errors to HTTP status codes
//! - Render the `{error, status_code, errors?}` error body
//! - Give apply-family results the status of their failure
//!
//! # Design Decisions
//! - Apply results keep their full body on failure so callers see every finding
//! - Handlers never build error bodies by hand

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::commit::{ApplyFailure, ConfigApplyResult};
use crate::error::EngineError;
use crate::validator::ConfigValidationError;

pub type ApiResult<T> = Result<T, ApiError>;

/// An error returned by a handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    errors: Vec<ConfigValidationError>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status_code: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ConfigValidationError>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

pub fn status_for(error: &EngineError) -> StatusCode {
    match error {
        EngineError::InvalidPath { .. } | EngineError::SerializationFailed(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::ActivationFailed(_) => StatusCode::BAD_GATEWAY,
        EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn status_for_failure(failure: ApplyFailure) -> StatusCode {
    match failure {
        ApplyFailure::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ApplyFailure::Conflict => StatusCode::CONFLICT,
        ApplyFailure::Activation => StatusCode::BAD_GATEWAY,
        ApplyFailure::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<EngineError> for ApiError {
    fn from(error: EngineError) -> Self {
        let status = status_for(&error);
        let errors = match &error {
            EngineError::ValidationFailed(findings) => findings.clone(),
            _ => Vec::new(),
        };
        Self {
            status,
            message: error.to_string(),
            errors,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), error = %self.message, "Request failed");
        } else {
            tracing::debug!(status = self.status.as_u16(), error = %self.message, "Request rejected");
        }
        let body = ErrorBody {
            error: self.message,
            status_code: self.status.as_u16(),
            errors: self.errors,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Wraps any apply-family body with the status of its failure, if any.
pub struct Outcome<T> {
    failure: Option<ApplyFailure>,
    body: T,
}

impl<T: Serialize> Outcome<T> {
    pub fn new(failure: Option<ApplyFailure>, body: T) -> Self {
        Self { failure, body }
    }
}

impl From<ConfigApplyResult> for Outcome<ConfigApplyResult> {
    fn from(result: ConfigApplyResult) -> Self {
        Self::new(result.failure, result)
    }
}

impl<T: Serialize> IntoResponse for Outcome<T> {
    fn into_response(self) -> Response {
        let status = self.failure.map(status_for_failure).unwrap_or(StatusCode::OK);
        (status, Json(self.body)).into_response()
    }
}
