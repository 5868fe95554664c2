//! Request extraction.
//!
//! # Responsibilities
//! - Resolve the editing session from the `x-session-id` header
//! - Decode JSON bodies with errors in the service's error format
//!
//! # Design Decisions
//! - A missing session header selects the `default` session
//! - Bodies are decoded regardless of content type; an empty body is the
//!   default value for endpoints whose fields are all optional

use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Request},
    http::{request::Parts, HeaderName},
};
use serde::de::DeserializeOwned;

use crate::changeset::SessionId;
use crate::http::response::ApiError;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_SESSION_ID: HeaderName = HeaderName::from_static("x-session-id");

const MAX_SESSION_ID_LEN: usize = 128;

impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(&X_SESSION_ID) else {
            return Ok(SessionId::default());
        };
        let id = raw
            .to_str()
            .map_err(|_| ApiError::bad_request("x-session-id must be visible ASCII"))?
            .trim();
        parse_session_id(id)
    }
}

fn parse_session_id(id: &str) -> Result<SessionId, ApiError> {
    if id.is_empty() {
        return Ok(SessionId::default());
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(ApiError::bad_request(format!(
            "x-session-id longer than {} characters",
            MAX_SESSION_ID_LEN
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ApiError::bad_request(
            "x-session-id may only contain letters, digits, '-', '_' and '.'",
        ));
    }
    Ok(SessionId::new(id))
}

/// A required JSON body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = read_body(req, state).await?;
        if bytes.is_empty() {
            return Err(ApiError::bad_request("request body is required"));
        }
        decode(&bytes).map(ApiJson)
    }
}

/// A JSON body whose absence means `T::default()`.
pub struct JsonOrDefault<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrDefault<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = read_body(req, state).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonOrDefault(T::default()));
        }
        decode(&bytes).map(JsonOrDefault)
    }
}

async fn read_body<S: Send + Sync>(req: Request, state: &S) -> Result<Bytes, ApiError> {
    Bytes::from_request(req, state)
        .await
        .map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_rules() {
        assert_eq!(parse_session_id("").unwrap(), SessionId::default());
        assert_eq!(parse_session_id("ops-1.a_b").unwrap().as_str(), "ops-1.a_b");
        assert!(parse_session_id("has space").is_err());
        assert!(parse_session_id(&"x".repeat(MAX_SESSION_ID_LEN + 1)).is_err());
    }
}
