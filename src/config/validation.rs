//! Settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, page sizes > 0)
//! - Check that required companions are present (http mode needs an endpoint)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: ServiceConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::{ActivationMode, ServiceConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::new(
                "listener.tls",
                "cert_path and key_path are both required",
            ));
        }
    }

    if config.activation.timeout_secs == 0 {
        errors.push(ValidationError::new(
            "activation.timeout_secs",
            "must be greater than 0",
        ));
    }
    match (&config.activation.mode, &config.activation.endpoint) {
        (ActivationMode::Http, None) => errors.push(ValidationError::new(
            "activation.endpoint",
            "required when mode = \"http\"",
        )),
        (_, Some(endpoint)) => match Url::parse(endpoint) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                "activation.endpoint",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                "activation.endpoint",
                format!("invalid URL: {}", e),
            )),
        },
        _ => {}
    }

    if config.engine.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "engine.request_timeout_secs",
            "must be greater than 0",
        ));
    }
    if config.engine.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "engine.max_body_bytes",
            "must be greater than 0",
        ));
    }
    if config.history.max_page_size == 0 {
        errors.push(ValidationError::new(
            "history.max_page_size",
            "must be greater than 0",
        ));
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new(
            "admin.api_key",
            "required when the admin API is enabled",
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
