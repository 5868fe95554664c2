//! The external activation collaborator.
//!
//! An activator receives a fully validated candidate and either makes it the
//! running configuration or reports why it could not. The engine calls it at
//! most once per apply attempt and bounds the call with a deadline.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::tree::ConfigTree;

#[derive(Debug, Error)]
pub enum ActivationError {
    /// The collaborator answered and refused the candidate.
    #[error("rejected by activation service: {0}")]
    Rejected(String),

    /// The collaborator could not be reached or answered garbage.
    #[error("activation transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Activator: Send + Sync {
    fn name(&self) -> &str;

    async fn activate(&self, candidate: &ConfigTree) -> Result<(), ActivationError>;
}

/// Accepts every candidate. Used when the engine runs without a live system.
#[derive(Debug, Default, Clone)]
pub struct NoopActivator;

#[async_trait]
impl Activator for NoopActivator {
    fn name(&self) -> &str {
        "noop"
    }

    async fn activate(&self, candidate: &ConfigTree) -> Result<(), ActivationError> {
        tracing::debug!(nodes = candidate.stats().total_nodes, "Noop activation");
        Ok(())
    }
}

/// POSTs `{"config": <tree>}` to an activation endpoint.
///
/// A 2xx answer is success unless its JSON body says `"success": false`.
pub struct HttpActivator {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct ActivationReply {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

fn default_true() -> bool {
    true
}

impl HttpActivator {
    /// `timeout` bounds a single HTTP exchange; the engine applies its own
    /// deadline on top.
    pub fn new(endpoint: Url, api_key: Option<String>, timeout: Duration) -> Result<Self, ActivationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ActivationError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Activator for HttpActivator {
    fn name(&self) -> &str {
        "http"
    }

    async fn activate(&self, candidate: &ConfigTree) -> Result<(), ActivationError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "config": candidate }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ActivationError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ActivationError::Transport(e.to_string()))?;

        if !status.is_success() {
            let detail = if body.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, body)
            };
            return Err(ActivationError::Rejected(detail));
        }

        if body.trim().is_empty() {
            return Ok(());
        }
        match serde_json::from_str::<ActivationReply>(&body) {
            Ok(reply) if !reply.success => Err(ActivationError::Rejected(
                reply.error.unwrap_or_else(|| "unspecified failure".to_string()),
            )),
            _ => Ok(()),
        }
    }
}
