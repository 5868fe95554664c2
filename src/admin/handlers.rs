use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::changeset::{SessionId, SessionSummary};
use crate::commit::ApplyState;
use crate::http::server::AppState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub active_version: u64,
    pub state: ApplyState,
    pub activator: String,
    pub history_len: usize,
    pub open_sessions: usize,
    pub activation_timeout_ms: u128,
    pub queue_timeout_ms: u128,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let engine = &state.engine;
    let tuning = engine.tuning();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        active_version: engine.active_version(),
        state: engine.state(),
        activator: engine.activator_name().to_string(),
        history_len: engine.history().len(),
        open_sessions: engine.sessions().count(),
        activation_timeout_ms: tuning.activation_timeout.as_millis(),
        queue_timeout_ms: tuning.queue_timeout.as_millis(),
    })
}

pub async fn get_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.engine.sessions().summaries())
}

/// Drop another operator's session.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let dropped = state.engine.discard(&SessionId::new(id.clone()));
    Json(json!({ "session": id, "discarded": dropped }))
}
