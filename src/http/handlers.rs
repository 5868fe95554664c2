//! Handlers for the `/config` API.
//!
//! Every handler resolves its session from `x-session-id`, calls into the
//! commit engine and maps the outcome. No handler holds engine state across
//! an await except through the engine itself.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path as FsPath;

use crate::changeset::{PendingChange, SessionId};
use crate::commit::{BulkOutcome, ConfigApplyResult, ImportMode, StageOutcome};
use crate::error::EngineError;
use crate::export::{self, document, ExportFormat};
use crate::history::format::render_text;
use crate::history::{ConfigDiff, ConfigHistoryEntry, HistoryFilter, HistoryPage};
use crate::http::request::{ApiJson, JsonOrDefault};
use crate::http::response::{ApiError, ApiResult, Outcome};
use crate::http::server::AppState;
use crate::tree::{ConfigPath, ConfigSection, SearchOptions, TreeStats};
use crate::validator::ConfigValidationError;

// --- Reading ---

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigQuery {
    pub node: Option<ConfigPath>,
    pub depth: Option<usize>,
    pub section: Option<String>,
    pub include_description: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    pub config: Value,
    pub path: ConfigPath,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub descriptions: BTreeMap<String, String>,
    pub sections: Vec<ConfigSection>,
    pub version: u64,
    pub base_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub pending_changes: usize,
}

pub async fn get_config(
    State(state): State<AppState>,
    session: SessionId,
    Query(query): Query<ConfigQuery>,
) -> ApiResult<Json<ConfigResponse>> {
    let view = state.engine.view(&session);
    let path = match (query.node, query.section) {
        (Some(path), _) => path,
        (None, Some(section)) => {
            if ConfigSection::find(&view.tree, &section).is_none() {
                return Err(EngineError::NotFound(format!("section '{}'", section)).into());
            }
            ConfigPath::root().child(section)
        }
        (None, None) => ConfigPath::root(),
    };
    let node = view
        .tree
        .get(&path)
        .ok_or_else(|| EngineError::NotFound(format!("path '{}'", path)))?;

    let descriptions = if query.include_description.unwrap_or(true) {
        document::descriptions(node, &path)
    } else {
        BTreeMap::new()
    };

    let config = match document::node_to_json(node, query.depth) {
        Value::Null if path.is_root() => json!({}),
        config => config,
    };

    Ok(Json(ConfigResponse {
        config,
        descriptions,
        sections: ConfigSection::derive(&view.tree),
        path,
        version: view.version,
        base_version: view.base_version,
        timestamp: view.timestamp,
        pending_changes: view.pending_changes,
    }))
}

pub async fn get_stats(State(state): State<AppState>, session: SessionId) -> Json<Value> {
    let view = state.engine.view(&session);
    let stats: TreeStats = view.tree.stats();
    Json(json!({
        "stats": stats,
        "version": view.version,
        "pendingChanges": view.pending_changes,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchBody {
    pub query: String,
    pub case_sensitive: bool,
    pub include_values: bool,
    pub path_filter: Option<ConfigPath>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub path: ConfigPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub is_leaf: bool,
}

pub async fn search(
    State(state): State<AppState>,
    session: SessionId,
    ApiJson(body): ApiJson<SearchBody>,
) -> ApiResult<Json<Value>> {
    if body.query.is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    let options = SearchOptions {
        case_sensitive: body.case_sensitive,
        include_values: body.include_values,
        scope: body.path_filter,
    };
    let view = state.engine.view(&session);
    let results: Vec<SearchHit> = view
        .tree
        .search(&body.query, &options)
        .into_iter()
        .map(|found| SearchHit {
            is_leaf: found.node.is_leaf(),
            value: found.node.value,
            path: found.path,
        })
        .collect();
    Ok(Json(json!({ "total": results.len(), "results": results })))
}

// --- Staging ---

#[derive(Debug, Deserialize)]
pub struct SetBody {
    pub path: ConfigPath,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
    pub path: ConfigPath,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Staged {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

/// Numbers and booleans are stored as their text.
fn scalar_value(value: Option<Value>) -> Result<Option<String>, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(_) => Err(ApiError::bad_request("value must be a scalar")),
    }
}

pub async fn set_value(
    State(state): State<AppState>,
    session: SessionId,
    ApiJson(body): ApiJson<SetBody>,
) -> ApiResult<Json<Staged>> {
    let value = scalar_value(body.value)?;
    let change = PendingChange::set(body.path, value).with_comment(body.comment);
    let outcome = state.engine.stage(&session, change)?;
    Ok(Json(Staged {
        success: true,
        outcome,
    }))
}

pub async fn delete_value(
    State(state): State<AppState>,
    session: SessionId,
    ApiJson(body): ApiJson<DeleteBody>,
) -> ApiResult<Json<Staged>> {
    let change = PendingChange::delete(body.path).with_comment(body.comment);
    let outcome = state.engine.stage(&session, change)?;
    Ok(Json(Staged {
        success: true,
        outcome,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BulkBody {
    pub changes: Vec<PendingChange>,
    pub stop_on_error: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: BulkOutcome,
}

pub async fn bulk(
    State(state): State<AppState>,
    session: SessionId,
    ApiJson(body): ApiJson<BulkBody>,
) -> Json<BulkResponse> {
    let outcome = state
        .engine
        .stage_bulk(&session, body.changes, body.stop_on_error);
    Json(BulkResponse {
        success: outcome.failed.is_empty(),
        outcome,
    })
}

pub async fn discard(State(state): State<AppState>, session: SessionId) -> Json<Value> {
    let dropped = state.engine.discard(&session);
    Json(json!({
        "success": true,
        "message": format!("Discarded {} pending change(s)", dropped),
    }))
}

// --- Validation and apply ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidateBody {
    /// A document to check instead of the session candidate.
    pub config: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

pub async fn validate(
    State(state): State<AppState>,
    session: SessionId,
    JsonOrDefault(body): JsonOrDefault<ValidateBody>,
) -> ApiResult<Json<ValidateResponse>> {
    let report = match body.config {
        Some(config) => state.engine.validate_tree(&document::from_json_value(&config)?),
        None => state.engine.validate_session(&session),
    };
    Ok(Json(ValidateResponse {
        valid: report.is_valid(),
        errors: report.errors,
        warnings: report.warnings,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerateBody {
    pub comment: Option<String>,
    pub dry_run: Option<bool>,
    pub format: Option<ExportFormat>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub config: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ConfigValidationError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ConfigValidationError>,
}

/// Serialize the session candidate and run it through the pipeline,
/// as a preview unless `dryRun` is false.
pub async fn generate(
    State(state): State<AppState>,
    session: SessionId,
    JsonOrDefault(body): JsonOrDefault<GenerateBody>,
) -> ApiResult<Outcome<GenerateResponse>> {
    let view = state.engine.view(&session);
    let config = export::export(&view.tree, body.format.unwrap_or_default())?;
    let result = state
        .engine
        .commit_session(&session, body.comment, body.dry_run.unwrap_or(true))
        .await;
    Ok(Outcome::new(
        result.failure,
        GenerateResponse {
            success: result.success,
            config,
            version: result.version.unwrap_or(view.version),
            message: result.message,
            errors: result.errors,
            warnings: result.warnings,
        },
    ))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ApplyBody {
    pub config: Value,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default = "default_true")]
    pub validate: bool,
}

pub async fn apply(
    State(state): State<AppState>,
    session: SessionId,
    ApiJson(body): ApiJson<ApplyBody>,
) -> ApiResult<Outcome<ConfigApplyResult>> {
    if !body.validate {
        tracing::warn!(session = %session, "validate=false ignored, candidates are always validated");
    }
    let tree = document::from_json_value(&body.config)?;
    let result = state
        .engine
        .apply_tree(tree, body.comment, Some(session.to_string()))
        .await;
    Ok(result.into())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommitBody {
    pub comment: Option<String>,
    pub save_file: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    #[serde(flatten)]
    pub result: ConfigApplyResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
}

pub async fn commit(
    State(state): State<AppState>,
    session: SessionId,
    JsonOrDefault(body): JsonOrDefault<CommitBody>,
) -> Outcome<CommitResponse> {
    let result = state.engine.commit_session(&session, body.comment, false).await;

    let (saved, save_error) = if body.save_file && result.success {
        match save_startup(&state).await {
            Ok(()) => (Some(true), None),
            Err(e) => {
                tracing::warn!(error = %e, "Committed but the startup file was not written");
                (Some(false), Some(e))
            }
        }
    } else {
        (None, None)
    };

    Outcome::new(
        result.failure,
        CommitResponse {
            result,
            saved,
            save_error,
        },
    )
}

async fn save_startup(state: &AppState) -> Result<(), String> {
    let Some(path) = state.settings.load().history.startup_path.clone() else {
        return Err("no history.startup_path is configured".to_string());
    };
    state
        .engine
        .save_active(FsPath::new(&path))
        .await
        .map_err(|e| e.to_string())
}

// --- History ---

pub async fn history(
    State(state): State<AppState>,
    Query(filter): Query<HistoryFilter>,
) -> Json<HistoryPage> {
    Json(state.engine.history_list(&filter))
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    #[serde(flatten)]
    pub entry: ConfigHistoryEntry,
    pub config: Value,
}

pub async fn history_entry(
    State(state): State<AppState>,
    Path(version): Path<u64>,
) -> ApiResult<Json<VersionResponse>> {
    let version = state.engine.history_get(version)?;
    Ok(Json(VersionResponse {
        entry: version.entry(),
        config: document::to_json_value(&version.tree),
    }))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffBody {
    pub version_from: u64,
    #[serde(default)]
    pub version_to: Option<u64>,
    #[serde(default)]
    pub format: DiffFormat,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResponse {
    pub diff: ConfigDiff,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_diff: Option<String>,
}

pub async fn diff(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<DiffBody>,
) -> ApiResult<Json<DiffResponse>> {
    let diff = state.engine.diff(body.version_from, body.version_to)?;
    let formatted_diff = (body.format == DiffFormat::Text).then(|| render_text(&diff));
    Ok(Json(DiffResponse {
        diff,
        formatted_diff,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RollbackBody {
    pub version: u64,
    #[serde(default)]
    pub node: Option<ConfigPath>,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn rollback(
    State(state): State<AppState>,
    session: SessionId,
    ApiJson(body): ApiJson<RollbackBody>,
) -> ApiResult<Outcome<ConfigApplyResult>> {
    let result = state
        .engine
        .rollback(body.version, body.node, body.comment, Some(session.to_string()))
        .await?;
    Ok(result.into())
}

// --- Export and import ---

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportQuery {
    pub format: Option<String>,
    pub node: Option<ConfigPath>,
}

fn parse_format(format: Option<&str>) -> Result<ExportFormat, EngineError> {
    format.map(str::parse::<ExportFormat>).transpose().map(Option::unwrap_or_default)
}

pub async fn export_config(
    State(state): State<AppState>,
    session: SessionId,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let format = parse_format(query.format.as_deref())?;
    let view = state.engine.view(&session);
    let text = match &query.node {
        Some(node) => export::export_subtree(&view.tree, node, format)?,
        None => export::export(&view.tree, format)?,
    };
    Ok(([(header::CONTENT_TYPE, format.content_type())], text).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportQuery {
    pub format: Option<String>,
    pub dry_run: bool,
    pub merge: bool,
    pub comment: Option<String>,
}

/// The body is the document itself, in `format`.
pub async fn import_config(
    State(state): State<AppState>,
    session: SessionId,
    Query(query): Query<ImportQuery>,
    body: String,
) -> ApiResult<Outcome<ConfigApplyResult>> {
    let format = parse_format(query.format.as_deref())?;
    let tree = export::import(&body, format)?;
    let mode = if query.merge {
        ImportMode::Merge
    } else {
        ImportMode::Replace
    };
    let result = state
        .engine
        .import(tree, mode, query.dry_run, query.comment, Some(session.to_string()))
        .await?;
    Ok(result.into())
}
