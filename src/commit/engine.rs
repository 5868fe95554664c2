//! The commit engine: active pointer, sessions and the apply state machine.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::{error, info, warn};

use super::activation::Activator;
use super::ApplyState;
use crate::changeset::{ChangeSet, PendingChange, RejectedChange, SessionId, SessionManager};
use crate::error::{EngineError, EngineResult};
use crate::history::{
    ChangeType, ConfigDiff, ConfigVersion, HistoryFilter, HistoryPage, HistoryStore,
};
use crate::observability::metrics;
use crate::resilience::with_deadline;
use crate::tree::{ConfigPath, ConfigTree};
use crate::validator::{ConfigValidationError, ValidationReport, Validator};

/// The authoritative running configuration.
#[derive(Debug, Clone)]
pub struct ActiveConfig {
    pub version: u64,
    pub tree: Arc<ConfigTree>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ActiveConfig {
    fn initial() -> Self {
        Self {
            version: 0,
            tree: Arc::new(ConfigTree::new()),
            timestamp: None,
        }
    }

    fn from_version(version: &ConfigVersion) -> Self {
        Self {
            version: version.version,
            tree: version.tree.clone(),
            timestamp: Some(version.timestamp),
        }
    }
}

/// Runtime-tunable engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTuning {
    /// Deadline on one activation call.
    pub activation_timeout: Duration,
    /// How long an apply waits for the lock; zero rejects at once.
    pub queue_timeout: Duration,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            activation_timeout: Duration::from_secs(30),
            queue_timeout: Duration::from_secs(2),
        }
    }
}

/// One pass through the apply pipeline.
#[derive(Debug, Clone, Default)]
pub struct ApplyRequest {
    pub tree: ConfigTree,
    /// Version the candidate was derived from; `None` applies over whatever
    /// is active.
    pub base_version: Option<u64>,
    pub comment: Option<String>,
    pub author: Option<String>,
    pub change_type: ChangeType,
    pub dry_run: bool,
    /// Session to clear on commit, with the revision that was snapshotted.
    pub session: Option<(SessionId, u64)>,
}

impl ApplyRequest {
    pub fn new(tree: ConfigTree) -> Self {
        Self {
            tree,
            ..Self::default()
        }
    }

    pub fn comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment;
        self
    }

    pub fn author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = change_type;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn based_on(mut self, version: u64) -> Self {
        self.base_version = Some(version);
        self
    }

    fn from_session(changes: &ChangeSet, session: &SessionId) -> Self {
        Self {
            tree: changes.candidate().clone(),
            base_version: Some(changes.base_version()),
            author: Some(session.to_string()),
            session: Some((session.clone(), changes.revision())),
            ..Self::default()
        }
    }
}

/// Why an apply did not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyFailure {
    Validation,
    Conflict,
    Activation,
    Persistence,
}

/// Outcome of an apply, rollback, commit or import.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigApplyResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ConfigValidationError>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ConfigValidationError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ApplyFailure>,
}

impl ConfigApplyResult {
    fn validated(warnings: Vec<ConfigValidationError>) -> Self {
        Self {
            success: true,
            version: None,
            timestamp: None,
            message: Some("Validation passed, nothing activated".to_string()),
            errors: Vec::new(),
            warnings,
            failure: None,
        }
    }

    fn unchanged() -> Self {
        Self {
            success: true,
            version: None,
            timestamp: None,
            message: Some("No changes to commit".to_string()),
            errors: Vec::new(),
            warnings: Vec::new(),
            failure: None,
        }
    }

    fn committed(version: &ConfigVersion, warnings: Vec<ConfigValidationError>) -> Self {
        Self {
            success: true,
            version: Some(version.version),
            timestamp: Some(version.timestamp),
            message: Some(format!("Committed version {}", version.version)),
            errors: Vec::new(),
            warnings,
            failure: None,
        }
    }

    fn failed(
        failure: ApplyFailure,
        message: String,
        errors: Vec<ConfigValidationError>,
        warnings: Vec<ConfigValidationError>,
    ) -> Self {
        Self {
            success: false,
            version: None,
            timestamp: None,
            message: Some(message),
            errors,
            warnings,
            failure: Some(failure),
        }
    }

    fn rejected(report: ValidationReport) -> Self {
        let message = format!("Validation failed with {} error(s)", report.errors.len());
        Self::failed(ApplyFailure::Validation, message, report.errors, report.warnings)
    }

    fn activation_failed(reason: String, warnings: Vec<ConfigValidationError>) -> Self {
        let mut finding = ConfigValidationError::error(ConfigPath::root(), reason.clone());
        finding.rule = "activation".to_string();
        Self::failed(
            ApplyFailure::Activation,
            format!("Activation failed: {}", reason),
            vec![finding],
            warnings,
        )
    }

    /// The equivalent engine error, for transports that map errors to codes.
    pub fn error(&self) -> Option<EngineError> {
        let message = self.message.clone().unwrap_or_default();
        Some(match self.failure? {
            ApplyFailure::Validation => EngineError::ValidationFailed(self.errors.clone()),
            ApplyFailure::Conflict => EngineError::Conflict(message),
            ApplyFailure::Activation => EngineError::ActivationFailed(message),
            ApplyFailure::Persistence => EngineError::Persistence(message),
        })
    }

    fn outcome(&self) -> &'static str {
        match self.failure {
            None if self.version.is_some() => "committed",
            None => "dry_run",
            Some(ApplyFailure::Validation) => "rejected",
            Some(ApplyFailure::Conflict) => "conflict",
            Some(ApplyFailure::Activation) => "rolled_back",
            Some(ApplyFailure::Persistence) => "persistence_error",
        }
    }
}

/// What a session currently sees.
#[derive(Debug, Clone)]
pub struct ConfigView {
    pub tree: Arc<ConfigTree>,
    pub version: u64,
    pub base_version: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub pending_changes: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub version: u64,
    pub pending_changes: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub applied: Vec<ConfigPath>,
    pub failed: Vec<RejectedChange>,
    pub pending_changes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    #[default]
    Replace,
    Merge,
}

/// Owns the active pointer and serializes activations.
pub struct CommitEngine {
    active: ArcSwap<ActiveConfig>,
    history: Arc<HistoryStore>,
    activator: Arc<dyn Activator>,
    validator: Validator,
    sessions: SessionManager,
    apply_lock: Arc<Mutex<()>>,
    state: watch::Sender<ApplyState>,
    tuning: ArcSwap<EngineTuning>,
}

impl CommitEngine {
    /// Build an engine over `history`. The latest recorded version becomes
    /// active; it is assumed to be what the running system already has.
    pub fn new(history: Arc<HistoryStore>, activator: Arc<dyn Activator>) -> Self {
        let active = history
            .latest()
            .map(|v| ActiveConfig::from_version(&v))
            .unwrap_or_else(ActiveConfig::initial);
        metrics::record_active_version(active.version);
        let (state, _) = watch::channel(ApplyState::Idle);
        Self {
            active: ArcSwap::from_pointee(active),
            history,
            activator,
            validator: Validator::standard(),
            sessions: SessionManager::new(),
            apply_lock: Arc::new(Mutex::new(())),
            state,
            tuning: ArcSwap::from_pointee(EngineTuning::default()),
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_tuning(self, tuning: EngineTuning) -> Self {
        self.tuning.store(Arc::new(tuning));
        self
    }

    pub fn active(&self) -> Arc<ActiveConfig> {
        self.active.load_full()
    }

    pub fn active_version(&self) -> u64 {
        self.active.load().version
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn activator_name(&self) -> &str {
        self.activator.name()
    }

    pub fn state(&self) -> ApplyState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ApplyState> {
        self.state.subscribe()
    }

    pub fn tuning(&self) -> EngineTuning {
        **self.tuning.load()
    }

    pub fn update_tuning(&self, tuning: EngineTuning) {
        info!(
            activation_timeout_ms = tuning.activation_timeout.as_millis() as u64,
            queue_timeout_ms = tuning.queue_timeout.as_millis() as u64,
            "Engine tuning updated"
        );
        self.tuning.store(Arc::new(tuning));
    }

    // --- Staging ---

    /// The tree a session sees: its candidate when open, else the active tree.
    pub fn view(&self, session: &SessionId) -> ConfigView {
        let active = self.active();
        self.sessions
            .inspect(session, |changes| ConfigView {
                tree: Arc::new(changes.candidate().clone()),
                version: active.version,
                base_version: changes.base_version(),
                timestamp: active.timestamp,
                pending_changes: changes.pending_count(),
            })
            .unwrap_or_else(|| ConfigView {
                tree: active.tree.clone(),
                version: active.version,
                base_version: active.version,
                timestamp: active.timestamp,
                pending_changes: 0,
            })
    }

    /// Stage one change in `session`, opening it over the active tree.
    pub fn stage(&self, session: &SessionId, change: PendingChange) -> EngineResult<StageOutcome> {
        let path = change.path.clone();
        let kind = change.kind;
        let pending_changes = self.sessions.with_session(
            session,
            || self.session_base(),
            |changes| {
                changes.apply_change(change)?;
                Ok::<_, EngineError>(changes.pending_count())
            },
        )?;
        info!(session = %session, path = %path, ?kind, pending_changes, "Change staged");
        Ok(StageOutcome {
            version: self.active_version(),
            pending_changes,
        })
    }

    /// Stage changes in order. Failures are reported per change and never
    /// undo earlier successes.
    pub fn stage_bulk(
        &self,
        session: &SessionId,
        changes: Vec<PendingChange>,
        stop_on_error: bool,
    ) -> BulkOutcome {
        let paths: Vec<ConfigPath> = changes.iter().map(|c| c.path.clone()).collect();
        let (failed, pending_changes) = self.sessions.with_session(
            session,
            || self.session_base(),
            |set| {
                let failed = set.apply_all(changes, stop_on_error);
                (failed, set.pending_count())
            },
        );

        let attempted = match (stop_on_error, failed.last()) {
            (true, Some(last)) => last.index,
            _ => paths.len(),
        };
        let applied = paths
            .into_iter()
            .enumerate()
            .take(attempted)
            .filter(|(index, _)| failed.iter().all(|f| f.index != *index))
            .map(|(_, path)| path)
            .collect::<Vec<_>>();
        info!(
            session = %session,
            applied = applied.len(),
            failed = failed.len(),
            "Bulk changes staged"
        );
        BulkOutcome {
            applied,
            failed,
            pending_changes,
        }
    }

    /// Drop a session's candidate. Returns the number of discarded changes.
    pub fn discard(&self, session: &SessionId) -> usize {
        let dropped = self.sessions.discard(session);
        info!(session = %session, dropped, "Session discarded");
        dropped
    }

    pub fn pending_count(&self, session: &SessionId) -> usize {
        self.sessions.pending_count(session)
    }

    fn session_base(&self) -> (u64, Arc<ConfigTree>) {
        let active = self.active.load();
        (active.version, active.tree.clone())
    }

    // --- Validation ---

    pub fn validate_tree(&self, tree: &ConfigTree) -> ValidationReport {
        self.validator.report(tree)
    }

    /// Validate what the session sees.
    pub fn validate_session(&self, session: &SessionId) -> ValidationReport {
        let view = self.view(session);
        self.validator.report(&view.tree)
    }

    // --- Apply ---

    /// Run `request` through the pipeline.
    pub async fn apply(self: &Arc<Self>, request: ApplyRequest) -> ConfigApplyResult {
        let started = Instant::now();
        tracing::debug!(state = ?ApplyState::Validating, dry_run = request.dry_run, "Validating candidate");

        let report = self.validator.report(&request.tree);
        if !report.is_valid() {
            info!(
                state = ?ApplyState::Rejected,
                errors = report.errors.len(),
                "Candidate rejected"
            );
            let result = ConfigApplyResult::rejected(report);
            metrics::record_apply(result.outcome(), started);
            return result;
        }
        if request.dry_run {
            let result = ConfigApplyResult::validated(report.warnings);
            metrics::record_apply(result.outcome(), started);
            return result;
        }

        let Some(guard) = self.acquire().await else {
            warn!("Apply rejected: another activation is in progress");
            let result = ConfigApplyResult::failed(
                ApplyFailure::Conflict,
                "Another apply is in progress".to_string(),
                Vec::new(),
                report.warnings,
            );
            metrics::record_apply(result.outcome(), started);
            return result;
        };

        let engine = Arc::clone(self);
        let warnings = report.warnings;
        let task = tokio::spawn(async move {
            let result = engine.activate_and_commit(guard, request, warnings).await;
            metrics::record_apply(result.outcome(), started);
            result
        });
        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Apply task ended abnormally");
                self.transition(ApplyState::Idle);
                ConfigApplyResult::failed(
                    ApplyFailure::Persistence,
                    format!("apply task failed: {}", e),
                    Vec::new(),
                    Vec::new(),
                )
            }
        }
    }

    async fn acquire(&self) -> Option<OwnedMutexGuard<()>> {
        let wait = self.tuning().queue_timeout;
        if wait.is_zero() {
            return self.apply_lock.clone().try_lock_owned().ok();
        }
        tokio::time::timeout(wait, self.apply_lock.clone().lock_owned())
            .await
            .ok()
    }

    /// The serialized section. Runs in its own task while holding the lock.
    async fn activate_and_commit(
        self: Arc<Self>,
        _guard: OwnedMutexGuard<()>,
        request: ApplyRequest,
        warnings: Vec<ConfigValidationError>,
    ) -> ConfigApplyResult {
        let current = self.active();
        if let Some(base) = request.base_version {
            if base != current.version {
                warn!(
                    base_version = base,
                    active_version = current.version,
                    "Apply rejected: stale lineage"
                );
                return ConfigApplyResult::failed(
                    ApplyFailure::Conflict,
                    format!(
                        "Candidate is based on version {} but version {} is active",
                        base, current.version
                    ),
                    Vec::new(),
                    warnings,
                );
            }
        }

        self.transition(ApplyState::Activating);
        let candidate = Arc::new(request.tree);
        let tuning = self.tuning();
        let failure = match with_deadline(
            "activation",
            tuning.activation_timeout,
            self.activator.activate(&candidate),
        )
        .await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(elapsed) => Some(elapsed.to_string()),
        };

        if let Some(reason) = failure {
            error!(
                state = ?ApplyState::RolledBack,
                activator = self.activator.name(),
                active_version = current.version,
                error = %reason,
                "Activation failed, previous configuration remains active"
            );
            self.transition(ApplyState::RolledBack);
            self.transition(ApplyState::Idle);
            return ConfigApplyResult::activation_failed(reason, warnings);
        }

        let next = current.version + 1;
        let recorded = ConfigVersion::new(
            next,
            candidate,
            request.comment,
            request.author,
            request.change_type,
        )
        .and_then(|version| self.history.append(version));
        let version = match recorded {
            Ok(version) => version,
            Err(e) => {
                error!(
                    version = next,
                    error = %e,
                    "Activated candidate could not be recorded, restoring previous configuration"
                );
                self.restore(&current, tuning.activation_timeout).await;
                self.transition(ApplyState::RolledBack);
                self.transition(ApplyState::Idle);
                return ConfigApplyResult::failed(
                    ApplyFailure::Persistence,
                    e.to_string(),
                    Vec::new(),
                    warnings,
                );
            }
        };

        self.active.store(Arc::new(ActiveConfig::from_version(&version)));
        if let Some((session, revision)) = &request.session {
            if !self.sessions.clear_committed(session, *revision) {
                warn!(session = %session, "Session changed during commit and was kept");
            }
        }
        metrics::record_active_version(version.version);
        info!(
            state = ?ApplyState::Committed,
            version = version.version,
            change_type = ?version.change_type,
            hash = %version.hash,
            "Configuration committed"
        );
        self.transition(ApplyState::Committed);
        self.transition(ApplyState::Idle);
        ConfigApplyResult::committed(&version, warnings)
    }

    /// Re-activate `previous` after a commit could not be recorded.
    async fn restore(&self, previous: &ActiveConfig, deadline: Duration) {
        match with_deadline("restore", deadline, self.activator.activate(&previous.tree)).await {
            Ok(Ok(())) => info!(
                active_version = previous.version,
                "Previous configuration restored"
            ),
            Ok(Err(e)) => error!(
                active_version = previous.version,
                error = %e,
                "Restore failed; running system is ahead of history"
            ),
            Err(elapsed) => error!(
                active_version = previous.version,
                error = %elapsed,
                "Restore failed; running system is ahead of history"
            ),
        }
    }

    fn transition(&self, state: ApplyState) {
        self.state.send_replace(state);
    }

    /// Apply the session candidate, or preview it when `dry_run`.
    ///
    /// With nothing staged, a commit succeeds without recording a version.
    pub async fn commit_session(
        self: &Arc<Self>,
        session: &SessionId,
        comment: Option<String>,
        dry_run: bool,
    ) -> ConfigApplyResult {
        let staged = self.sessions.inspect(session, |changes| {
            (changes.pending_count() > 0 || dry_run)
                .then(|| ApplyRequest::from_session(changes, session))
        });
        let request = match staged {
            Some(Some(request)) => request,
            Some(None) => {
                self.sessions.discard(session);
                return ConfigApplyResult::unchanged();
            }
            None if !dry_run => return ConfigApplyResult::unchanged(),
            None => {
                let active = self.active();
                ApplyRequest::new(active.tree.as_ref().clone())
                    .based_on(active.version)
                    .author(Some(session.to_string()))
            }
        };
        self.apply(request.comment(comment).dry_run(dry_run)).await
    }

    /// Apply an explicit full tree with no lineage.
    pub async fn apply_tree(
        self: &Arc<Self>,
        tree: ConfigTree,
        comment: Option<String>,
        author: Option<String>,
    ) -> ConfigApplyResult {
        self.apply(ApplyRequest::new(tree).comment(comment).author(author))
            .await
    }

    /// Re-apply a recorded snapshot as a new version. With `node`, only that
    /// subtree is taken from the target and the rest of the active tree stays.
    pub async fn rollback(
        self: &Arc<Self>,
        target: u64,
        node: Option<ConfigPath>,
        comment: Option<String>,
        author: Option<String>,
    ) -> EngineResult<ConfigApplyResult> {
        let snapshot = self.history.tree_at(target)?;
        let active = self.active();
        let tree = match &node {
            None => snapshot.as_ref().clone(),
            Some(path) => {
                let mut tree = active.tree.as_ref().clone();
                tree.graft(path, snapshot.get(path).cloned())?;
                tree
            }
        };
        let comment = comment.or_else(|| Some(format!("Rollback to version {}", target)));
        info!(target_version = target, node = ?node.as_ref().map(ToString::to_string), "Rolling back");
        Ok(self
            .apply(
                ApplyRequest::new(tree)
                    .based_on(active.version)
                    .comment(comment)
                    .author(author)
                    .change_type(ChangeType::Rollback),
            )
            .await)
    }

    /// Apply an imported tree, replacing or merging into the active tree.
    pub async fn import(
        self: &Arc<Self>,
        imported: ConfigTree,
        mode: ImportMode,
        dry_run: bool,
        comment: Option<String>,
        author: Option<String>,
    ) -> EngineResult<ConfigApplyResult> {
        let active = self.active();
        let tree = match mode {
            ImportMode::Replace => imported,
            ImportMode::Merge => {
                let mut merged = active.tree.as_ref().clone();
                merged.merge(&imported)?;
                merged
            }
        };
        Ok(self
            .apply(
                ApplyRequest::new(tree)
                    .based_on(active.version)
                    .comment(comment)
                    .author(author)
                    .change_type(ChangeType::Import)
                    .dry_run(dry_run),
            )
            .await)
    }

    /// Write the active tree as JSON to `path`.
    pub async fn save_active(&self, path: &Path) -> EngineResult<()> {
        let active = self.active();
        let bytes = serde_json::to_vec_pretty(active.tree.as_ref())?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| EngineError::Persistence(format!("{}: {}", path.display(), e)))?;
        info!(path = %path.display(), version = active.version, "Saved active configuration");
        Ok(())
    }

    // --- History ---

    pub fn history_list(&self, filter: &HistoryFilter) -> HistoryPage {
        self.history.list(filter)
    }

    pub fn history_get(&self, version: u64) -> EngineResult<Arc<ConfigVersion>> {
        self.history
            .get(version)
            .ok_or_else(|| EngineError::NotFound(format!("version {}", version)))
    }

    pub fn diff(&self, from: u64, to: Option<u64>) -> EngineResult<ConfigDiff> {
        self.history.diff(from, to)
    }
}
