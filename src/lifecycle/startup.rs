//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the commit engine from validated settings
//! - Start background tasks (settings reload, idle session sweep)
//! - Bind the listener and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, once the engine has restored its history

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use url::Url;

use crate::commit::{ActivationError, Activator, CommitEngine, HttpActivator, NoopActivator};
use crate::config::watcher::{ConfigWatcher, ReloadReceiver};
use crate::config::{ActivationConfig, ActivationMode, ServiceConfig};
use crate::error::EngineError;
use crate::history::HistoryStore;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::signals::{spawn_signal_handler, ReloadTarget};
use crate::lifecycle::Shutdown;
use crate::net::tls::load_tls_config;

/// How often idle sessions are looked for.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("history: {0}")]
    History(#[from] EngineError),

    #[error("activator: {0}")]
    Activator(#[from] ActivationError),

    #[error("invalid activation endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("listener {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server: {0}")]
    Serve(#[from] std::io::Error),
}

/// Open the history, build the activator and restore the active version.
pub fn build_engine(config: &ServiceConfig) -> Result<Arc<CommitEngine>, StartupError> {
    let history = match &config.history.persistence_path {
        Some(path) => HistoryStore::open(path)?,
        None => HistoryStore::in_memory(),
    }
    .with_max_page_size(config.history.max_page_size);

    let activator = build_activator(&config.activation)?;
    let engine = CommitEngine::new(Arc::new(history), activator).with_tuning(config.engine_tuning());

    tracing::info!(
        active_version = engine.active_version(),
        activator = engine.activator_name(),
        persistent = config.history.persistence_path.is_some(),
        "Commit engine ready"
    );
    Ok(Arc::new(engine))
}

pub fn build_activator(config: &ActivationConfig) -> Result<Arc<dyn Activator>, StartupError> {
    match (&config.mode, &config.endpoint) {
        (ActivationMode::Http, Some(endpoint)) => {
            let endpoint = Url::parse(endpoint)?;
            let activator = HttpActivator::new(
                endpoint,
                config.api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Arc::new(activator))
        }
        (ActivationMode::Http, None) => Err(StartupError::Activator(ActivationError::Rejected(
            "http activation needs an endpoint".to_string(),
        ))),
        (ActivationMode::Noop, _) => Ok(Arc::new(NoopActivator)),
    }
}

/// Run the service until a shutdown signal arrives.
///
/// `settings_path` enables hot reload from the file watcher and SIGHUP.
pub async fn run(config: ServiceConfig, settings_path: Option<PathBuf>) -> Result<(), StartupError> {
    let engine = build_engine(&config)?;
    let state = AppState::new(engine.clone(), config.clone());
    let shutdown = Shutdown::new();

    // The watcher handle must outlive the server for events to keep flowing.
    let _watcher = match &settings_path {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            let target = ReloadTarget {
                path: path.clone(),
                tx: watcher.sender(),
            };
            spawn_signal_handler(shutdown.clone(), Some(target));
            spawn_reload_loop(state.clone(), rx, shutdown.clone());
            match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "Settings watcher unavailable; SIGHUP reload still works");
                    None
                }
            }
        }
        None => {
            spawn_signal_handler(shutdown.clone(), None);
            None
        }
    };
    spawn_session_sweeper(state.clone(), shutdown.clone());

    let server = HttpServer::new(state);
    match &config.listener.tls {
        Some(tls) => {
            let address = config
                .listener
                .bind_address
                .parse::<std::net::SocketAddr>()
                .map_err(|e| StartupError::Bind {
                    address: config.listener.bind_address.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
                })?;
            let tls_config = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            server.run_tls(address, tls_config, shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address)
                .await
                .map_err(|source| StartupError::Bind {
                    address: config.listener.bind_address.clone(),
                    source,
                })?;
            server.run(listener, shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Apply reloaded settings until shutdown.
pub fn spawn_reload_loop(state: AppState, mut rx: ReloadReceiver, shutdown: Shutdown) {
    tokio::spawn(async move {
        let mut stop = shutdown.subscribe();
        loop {
            tokio::select! {
                _ = stop.recv() => break,
                update = rx.recv() => match update {
                    Some(settings) => apply_settings(&state, settings),
                    None => break,
                },
            }
        }
    });
}

/// Swap in new settings. Values read per request or per apply take effect
/// immediately; the rest keep their startup values.
pub fn apply_settings(state: &AppState, settings: ServiceConfig) {
    let current = state.settings.load();
    if current.listener != settings.listener
        || current.history.persistence_path != settings.history.persistence_path
        || current.activation.mode != settings.activation.mode
        || current.activation.endpoint != settings.activation.endpoint
    {
        tracing::warn!("Listener, history file and activator changes take effect after a restart");
    }

    state.engine.update_tuning(settings.engine_tuning());
    state.settings.store(Arc::new(settings));
    tracing::info!("Settings reloaded");
}

/// Drop sessions idle longer than `sessions.idle_timeout_secs`.
pub fn spawn_session_sweeper(state: AppState, shutdown: Shutdown) {
    tokio::spawn(async move {
        let mut stop = shutdown.subscribe();
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = stop.recv() => break,
                _ = ticker.tick() => {
                    let idle = state.settings.load().sessions.idle_timeout_secs;
                    if idle > 0 {
                        state.engine.sessions().expire_idle(Duration::from_secs(idle));
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_engine_defaults() {
        let engine = build_engine(&ServiceConfig::default()).unwrap();
        assert_eq!(engine.active_version(), 0);
        assert_eq!(engine.activator_name(), "noop");
    }

    #[test]
    fn test_http_activator_needs_endpoint() {
        let config = ActivationConfig {
            mode: ActivationMode::Http,
            ..ActivationConfig::default()
        };
        assert!(build_activator(&config).is_err());
    }

    #[tokio::test]
    async fn test_apply_settings_updates_tuning() {
        let config = ServiceConfig::default();
        let state = AppState::new(build_engine(&config).unwrap(), config.clone());

        let mut next = config;
        next.activation.timeout_secs = 3;
        next.admin.api_key = "rotated".into();
        apply_settings(&state, next);

        assert_eq!(state.engine.tuning().activation_timeout, Duration::from_secs(3));
        assert_eq!(state.settings.load().admin.api_key, "rotated");
    }
}
