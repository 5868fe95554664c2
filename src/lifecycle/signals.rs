//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reloads settings, never shuts down

use std::path::PathBuf;

use crate::config::watcher::{reload_into, ReloadSender};
use crate::lifecycle::Shutdown;

/// Where SIGHUP reloads come from and go to.
pub struct ReloadTarget {
    pub path: PathBuf,
    pub tx: ReloadSender,
}

/// Spawn the signal loop. Ctrl+C or SIGTERM triggers `shutdown`; SIGHUP
/// re-reads the settings file when `reload` is set.
pub fn spawn_signal_handler(shutdown: Shutdown, reload: Option<ReloadTarget>) {
    tokio::spawn(async move {
        wait_for_signals(shutdown, reload).await;
    });
}

#[cfg(unix)]
async fn wait_for_signals(shutdown: Shutdown, reload: Option<ReloadTarget>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut hup) = match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
        (Ok(term), Ok(hup)) => (term, hup),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Failed to install signal handlers; only Ctrl+C is handled");
            let _ = tokio::signal::ctrl_c().await;
            shutdown.trigger();
            return;
        }
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("SIGINT received, shutting down");
                break;
            }
            _ = term.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                break;
            }
            _ = hup.recv() => match &reload {
                Some(target) => {
                    tracing::info!(path = %target.path.display(), "SIGHUP received, reloading settings");
                    reload_into(&target.path, &target.tx);
                }
                None => tracing::warn!("SIGHUP received but no settings file is in use"),
            },
        }
    }
    shutdown.trigger();
}

#[cfg(not(unix))]
async fn wait_for_signals(shutdown: Shutdown, _reload: Option<ReloadTarget>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Ctrl+C received, shutting down");
    }
    shutdown.trigger();
}
