//! Settings file watcher for hot reload.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ServiceConfig;

/// Delivers freshly loaded, validated settings.
pub type ReloadSender = mpsc::UnboundedSender<ServiceConfig>;
pub type ReloadReceiver = mpsc::UnboundedReceiver<ServiceConfig>;

/// A watcher that monitors the settings file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: ReloadSender,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for settings updates.
    pub fn new(path: &Path) -> (Self, ReloadReceiver) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Another producer for the same channel (SIGHUP reloads use it).
    pub fn sender(&self) -> ReloadSender {
        self.update_tx.clone()
    }

    /// Start watching the file in a background thread. The returned watcher
    /// must be kept alive for events to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Settings file change detected, reloading...");
                        reload_into(&path, &tx);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Settings watcher started");
        Ok(watcher)
    }
}

/// Load `path` and forward it; invalid settings are logged and dropped.
pub fn reload_into(path: &Path, tx: &ReloadSender) -> bool {
    match load_config(path) {
        Ok(new_config) => tx.send(new_config).is_ok(),
        Err(e) => {
            tracing::error!(
                "Failed to reload settings: {}. Keeping current settings.",
                e
            );
            false
        }
    }
}
