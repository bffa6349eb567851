//! Boot file watcher for load-over-running reloads.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// A request to load this file over the running configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub path: PathBuf,
}

/// Watches the boot file and asks for a reload whenever it changes.
///
/// The file is not parsed here; parsing needs the live schema and happens
/// in the manager, which keeps the running tree on any failure.
pub struct ConfigFileWatcher {
    path: PathBuf,
    poll_interval: Duration,
    reload_tx: mpsc::UnboundedSender<ReloadRequest>,
}

impl ConfigFileWatcher {
    /// Returns the watcher and a receiver for reload requests.
    pub fn new(path: &Path, poll_interval: Duration) -> (Self, mpsc::UnboundedReceiver<ReloadRequest>) {
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                poll_interval,
                reload_tx,
            },
            reload_rx,
        )
    }

    /// Start watching. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.reload_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Boot file change detected, requesting reload");
                        let _ = tx.send(ReloadRequest { path: path.clone() });
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(self.poll_interval),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Boot file watcher started");
        Ok(watcher)
    }
}
