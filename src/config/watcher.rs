//! Hot reload of the service configuration file.
//!
//! # Design Decisions
//! - The parent directory is watched, not the file, so editors that save by
//!   rename keep triggering reloads
//! - Events for other files in that directory are ignored
//! - A file that fails to load or validate leaves the live config untouched

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ServiceConfig;

/// Pushes a freshly validated [`ServiceConfig`] whenever its file changes.
pub struct ConfigWatcher {
    file: PathBuf,
    updates: mpsc::UnboundedSender<ServiceConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end the server reloads from.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ServiceConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        // Event paths are absolute; compare against the resolved file path.
        let file = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        (Self { file, updates }, rx)
    }

    /// Start watching on notify's background thread.
    ///
    /// Updates stop flowing once the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = self
            .file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let Self { file, updates } = self;
        let watched = file.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &file) => reload(&file, &updates),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %watched.display(), "Watching config file");
        Ok(watcher)
    }
}

fn touches(event: &Event, file: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|p| p == file)
}

fn reload(file: &Path, updates: &mpsc::UnboundedSender<ServiceConfig>) {
    let config = match load_config(file) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                path = %file.display(),
                error = %e,
                "Rejected config change, keeping the live config"
            );
            return;
        }
    };

    let deadline_ms = config.supervision.deadline_ms;
    if updates.send(config).is_err() {
        tracing::warn!(
            path = %file.display(),
            "Config receiver is gone, dropping reload"
        );
        return;
    }
    tracing::info!(path = %file.display(), deadline_ms, "Config file reloaded");
}
