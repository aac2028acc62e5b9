//! File watcher for file-backed configuration sources.
//!
//! Watches the parent directory of every source file (so editors that replace
//! files atomically are still seen) and reports changes to the watched files
//! only. Rapid changes are coalesced by the debouncer.

use crate::error::ConfigResult;
use notify::RecommendedWatcher;
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, Debouncer, new_debouncer};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tracing::{debug, error, info, warn};

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Events emitted when watched source files change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceChangeEvent {
    /// One or more watched files were written, created, or removed
    Changed(Vec<PathBuf>),
    /// Watcher encountered an error
    Error(String),
}

impl SourceChangeEvent {
    pub fn requires_reload(&self) -> bool {
        !matches!(self, SourceChangeEvent::Error(_))
    }
}

/// Keeps the underlying watcher alive. Dropping it stops event delivery.
pub struct SourceWatcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    watched: Vec<PathBuf>,
    task: tokio::task::JoinHandle<()>,
}

impl SourceWatcher {
    /// Files this watcher reports on.
    pub fn watched_files(&self) -> &[PathBuf] {
        &self.watched
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for SourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWatcher")
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

/// Start watching `files`. Files whose parent directory does not exist are
/// skipped with a warning.
pub fn start_source_watcher(
    files: &[PathBuf],
    debounce: Duration,
) -> ConfigResult<(SourceWatcher, tokio_mpsc::UnboundedReceiver<SourceChangeEvent>)> {
    let (event_tx, event_rx) = tokio_mpsc::unbounded_channel();
    let (notify_tx, notify_rx) = mpsc::channel();

    let mut debouncer = new_debouncer(debounce, notify_tx)?;
    let watcher = debouncer.watcher();

    let mut watched = Vec::new();
    let mut dirs = BTreeSet::new();
    for file in files {
        let Some(key) = watch_key(file) else {
            warn!(
                "Parent directory does not exist, skipping watch: {}",
                file.display()
            );
            continue;
        };
        if dirs.insert(key.0.clone()) {
            info!("Watching configuration directory: {}", key.0.display());
            watcher.watch(&key.0, notify::RecursiveMode::NonRecursive)?;
        }
        watched.push(key.0.join(&key.1));
    }

    let targets = watched.clone();
    let task = tokio::task::spawn_blocking(move || {
        process_notify_events(notify_rx, event_tx, &targets);
    });

    Ok((
        SourceWatcher {
            _debouncer: debouncer,
            watched,
            task,
        },
        event_rx,
    ))
}

fn process_notify_events(
    rx: mpsc::Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
    tx: tokio_mpsc::UnboundedSender<SourceChangeEvent>,
    targets: &[PathBuf],
) {
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let changed = relevant_paths(events, targets);
                if changed.is_empty() {
                    continue;
                }
                debug!("Configuration source change detected: {:?}", changed);
                if tx.send(SourceChangeEvent::Changed(changed)).is_err() {
                    info!("Source watcher receiver dropped, stopping");
                    return;
                }
            }
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
                let _ = tx.send(SourceChangeEvent::Error(e.to_string()));
            }
            Err(_) => {
                info!("Source watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Watched files touched by `events`, deduplicated and sorted.
fn relevant_paths(events: Vec<DebouncedEvent>, targets: &[PathBuf]) -> Vec<PathBuf> {
    let mut changed = BTreeSet::new();
    for event in events {
        if !matches!(
            event.kind,
            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
        ) {
            continue;
        }
        if let Some((dir, name)) = watch_key(&event.path) {
            let candidate = dir.join(name);
            if targets.contains(&candidate) {
                changed.insert(candidate);
            }
        }
    }
    changed.into_iter().collect()
}

/// Canonical parent directory plus file name. The file itself may not exist.
fn watch_key(file: &Path) -> Option<(PathBuf, PathBuf)> {
    let name = file.file_name()?;
    let parent = match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let dir = std::fs::canonicalize(parent).ok()?;
    Some((dir, PathBuf::from(name)))
}
