//! File-watch subscription.
//!
//! Bridges OS change notifications for one source file onto a tokio channel
//! of [`WatchEvent`]s. The parent directory is watched rather than the file
//! itself, because editors routinely replace files on save (write to a
//! temporary, then rename), which would silently kill a direct file watch.
//! Dropping the returned [`WatchSubscription`] unsubscribes.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

/// One file-change notification.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub at: SystemTime,
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("source path has no parent directory: {0}")]
    NoParent(PathBuf),
    #[error("cannot watch {path}: {source}")]
    Subscribe {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Keeps the OS watch alive; dropping it ends the subscription.
pub struct WatchSubscription {
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSubscription").finish_non_exhaustive()
    }
}

/// Subscribe to change events for `path`.
///
/// Events for sibling files in the same directory are filtered out by file
/// name. The channel is bounded; bursts beyond its capacity are dropped,
/// which is harmless because the engine debounces bursts anyway.
pub fn watch(path: &Path) -> Result<(WatchSubscription, mpsc::Receiver<WatchEvent>), WatchError> {
    let target = path.to_path_buf();
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| WatchError::NoParent(target.clone()))?
        .to_path_buf();
    let file_name = target.file_name().map(|name| name.to_os_string());

    let (tx, rx) = mpsc::channel(64);
    let event_target = target.clone();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        let Ok(event) = result else {
            return;
        };
        if !is_change(&event.kind) {
            return;
        }
        let matches_target = event
            .paths
            .iter()
            .any(|p| p == &event_target || (file_name.is_some() && p.file_name() == file_name.as_deref()));
        if !matches_target {
            return;
        }
        trace!(path = %event_target.display(), ?event.kind, "change event");
        let _ = tx.try_send(WatchEvent {
            path: event_target.clone(),
            at: SystemTime::now(),
        });
    })
    .map_err(|source| WatchError::Subscribe {
        path: target.clone(),
        source,
    })?;

    watcher
        .watch(&parent, RecursiveMode::NonRecursive)
        .map_err(|source| WatchError::Subscribe {
            path: target,
            source,
        })?;

    Ok((WatchSubscription { _watcher: watcher }, rx))
}

fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    )
}
