//! Watcher creation and event classification.

use std::path::PathBuf;
#[cfg(target_os = "macos")]
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::error::{MirrorError, Result};

#[cfg(target_os = "macos")]
use super::fsevent::{FsEvent, FsEventFlags, FsEventStream};

#[cfg(not(target_os = "macos"))]
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// One changed path, with its invalidation scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    pub path: PathBuf,
    /// True when the OS flagged the path's whole subtree as possibly changed
    /// ("must scan subdirectories"); false for a single-entry change, which
    /// only stales the parent directory's listing.
    pub subtree: bool,
}

/// An event sent from the watcher callback to the watch-session worker.
#[derive(Debug)]
pub enum WatcherEvent {
    /// Changed paths to reconcile against the cache.
    Changed(Vec<PathChange>),
    /// The OS could not say what changed; every watched root is suspect.
    RescanAll,
    /// The watcher failed after startup.
    Error(String),
}

/// Platform watcher handle owned by the watch session. Dropping it tears the
/// OS subscription down.
#[cfg(target_os = "macos")]
pub type WatcherHandle = FsEventStream;
#[cfg(not(target_os = "macos"))]
pub type WatcherHandle = RecommendedWatcher;

/// Creates the change-notification stream for the given root set.
///
/// On macOS the stream resumes from `since_event_id` and keeps
/// `last_event_id` at the highest delivered event ID, so the next session
/// can resume without losing the restart gap. The notify backend has no
/// cursor; both arguments are ignored there.
#[cfg(target_os = "macos")]
pub(crate) fn create_watcher(
    roots: &[PathBuf],
    since_event_id: u64,
    event_tx: Sender<WatcherEvent>,
    last_event_id: Arc<AtomicU64>,
) -> Result<WatcherHandle> {
    let watched_roots = roots.to_vec();
    let stream = FsEventStream::new(roots, since_event_id, 0.05, move |events| {
        classify_fsevent_batch(&watched_roots, events, &event_tx, &last_event_id);
    })
    .map_err(|error| MirrorError::WatchInit(format!("FSEvents stream: {error}")))?;
    Ok(stream)
}

/// Classifies a batch of FSEvents and forwards it to the worker.
#[cfg(target_os = "macos")]
fn classify_fsevent_batch(
    roots: &[PathBuf],
    events: Vec<FsEvent>,
    event_tx: &Sender<WatcherEvent>,
    last_event_id: &AtomicU64,
) {
    if events.is_empty() {
        return;
    }

    let max_event_id = events.iter().map(|e| e.event_id).max().unwrap_or(0);
    if max_event_id > 0 {
        last_event_id.fetch_max(max_event_id, Ordering::Relaxed);
    }

    if events
        .iter()
        .any(|e| e.flags.contains(FsEventFlags::EVENT_IDS_WRAPPED))
    {
        let _ = event_tx.send(WatcherEvent::RescanAll);
        return;
    }

    let changes: Vec<PathChange> = events
        .into_iter()
        .filter(|e| !e.flags.contains(FsEventFlags::HISTORY_DONE))
        .map(|e| {
            // ROOT_CHANGED carries the watched root itself; either way the
            // flagged path's whole subtree is suspect.
            let subtree = e
                .flags
                .intersects(FsEventFlags::ROOT_CHANGED | FsEventFlags::MUST_SCAN_SUBDIRS);
            PathChange {
                path: e.path,
                subtree,
            }
        })
        .filter(|c| roots.iter().any(|r| super::path_in_scope(r, &c.path)))
        .collect();

    if !changes.is_empty() {
        let _ = event_tx.send(WatcherEvent::Changed(changes));
    }
}

/// Creates the change-notification stream for the given root set.
#[cfg(not(target_os = "macos"))]
pub(crate) fn create_watcher(
    roots: &[PathBuf],
    _since_event_id: u64,
    event_tx: Sender<WatcherEvent>,
    _last_event_id: Arc<std::sync::atomic::AtomicU64>,
) -> Result<WatcherHandle> {
    let mut watcher =
        recommended_watcher(move |event_result: notify::Result<Event>| match event_result {
            Ok(event) => classify_notify_event(event, &event_tx),
            Err(error) => {
                let _ = event_tx.send(WatcherEvent::Error(error.to_string()));
            }
        })
        .map_err(|error| MirrorError::WatchInit(format!("notify watcher: {error}")))?;

    for root in roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|error| {
                MirrorError::WatchInit(format!("watch {}: {error}", root.display()))
            })?;
    }

    Ok(watcher)
}

/// Classifies a notify event and forwards it to the worker.
#[cfg(not(target_os = "macos"))]
fn classify_notify_event(event: Event, event_tx: &Sender<WatcherEvent>) {
    if matches!(event.kind, EventKind::Access(_)) {
        return;
    }
    if event.paths.is_empty() {
        let _ = event_tx.send(WatcherEvent::RescanAll);
        return;
    }
    // notify reports the affected entry without a subtree flag; directory
    // renames/removes arrive as a change to that entry, which the parent
    // rescan picks up.
    let changes = event
        .paths
        .into_iter()
        .map(|path| PathChange {
            path,
            subtree: false,
        })
        .collect();
    let _ = event_tx.send(WatcherEvent::Changed(changes));
}
