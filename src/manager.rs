//! `MirrorManager` — the public façade.
//!
//! Composes the cache, the tree builder, and the watch session behind
//! register / unregister / select_target plus read-only views and cleanup.
//! One mutex serializes every mutating operation so the watched path set and
//! the root mapping never diverge; none of those operations do filesystem
//! I/O while holding it.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::builder::collect_cached;
use crate::cache::{CacheState, SharedCache, TargetList};
use crate::cancel::CancelFlag;
use crate::error::MirrorError;
use crate::node::FileNode;
use crate::session::WatchSession;

#[derive(Default)]
struct ManagerInner {
    session: Option<WatchSession>,
    /// Set once when stream creation fails, cleared by a successful restart.
    watch_degraded: bool,
}

/// Mirrors registered directory trees and exposes a flattened file list for
/// the selected one.
pub struct MirrorManager {
    /// The critical section for register/unregister/select_target/cleanup.
    inner: Mutex<ManagerInner>,
    cache: SharedCache,
    target_list: Arc<TargetList>,
    cancel: CancelFlag,
    /// Change-stream cursor, carried across session restarts so no event in
    /// the restart gap is silently skipped.
    last_event_id: Arc<AtomicU64>,
}

impl Default for MirrorManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ManagerInner::default()),
            cache: Arc::new(Mutex::new(CacheState::default())),
            target_list: Arc::new(TargetList::default()),
            cancel: CancelFlag::new(),
            last_event_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Registers a directory as a mirrored root and restarts the watch
    /// session over the updated root set.
    ///
    /// Fails silently (logged) when the path is not a directory or is
    /// already registered.
    pub fn register(&self, root: impl Into<PathBuf>) {
        let root = root.into();

        // Stat before taking the critical section; the duplicate check below
        // still runs under it.
        match fs::metadata(&root) {
            Ok(meta) if meta.file_type().is_dir() => {}
            Ok(_) => {
                let error = MirrorError::NotADirectory(root);
                log::warn!("register ignored: {error}");
                return;
            }
            Err(error) => {
                let error = MirrorError::from(error);
                log::warn!("register ignored: {error}");
                return;
            }
        }

        let mut inner = self.inner.lock();
        {
            let mut state = self.cache.lock();
            if state.roots.contains_key(&root) {
                let error = MirrorError::AlreadyRegistered(root);
                log::warn!("register ignored: {error}");
                return;
            }
            state
                .roots
                .insert(root.clone(), FileNode::new(root.clone(), true));
        }

        log::info!("registered root {}", root.display());
        self.restart_session(&mut inner);
    }

    /// Removes a registered root and restarts (or stops) the watch session.
    /// No-op if the path was never registered.
    pub fn unregister(&self, root: impl AsRef<Path>) {
        let root = root.as_ref();
        let mut inner = self.inner.lock();

        {
            let mut state = self.cache.lock();
            if state.roots.remove(root).is_none() {
                let error = MirrorError::NotRegistered(root.to_path_buf());
                log::warn!("unregister ignored: {error}");
                return;
            }
            if state.target.as_deref() == Some(root) {
                // Stop in-flight completions from appending to a dead view.
                state.target = None;
                state.generation += 1;
            }
        }

        log::info!("unregistered root {}", root.display());
        self.restart_session(&mut inner);
    }

    /// Selects a registered root as the target and (re)builds its flattened
    /// file list.
    ///
    /// Returns false, leaving the current list untouched, when the root is
    /// not registered. On success the cached region's files are in the list
    /// synchronously; files under still-unscanned directories arrive
    /// asynchronously as scans complete.
    pub fn select_target(&self, root: impl AsRef<Path>) -> bool {
        let root = root.as_ref();
        let inner = self.inner.lock();

        let mut state = self.cache.lock();
        if !state.roots.contains_key(root) {
            let error = MirrorError::NotRegistered(root.to_path_buf());
            log::warn!("select_target refused: {error}");
            return false;
        }

        state.generation += 1;
        let generation = state.generation;
        state.target = Some(root.to_path_buf());
        self.target_list.clear();

        let mut files = Vec::new();
        let mut pending = Vec::new();
        if let Some(node) = state.roots.get(root) {
            collect_cached(node, &mut files, &mut pending);
        }
        drop(state);

        self.target_list.append(files);
        if let Some(session) = inner.session.as_ref() {
            for path in pending {
                session.enqueue_scan(path, Some(generation));
            }
        }
        true
    }

    /// The registered roots, sorted.
    pub fn registered_roots(&self) -> Vec<PathBuf> {
        let state = self.cache.lock();
        let mut roots: Vec<PathBuf> = state.roots.keys().cloned().collect();
        roots.sort();
        roots
    }

    /// Snapshot of the live target list. The list grows between reads while
    /// a build is in flight; entries are never removed mid-build.
    pub fn current_target_list(&self) -> Vec<PathBuf> {
        self.target_list.snapshot()
    }

    /// True when change notification could not be subscribed and the cache
    /// is serving without live updates.
    pub fn watch_degraded(&self) -> bool {
        self.inner.lock().watch_degraded
    }

    /// Stops the watch session, cancels in-flight scans, and drops all
    /// registrations. Idempotent; a later `register` starts over fresh.
    pub fn cleanup(&self) {
        let mut inner = self.inner.lock();
        self.cancel.set();
        if let Some(session) = inner.session.take() {
            session.stop();
        }
        inner.watch_degraded = false;
        {
            let mut state = self.cache.lock();
            state.roots.clear();
            state.target = None;
            state.generation += 1;
        }
        self.target_list.clear();
        log::info!("mirror manager cleaned up");
    }

    /// Stop-then-start restart keeping the watched path set in sync with
    /// the root mapping. The OS watch API is keyed on a fixed path set per
    /// stream, so there is no incremental subscription update.
    fn restart_session(&self, inner: &mut ManagerInner) {
        if let Some(session) = inner.session.take() {
            session.stop();
        }

        let roots: Vec<PathBuf> = {
            let state = self.cache.lock();
            state.roots.keys().cloned().collect()
        };
        if roots.is_empty() {
            return;
        }

        let session = WatchSession::start(
            &roots,
            self.cache.clone(),
            self.target_list.clone(),
            self.cancel.clone(),
            self.last_event_id.clone(),
        );
        inner.watch_degraded = !session.watching();

        // Continuation jobs queued in the old session died with it. If a
        // target build is in flight, hand the new worker the uncached
        // frontier so the list still converges; the cached region's files
        // are already in the list.
        {
            let state = self.cache.lock();
            if let Some(node) = state.target.as_ref().and_then(|t| state.roots.get(t)) {
                let mut files = Vec::new();
                let mut pending = Vec::new();
                collect_cached(node, &mut files, &mut pending);
                for path in pending {
                    session.enqueue_scan(path, Some(state.generation));
                }
            }
        }
        inner.session = Some(session);
    }

    /// Whether a watch session is currently running.
    #[cfg(test)]
    fn session_running(&self) -> bool {
        self.inner.lock().session.is_some()
    }

    /// Scan state of the cached node at `path`, if any.
    #[cfg(test)]
    fn node_state(&self, path: &Path) -> Option<crate::node::ScanState> {
        let mut state = self.cache.lock();
        state.node_mut(path).map(|node| node.state)
    }

    /// Injects a watcher event, bypassing the OS stream.
    #[cfg(test)]
    fn inject_event(&self, event: crate::watcher::WatcherEvent) {
        let inner = self.inner.lock();
        if let Some(session) = inner.session.as_ref() {
            session.inject_event(event);
        }
    }
}

impl Drop for MirrorManager {
    fn drop(&mut self) {
        self.cancel.set();
        if let Some(session) = self.inner.lock().session.take() {
            session.stop();
        }
    }
}
