//! The watch session: one dedicated worker thread plus the OS stream.
//!
//! The worker is the only thread that mutates node scan state and children.
//! It consumes two channels: scan jobs (from target selection and from its
//! own completions) and watcher events (from the OS stream callback). The
//! stream's path set is fixed per session, so any change to the registered
//! roots is a full stop-then-start restart resuming from the recorded event
//! cursor.

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, unbounded, Receiver, Sender};

use crate::builder::{collect_cached, list_children};
use crate::cache::{SharedCache, TargetList};
use crate::cancel::CancelFlag;
use crate::node::{FileNode, ScanState};
use crate::watcher::{coalesce_changes, create_watcher, WatcherEvent, WatcherHandle};

/// A scan request for the worker.
#[derive(Debug)]
pub(crate) enum Job {
    /// Enumerate one directory's children.
    ///
    /// `generation` is set when the scan feeds the current target build;
    /// completions compare it against the cache generation before appending
    /// to the target list. `None` marks a cache-refresh scan that must not
    /// touch the list.
    Scan {
        path: PathBuf,
        generation: Option<u64>,
    },
    Shutdown,
}

/// A running watch session. Exists iff at least one root is registered.
pub(crate) struct WatchSession {
    job_tx: Sender<Job>,
    worker: Option<JoinHandle<()>>,
    /// `None` when stream creation failed: scans still work, live updates
    /// don't (degraded mode).
    watcher: Option<WatcherHandle>,
    #[cfg(test)]
    event_tx: Sender<WatcherEvent>,
}

impl WatchSession {
    /// Spawns the worker and subscribes to change notifications for `roots`,
    /// resuming from the cursor in `last_event_id`.
    pub(crate) fn start(
        roots: &[PathBuf],
        cache: SharedCache,
        target_list: Arc<TargetList>,
        cancel: CancelFlag,
        last_event_id: Arc<AtomicU64>,
    ) -> Self {
        cancel.reset();

        let (job_tx, job_rx) = unbounded::<Job>();
        let (event_tx, event_rx) = unbounded::<WatcherEvent>();

        #[cfg(target_os = "macos")]
        let since_event_id = {
            use std::sync::atomic::Ordering;
            let recorded = last_event_id.load(Ordering::Relaxed);
            if recorded > 0 {
                recorded
            } else {
                let now = crate::watcher::FsEventStream::current_event_id();
                last_event_id.store(now, Ordering::Relaxed);
                now
            }
        };
        #[cfg(not(target_os = "macos"))]
        let since_event_id = 0u64;

        let watcher = match create_watcher(roots, since_event_id, event_tx.clone(), last_event_id)
        {
            Ok(handle) => Some(handle),
            Err(error) => {
                log::warn!("live updates disabled: {error}");
                None
            }
        };

        log::info!(
            "watch session started roots={} cursor={} watcher={}",
            roots.len(),
            since_event_id,
            watcher.is_some(),
        );

        let worker_job_tx = job_tx.clone();
        let worker = thread::spawn(move || {
            run_worker(job_rx, event_rx, worker_job_tx, cache, target_list, cancel);
        });

        Self {
            job_tx,
            worker: Some(worker),
            watcher,
            #[cfg(test)]
            event_tx,
        }
    }

    pub(crate) fn enqueue_scan(&self, path: PathBuf, generation: Option<u64>) {
        let _ = self.job_tx.send(Job::Scan { path, generation });
    }

    /// Whether the OS stream is live. False means degraded no-live-updates
    /// mode; scanning still works.
    pub(crate) fn watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Tears the stream down and joins the worker. The event cursor was
    /// maintained continuously, so the next session resumes without a gap.
    pub(crate) fn stop(mut self) {
        self.watcher.take();
        let _ = self.job_tx.send(Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        log::info!("watch session stopped");
    }

    /// Injects a watcher event as if the OS stream had delivered it.
    #[cfg(test)]
    pub(crate) fn inject_event(&self, event: WatcherEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// The worker event loop. Blocks until shutdown or both channels disconnect.
fn run_worker(
    job_rx: Receiver<Job>,
    event_rx: Receiver<WatcherEvent>,
    job_tx: Sender<Job>,
    cache: SharedCache,
    target_list: Arc<TargetList>,
    cancel: CancelFlag,
) {
    loop {
        select! {
            recv(job_rx) -> job => match job {
                Ok(Job::Scan { path, generation }) => {
                    handle_scan(&cache, &target_list, &job_tx, &cancel, path, generation);
                }
                Ok(Job::Shutdown) | Err(_) => break,
            },
            recv(event_rx) -> event => match event {
                Ok(event) => handle_event(&cache, &job_tx, event),
                // Stream gone; keep serving scan jobs until shutdown.
                Err(_) => {
                    drain_jobs(&job_rx, &job_tx, &cache, &target_list, &cancel);
                    break;
                }
            },
        }
    }
}

/// Once the event channel is gone, fall back to draining scan jobs only.
fn drain_jobs(
    job_rx: &Receiver<Job>,
    job_tx: &Sender<Job>,
    cache: &SharedCache,
    target_list: &Arc<TargetList>,
    cancel: &CancelFlag,
) {
    while let Ok(job) = job_rx.recv() {
        match job {
            Job::Scan { path, generation } => {
                handle_scan(cache, target_list, job_tx, cancel, path, generation);
            }
            Job::Shutdown => break,
        }
    }
}

/// Enumerates one directory, off the cache lock.
///
/// Three phases: claim the node (`Uncached -> Scanning`) under the lock, do
/// the listing I/O unlocked, then install the children and report. The claim
/// is the duplicate-work guard: each directory gets enumerated by exactly one
/// scan no matter how many jobs raced to request it.
fn handle_scan(
    cache: &SharedCache,
    target_list: &Arc<TargetList>,
    job_tx: &Sender<Job>,
    cancel: &CancelFlag,
    path: PathBuf,
    generation: Option<u64>,
) {
    {
        let mut state = cache.lock();
        let current_generation = state.generation;
        let under_target = state.under_target(&path);
        let Some(node) = state.node_mut(&path) else {
            return;
        };
        if !node.is_dir {
            return;
        }
        match node.state {
            ScanState::Uncached => node.state = ScanState::Scanning,
            ScanState::Cached => {
                // An earlier scan populated this node but its build
                // generation had gone stale, so nothing was reported. If
                // this job belongs to the current build, report the cached
                // region now and keep descending.
                if matches!(generation, Some(gen) if gen == current_generation) && under_target {
                    let mut files = Vec::new();
                    let mut pending = Vec::new();
                    collect_cached(node, &mut files, &mut pending);
                    drop(state);
                    target_list.append(files);
                    for dir in pending {
                        let _ = job_tx.send(Job::Scan {
                            path: dir,
                            generation,
                        });
                    }
                }
                return;
            }
            // Unreachable in practice: scans run start-to-finish on this
            // worker, so a queued job never observes one in flight.
            ScanState::Scanning => return,
        }
    }

    let listing = list_children(&path, cancel);

    let mut state = cache.lock();
    let Some(node) = state.node_mut(&path) else {
        // Root unregistered mid-scan; nothing to restore.
        return;
    };
    if node.state != ScanState::Scanning {
        // Invalidated mid-scan; the listing is already stale.
        return;
    }

    let Some(listing) = listing else {
        // Cancelled: abandon without installing, never leave the node stuck.
        node.state = ScanState::Uncached;
        return;
    };

    node.children = listing
        .iter()
        .map(|entry| FileNode::new(entry.path.clone(), entry.is_dir))
        .collect();
    node.state = ScanState::Cached;
    log::debug!(
        "scanned path={} children={}",
        path.display(),
        listing.len()
    );

    // Report into the current target build, if this scan still belongs to it.
    let reporting = matches!(generation, Some(gen) if gen == state.generation)
        && state.under_target(&path);
    if reporting {
        let files: Vec<PathBuf> = listing
            .iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.path.clone())
            .collect();
        target_list.append(files);
        // Continuation-driven recursion: newly discovered directories keep
        // the build going without waiting for another target selection.
        for entry in listing.iter().filter(|entry| entry.is_dir) {
            let _ = job_tx.send(Job::Scan {
                path: entry.path.clone(),
                generation,
            });
        }
    }
}

/// Reconciles a watcher event against the cache.
fn handle_event(cache: &SharedCache, job_tx: &Sender<Job>, event: WatcherEvent) {
    match event {
        WatcherEvent::Changed(changes) => {
            let mut state = cache.lock();
            for change in coalesce_changes(changes) {
                let Some(affected) = state.invalidate_path(&change.path, change.subtree) else {
                    continue;
                };
                log::debug!(
                    "invalidated path={} subtree={}",
                    affected.display(),
                    change.subtree
                );
                // Keep the active view fresh; everywhere else rebuilds
                // lazily on the next target selection.
                if state.under_target(&affected) {
                    let _ = job_tx.send(Job::Scan {
                        path: affected,
                        generation: None,
                    });
                }
            }
        }
        WatcherEvent::RescanAll => {
            let mut state = cache.lock();
            log::warn!("watcher requested full rescan of all roots");
            let roots: Vec<PathBuf> = state.roots.keys().cloned().collect();
            for root in roots {
                if let Some(node) = state.roots.get_mut(&root) {
                    node.invalidate();
                }
                if state.under_target(&root) {
                    let _ = job_tx.send(Job::Scan {
                        path: root,
                        generation: None,
                    });
                }
            }
        }
        WatcherEvent::Error(message) => {
            log::warn!("watcher error: {message}");
        }
    }
}
