//! Filesystem watching module.
//!
//! OS change-notification integration:
//! - FSEvents on macOS, with resumable event IDs
//! - notify on other platforms
//! - Event classification, path coalescing, and root correlation
//!
//! Watcher callbacks send events through a crossbeam channel instead of
//! mutating cache state directly. The watch-session worker is the sole
//! consumer and applies invalidations to data it owns.

mod events;
mod walker;

#[cfg(target_os = "macos")]
mod fsevent;

pub use events::{PathChange, WatcherEvent, WatcherHandle};
pub(crate) use events::create_watcher;

pub use walker::{coalesce_changes, path_in_scope};

#[cfg(target_os = "macos")]
pub use fsevent::{FsEvent, FsEventFlags, FsEventStream};
