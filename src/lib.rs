//! In-memory mirroring of directory subtrees with live change tracking.
//!
//! This crate maintains a lazily populated cache of one or more registered
//! directory trees and exposes a flattened, ordered list of file paths for
//! whichever tree is currently selected:
//! - Lazy, asynchronous tree population on a dedicated worker thread
//! - FSEvents (macOS) / notify (other platforms) change subscription with
//!   cursor resumption across session restarts
//! - Append-only target list safe for concurrent foreground reads

pub mod builder;
pub mod cache;
pub mod cancel;
pub mod error;
pub mod manager;
pub mod node;
pub mod session;
pub mod watcher;

// Re-export main types
pub use cancel::CancelFlag;
pub use error::{MirrorError, Result};
pub use manager::MirrorManager;
pub use node::{FileNode, ScanState};
