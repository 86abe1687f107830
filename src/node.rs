//! Cached filesystem tree nodes.

use std::path::{Path, PathBuf};

/// Scan state of a cached directory node.
///
/// Directories move `Uncached → Scanning → Cached`, and back to `Uncached`
/// when a change event invalidates them or an in-flight scan is abandoned.
/// The tagged enum makes "needs scan" and "scanning" structurally exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Direct children have never been enumerated (or were invalidated).
    Uncached,
    /// An enumeration of direct children is in flight on the worker.
    Scanning,
    /// Direct children are enumerated and current as of the last scan.
    Cached,
}

/// One filesystem entry in the mirrored tree.
#[derive(Debug, Clone)]
pub struct FileNode {
    /// Absolute path; the node's identity.
    pub path: PathBuf,
    /// Immutable after creation. Symlinks to directories count as files
    /// so they are never recursed.
    pub is_dir: bool,
    /// Only meaningful for directories; files are always `Cached`.
    pub state: ScanState,
    /// Only populated for directories, in OS listing order.
    pub children: Vec<FileNode>,
}

impl FileNode {
    /// Creates a new node. Directories start `Uncached`, files `Cached`.
    pub fn new(path: PathBuf, is_dir: bool) -> Self {
        let state = if is_dir {
            ScanState::Uncached
        } else {
            ScanState::Cached
        };
        Self {
            path,
            is_dir,
            state,
            children: Vec::new(),
        }
    }

    /// Marks a directory as needing re-enumeration, dropping its cached
    /// children. No-op for files and for nodes already `Uncached`.
    pub fn invalidate(&mut self) {
        if self.is_dir && self.state != ScanState::Uncached {
            self.state = ScanState::Uncached;
            self.children.clear();
        }
    }

    /// Finds the node for `target` within this subtree, descending by path
    /// prefix. Returns `None` if `target` is outside the subtree or falls
    /// in a region that has not been enumerated yet.
    pub fn find(&self, target: &Path) -> Option<&FileNode> {
        if self.path == target {
            return Some(self);
        }
        if !target.starts_with(&self.path) {
            return None;
        }
        self.children
            .iter()
            .find(|child| target == child.path || target.starts_with(&child.path))
            .and_then(|child| child.find(target))
    }

    /// Mutable variant of [`find`](Self::find).
    pub fn find_mut(&mut self, target: &Path) -> Option<&mut FileNode> {
        if self.path == target {
            return Some(self);
        }
        if !target.starts_with(&self.path) {
            return None;
        }
        self.children
            .iter_mut()
            .find(|child| target == child.path || target.starts_with(&child.path))
            .and_then(|child| child.find_mut(target))
    }

    /// Finds the deepest node on the path from this subtree's top down to
    /// `target`. Used to correlate a changed path with the cached region it
    /// invalidates: when `target` itself is not cached yet, the closest
    /// enumerated ancestor is the node whose listing is now suspect.
    pub fn find_closest_mut(&mut self, target: &Path) -> Option<&mut FileNode> {
        if !(self.path == target || target.starts_with(&self.path)) {
            return None;
        }
        // Two-phase descent keeps the borrow checker happy: locate the
        // covering child first, then recurse into it.
        let child_idx = self
            .children
            .iter()
            .position(|child| target == child.path || target.starts_with(&child.path));
        match child_idx {
            Some(idx) => self.children[idx].find_closest_mut(target),
            None => Some(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(path: &str) -> FileNode {
        FileNode::new(PathBuf::from(path), true)
    }

    fn file(path: &str) -> FileNode {
        FileNode::new(PathBuf::from(path), false)
    }

    #[test]
    fn directories_start_uncached() {
        assert_eq!(dir("/a").state, ScanState::Uncached);
    }

    #[test]
    fn files_start_cached_with_no_children() {
        let node = file("/a/f.txt");
        assert_eq!(node.state, ScanState::Cached);
        assert!(node.children.is_empty());
    }

    #[test]
    fn invalidate_clears_children() {
        let mut root = dir("/a");
        root.state = ScanState::Cached;
        root.children.push(file("/a/f.txt"));
        root.invalidate();
        assert_eq!(root.state, ScanState::Uncached);
        assert!(root.children.is_empty());
    }

    #[test]
    fn invalidate_is_noop_for_files() {
        let mut node = file("/a/f.txt");
        node.invalidate();
        assert_eq!(node.state, ScanState::Cached);
    }

    #[test]
    fn find_descends_by_prefix() {
        let mut root = dir("/a");
        root.state = ScanState::Cached;
        let mut sub = dir("/a/sub");
        sub.state = ScanState::Cached;
        sub.children.push(file("/a/sub/f.txt"));
        root.children.push(sub);

        let found = root.find(Path::new("/a/sub/f.txt")).unwrap();
        assert!(!found.is_dir);
        assert!(root.find(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn find_misses_unenumerated_regions() {
        let root = dir("/a");
        // /a/sub exists on disk, but /a was never scanned.
        assert!(root.find(Path::new("/a/sub")).is_none());
    }

    #[test]
    fn find_closest_returns_nearest_cached_ancestor() {
        let mut root = dir("/a");
        root.state = ScanState::Cached;
        root.children.push(dir("/a/sub"));

        // /a/sub/deep is below the cached frontier; the closest node is /a/sub.
        let closest = root.find_closest_mut(Path::new("/a/sub/deep")).unwrap();
        assert_eq!(closest.path, PathBuf::from("/a/sub"));
    }

    #[test]
    fn find_closest_outside_subtree_is_none() {
        let mut root = dir("/a");
        assert!(root.find_closest_mut(Path::new("/b")).is_none());
    }

    #[test]
    fn similar_prefixes_not_confused() {
        let mut root = dir("/a");
        root.state = ScanState::Cached;
        root.children.push(dir("/a/bar"));
        // Path::starts_with compares components, so /a/barista is not under /a/bar.
        let closest = root.find_closest_mut(Path::new("/a/barista")).unwrap();
        assert_eq!(closest.path, PathBuf::from("/a"));
    }
}
