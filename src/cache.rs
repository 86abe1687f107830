//! The root forest and the flattened target list.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::node::FileNode;

/// Cache state shared between the manager and the scan worker.
///
/// Mutated by the worker thread only, except for root insertion/removal and
/// target selection, which the manager performs under its critical section.
#[derive(Debug, Default)]
pub struct CacheState {
    /// Registered roots, keyed by absolute root path.
    pub roots: HashMap<PathBuf, FileNode>,
    /// The root whose flattened file list is currently exposed.
    pub target: Option<PathBuf>,
    /// Build generation, bumped by every target (re)selection. Scan
    /// completions from an older generation must not append to the list.
    pub generation: u64,
}

impl CacheState {
    /// Whether `path` lies under the currently selected target root.
    pub fn under_target(&self, path: &Path) -> bool {
        match &self.target {
            Some(target) => path == target || path.starts_with(target),
            None => false,
        }
    }

    /// Resolves `path` against the closest registered ancestor root and
    /// returns the matching node, if the path falls in a cached region.
    pub fn node_mut(&mut self, path: &Path) -> Option<&mut FileNode> {
        let root = closest_root(self.roots.keys(), path)?;
        self.roots.get_mut(&root)?.find_mut(path)
    }

    /// Invalidates the cached region a changed path falls in.
    ///
    /// `subtree` changes (the OS flagged "must rescan recursively") invalidate
    /// the deepest cached node on the path itself; file-level changes
    /// invalidate the parent directory, whose listing is what went stale.
    /// A path with no still-registered ancestor root is ignored.
    ///
    /// Returns the invalidated node's path.
    pub fn invalidate_path(&mut self, changed: &Path, subtree: bool) -> Option<PathBuf> {
        let root = closest_root(self.roots.keys(), changed)?;
        let affected = if subtree {
            changed.to_path_buf()
        } else {
            changed.parent()?.to_path_buf()
        };
        // Clamp to the root: a change above the root still means the root's
        // own region must be rescanned.
        let affected = if affected.starts_with(&root) {
            affected
        } else {
            root.clone()
        };
        let root_node = self.roots.get_mut(&root)?;
        let node = root_node.find_closest_mut(&affected)?;
        if node.is_dir {
            node.invalidate();
            return Some(node.path.clone());
        }
        // A subtree flag can land on a file path; the parent's listing is
        // what went stale then.
        let parent = node.path.parent()?.to_path_buf();
        let parent_node = root_node.find_closest_mut(&parent)?;
        if !parent_node.is_dir {
            return None;
        }
        parent_node.invalidate();
        Some(parent_node.path.clone())
    }
}

/// Locates the closest registered ancestor root for a path.
pub fn closest_root<'a, I>(roots: I, path: &Path) -> Option<PathBuf>
where
    I: Iterator<Item = &'a PathBuf>,
{
    roots
        .filter(|root| path == root.as_path() || path.starts_with(root))
        .max_by_key(|root| root.components().count())
        .cloned()
}

pub type SharedCache = Arc<Mutex<CacheState>>;

/// The flattened file list for the current target.
///
/// Append-only while a build is in flight: the worker appends batches, the
/// foreground snapshots concurrently and must tolerate the length growing
/// between reads. Cleared only when a new target is selected.
#[derive(Debug, Default)]
pub struct TargetList {
    paths: RwLock<Vec<PathBuf>>,
}

impl TargetList {
    pub fn clear(&self) {
        self.paths.write().clear();
    }

    pub fn append(&self, batch: Vec<PathBuf>) {
        if !batch.is_empty() {
            self.paths.write().extend(batch);
        }
    }

    /// Snapshot of the list as of this call.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.paths.read().clone()
    }

    pub fn len(&self) -> usize {
        self.paths.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ScanState;

    fn cached_dir(path: &str) -> FileNode {
        let mut node = FileNode::new(PathBuf::from(path), true);
        node.state = ScanState::Cached;
        node
    }

    fn state_with_root(root: &str) -> CacheState {
        let mut state = CacheState::default();
        state
            .roots
            .insert(PathBuf::from(root), cached_dir(root));
        state
    }

    #[test]
    fn closest_root_picks_deepest_ancestor() {
        let roots = vec![PathBuf::from("/a"), PathBuf::from("/a/b")];
        let found = closest_root(roots.iter(), Path::new("/a/b/c.txt"));
        assert_eq!(found, Some(PathBuf::from("/a/b")));
    }

    #[test]
    fn closest_root_ignores_unrelated_paths() {
        let roots = vec![PathBuf::from("/a")];
        assert!(closest_root(roots.iter(), Path::new("/b/c")).is_none());
    }

    #[test]
    fn subtree_change_invalidates_the_node_itself() {
        let mut state = state_with_root("/r");
        let mut sub = cached_dir("/r/sub");
        sub.children
            .push(FileNode::new(PathBuf::from("/r/sub/b.txt"), false));
        state.roots.get_mut(Path::new("/r")).unwrap().children.push(sub);

        let affected = state.invalidate_path(Path::new("/r/sub"), true).unwrap();
        assert_eq!(affected, PathBuf::from("/r/sub"));
        let node = state.node_mut(Path::new("/r/sub")).unwrap();
        assert_eq!(node.state, ScanState::Uncached);
        assert!(node.children.is_empty());
    }

    #[test]
    fn file_change_invalidates_the_parent_listing() {
        let mut state = state_with_root("/r");
        state
            .roots
            .get_mut(Path::new("/r"))
            .unwrap()
            .children
            .push(FileNode::new(PathBuf::from("/r/a.txt"), false));

        let affected = state
            .invalidate_path(Path::new("/r/a.txt"), false)
            .unwrap();
        assert_eq!(affected, PathBuf::from("/r"));
        assert_eq!(
            state.roots.get(Path::new("/r")).unwrap().state,
            ScanState::Uncached
        );
    }

    #[test]
    fn change_below_cached_frontier_invalidates_closest_ancestor() {
        let mut state = state_with_root("/r");
        state
            .roots
            .get_mut(Path::new("/r"))
            .unwrap()
            .children
            .push(FileNode::new(PathBuf::from("/r/sub"), true)); // Uncached

        // /r/sub/deep/f.txt is below the frontier; /r/sub absorbs the change.
        let affected = state
            .invalidate_path(Path::new("/r/sub/deep/f.txt"), true)
            .unwrap();
        assert_eq!(affected, PathBuf::from("/r/sub"));
    }

    #[test]
    fn change_with_no_registered_ancestor_is_ignored() {
        let mut state = state_with_root("/r");
        assert!(state.invalidate_path(Path::new("/elsewhere/x"), true).is_none());
    }

    #[test]
    fn under_target_requires_a_target() {
        let mut state = state_with_root("/r");
        assert!(!state.under_target(Path::new("/r/a.txt")));
        state.target = Some(PathBuf::from("/r"));
        assert!(state.under_target(Path::new("/r/a.txt")));
        assert!(state.under_target(Path::new("/r")));
        assert!(!state.under_target(Path::new("/q")));
    }

    #[test]
    fn target_list_append_and_snapshot() {
        let list = TargetList::default();
        list.append(vec![PathBuf::from("/r/a.txt")]);
        list.append(vec![PathBuf::from("/r/b.txt")]);
        assert_eq!(list.len(), 2);
        list.clear();
        assert!(list.is_empty());
    }
}
