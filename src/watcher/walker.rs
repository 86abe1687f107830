//! Path utilities for change-event handling.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::events::PathChange;

/// Checks whether a changed path falls under a watched root.
pub fn path_in_scope(root: &Path, candidate: &Path) -> bool {
    candidate == root || candidate.starts_with(root)
}

/// Reduces a batch of path changes to a minimal ancestor cover.
///
/// 1. Sort by depth (shallowest first), then lexicographically
/// 2. Deduplicate identical paths, keeping the widest scope
/// 3. Drop any change already covered by a selected subtree-scoped ancestor
///
/// A subtree-scoped ancestor covers everything below it; a file-scoped change
/// only covers the exact same path. O(n log n + n * depth) via a HashSet of
/// selected subtree ancestors.
pub fn coalesce_changes(changes: Vec<PathChange>) -> Vec<PathChange> {
    if changes.len() <= 1 {
        return changes;
    }

    let mut candidates: Vec<(PathChange, usize)> = changes
        .into_iter()
        .map(|change| {
            let depth = change.path.components().count();
            (change, depth)
        })
        .collect();

    // Subtree changes sort before file changes at equal depth so the wider
    // scope wins deduplication.
    candidates.sort_unstable_by(|(a, da), (b, db)| {
        da.cmp(db)
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| b.subtree.cmp(&a.subtree))
    });
    candidates.dedup_by(|(a, _), (b, _)| a.path == b.path && (b.subtree || !a.subtree));

    let mut selected = Vec::with_capacity(candidates.len());
    let mut covered = HashSet::with_capacity(candidates.len());

    for (change, _depth) in candidates {
        if has_covering_ancestor(&change.path, &covered) {
            continue;
        }
        if change.subtree {
            covered.insert(change.path.clone());
        }
        selected.push(change);
    }

    selected
}

/// Checks whether `path` or any of its ancestors is in the covered set.
fn has_covering_ancestor(path: &Path, covered: &HashSet<PathBuf>) -> bool {
    if covered.is_empty() {
        return false;
    }
    if covered.contains(path) {
        return true;
    }
    let mut ancestor = path.to_path_buf();
    while ancestor.pop() {
        if covered.contains(&ancestor) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subtree(path: &str) -> PathChange {
        PathChange {
            path: PathBuf::from(path),
            subtree: true,
        }
    }

    fn file(path: &str) -> PathChange {
        PathChange {
            path: PathBuf::from(path),
            subtree: false,
        }
    }

    fn paths(changes: &[PathChange]) -> Vec<&str> {
        changes
            .iter()
            .map(|c| c.path.to_str().unwrap())
            .collect()
    }

    #[test]
    fn coalesce_empty_input() {
        assert!(coalesce_changes(vec![]).is_empty());
    }

    #[test]
    fn coalesce_single_change() {
        let result = coalesce_changes(vec![file("/a/b/c")]);
        assert_eq!(paths(&result), vec!["/a/b/c"]);
    }

    #[test]
    fn subtree_ancestor_swallows_descendants() {
        let result = coalesce_changes(vec![file("/a/b/c"), subtree("/a/b"), file("/a/b/d")]);
        assert_eq!(paths(&result), vec!["/a/b"]);
        assert!(result[0].subtree);
    }

    #[test]
    fn file_ancestor_does_not_swallow_descendants() {
        // A file-scoped change to /a/b does not cover /a/b/c.
        let result = coalesce_changes(vec![file("/a/b"), file("/a/b/c")]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn siblings_are_kept() {
        let result = coalesce_changes(vec![subtree("/a/b"), subtree("/a/c"), subtree("/x/y")]);
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn identical_paths_deduplicate_to_widest_scope() {
        let result = coalesce_changes(vec![file("/a/b"), subtree("/a/b"), file("/a/b")]);
        assert_eq!(result.len(), 1);
        assert!(result[0].subtree);
    }

    #[test]
    fn descendant_seen_before_ancestor_still_coalesces() {
        let result =
            coalesce_changes(vec![file("/a/b/c/d"), file("/a/b/c/e"), subtree("/a/b")]);
        assert_eq!(paths(&result), vec!["/a/b"]);
    }

    #[test]
    fn similar_prefixes_not_confused() {
        // Component-wise comparison: /foo/bar is not an ancestor of /foo/barista.
        let result = coalesce_changes(vec![subtree("/foo/bar"), file("/foo/barista")]);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn deep_nesting_collapses_to_top() {
        let result = coalesce_changes(vec![
            subtree("/a"),
            subtree("/a/b"),
            subtree("/a/b/c"),
            file("/a/b/c/d"),
        ]);
        assert_eq!(paths(&result), vec!["/a"]);
    }

    #[test]
    fn path_in_scope_basics() {
        assert!(path_in_scope(Path::new("/a"), Path::new("/a")));
        assert!(path_in_scope(Path::new("/a"), Path::new("/a/b/c")));
        assert!(!path_in_scope(Path::new("/a"), Path::new("/b")));
    }
}
