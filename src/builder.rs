//! Tree building: directory listing and cached-subtree traversal.
//!
//! The listing primitive runs on the worker thread only; the traversal runs
//! under the cache lock and never touches the filesystem. Together they
//! implement lazy population: traversal reports what is cached and hands the
//! uncached frontier back as pending scan work.

use std::fs;
use std::path::{Path, PathBuf};

use crate::cancel::CancelFlag;
use crate::node::{FileNode, ScanState};

/// One immediate child discovered by a directory listing.
#[derive(Debug, Clone)]
pub struct Listing {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Lists the immediate children of `dir`, in OS listing order.
///
/// - Hidden entries (leading `.`) are skipped at this level only.
/// - Symlinks are classified by `symlink_metadata`, so a symlink to a
///   directory is reported as a non-directory and never recursed.
/// - An unreadable directory (permissions, deleted mid-scan) yields an empty
///   listing for this pass; a later change event retriggers the scan.
///
/// Returns `None` when cancelled partway through.
pub fn list_children(dir: &Path, cancel: &CancelFlag) -> Option<Vec<Listing>> {
    cancel.is_active()?;
    #[cfg(test)]
    probes::record_listing(dir);

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            log::warn!("directory listing failed path={} error={error}", dir.display());
            return Some(Vec::new());
        }
    };

    let mut children = Vec::new();
    for entry in entries {
        cancel.is_active()?;
        let Ok(entry) = entry else { continue };
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        let is_dir = fs::symlink_metadata(&path)
            .map(|meta| meta.file_type().is_dir())
            .unwrap_or(false);
        children.push(Listing { path, is_dir });
    }
    Some(children)
}

/// Pre-order walk of a cached subtree.
///
/// Plain files are appended to `files` in listing order. `Cached` directories
/// are recursed. `Uncached` and `Scanning` directories are appended to
/// `pending` without descending: the worker picks the branch up once — an
/// `Uncached` branch gets enumerated, while a branch with a scan already in
/// flight is revisited after that scan completes, never enumerated twice.
pub fn collect_cached(node: &FileNode, files: &mut Vec<PathBuf>, pending: &mut Vec<PathBuf>) {
    match (node.is_dir, node.state) {
        (false, _) => files.push(node.path.clone()),
        (true, ScanState::Cached) => {
            for child in &node.children {
                collect_cached(child, files, pending);
            }
        }
        (true, ScanState::Uncached | ScanState::Scanning) => pending.push(node.path.clone()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn dir_node(path: &str, state: ScanState) -> FileNode {
        let mut node = FileNode::new(PathBuf::from(path), true);
        node.state = state;
        node
    }

    #[test]
    fn list_children_classifies_entries() {
        let tmp = tempfile::tempdir().unwrap();
        File::create(tmp.path().join("a.txt")).unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();

        let children = list_children(tmp.path(), &CancelFlag::new()).unwrap();
        assert_eq!(children.len(), 2);
        let file = children.iter().find(|c| c.path.ends_with("a.txt")).unwrap();
        let sub = children.iter().find(|c| c.path.ends_with("sub")).unwrap();
        assert!(!file.is_dir);
        assert!(sub.is_dir);
    }

    #[test]
    fn list_children_skips_hidden_entries() {
        let tmp = tempfile::tempdir().unwrap();
        File::create(tmp.path().join(".hidden")).unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        File::create(tmp.path().join("visible.txt")).unwrap();

        let children = list_children(tmp.path(), &CancelFlag::new()).unwrap();
        assert_eq!(children.len(), 1);
        assert!(children[0].path.ends_with("visible.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_is_not_a_directory() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("real"), tmp.path().join("link")).unwrap();

        let children = list_children(tmp.path(), &CancelFlag::new()).unwrap();
        let link = children.iter().find(|c| c.path.ends_with("link")).unwrap();
        assert!(!link.is_dir);
    }

    #[test]
    fn unreadable_directory_lists_empty() {
        let missing = Path::new("/nonexistent/fsmirror-test");
        let children = list_children(missing, &CancelFlag::new()).unwrap();
        assert!(children.is_empty());
    }

    #[test]
    fn cancelled_listing_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancelFlag::new();
        cancel.set();
        assert!(list_children(tmp.path(), &cancel).is_none());
    }

    #[test]
    fn collect_reports_files_and_pending_dirs() {
        let mut root = dir_node("/r", ScanState::Cached);
        root.children.push(FileNode::new("/r/a.txt".into(), false));
        root.children.push(dir_node("/r/uncached", ScanState::Uncached));
        let mut cached_sub = dir_node("/r/sub", ScanState::Cached);
        cached_sub
            .children
            .push(FileNode::new("/r/sub/b.txt".into(), false));
        root.children.push(cached_sub);

        let mut files = Vec::new();
        let mut pending = Vec::new();
        collect_cached(&root, &mut files, &mut pending);

        assert_eq!(
            files,
            vec![PathBuf::from("/r/a.txt"), PathBuf::from("/r/sub/b.txt")]
        );
        assert_eq!(pending, vec![PathBuf::from("/r/uncached")]);
    }

    #[test]
    fn collect_defers_scanning_branches_without_descending() {
        let mut root = dir_node("/r", ScanState::Cached);
        let mut scanning = dir_node("/r/busy", ScanState::Scanning);
        scanning
            .children
            .push(FileNode::new("/r/busy/partial.txt".into(), false));
        root.children.push(scanning);

        let mut files = Vec::new();
        let mut pending = Vec::new();
        collect_cached(&root, &mut files, &mut pending);

        // Partial children of an in-flight scan are never reported early.
        assert!(files.is_empty());
        assert_eq!(pending, vec![PathBuf::from("/r/busy")]);
    }

    #[test]
    fn uncached_root_is_pending_only() {
        let root = dir_node("/r", ScanState::Uncached);
        let mut files = Vec::new();
        let mut pending = Vec::new();
        collect_cached(&root, &mut files, &mut pending);
        assert!(files.is_empty());
        assert_eq!(pending, vec![PathBuf::from("/r")]);
    }
}
