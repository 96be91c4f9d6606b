//! Scanned tree container and statistics.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScanWarning;
use crate::node::FileNode;
use crate::pattern::IgnoreSet;

/// Summary statistics for a scanned tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Total number of files.
    pub file_count: u64,
    /// Total number of directories, the root included.
    pub dir_count: u64,
    /// Total size of all files in bytes.
    pub total_size: u64,
}

impl TreeStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a file entry.
    pub fn record_file(&mut self, size: u64) {
        self.file_count += 1;
        self.total_size += size;
    }

    /// Record a directory.
    pub fn record_dir(&mut self) {
        self.dir_count += 1;
    }

    /// Count a tree depth-first.
    pub fn from_tree(root: &FileNode) -> Self {
        let mut stats = Self::new();
        for node in root.walk() {
            if node.is_dir() {
                stats.record_dir();
            } else {
                stats.record_file(node.size());
            }
        }
        stats
    }
}

/// Complete scanned file tree with metadata.
#[derive(Debug, Clone)]
pub struct FileTree {
    /// Root node of the tree.
    pub root: FileNode,

    /// Canonical root path that was scanned.
    pub root_path: PathBuf,

    /// Duration of the scan.
    pub scan_duration: Duration,

    /// Patterns that were applied.
    pub ignore_patterns: IgnoreSet,

    /// Summary statistics.
    pub stats: TreeStats,

    /// Warnings encountered during scan.
    pub warnings: Vec<ScanWarning>,
}

impl FileTree {
    /// Create a new file tree.
    pub fn new(
        root: FileNode,
        root_path: PathBuf,
        ignore_patterns: IgnoreSet,
        stats: TreeStats,
        scan_duration: Duration,
        warnings: Vec<ScanWarning>,
    ) -> Self {
        Self {
            root,
            root_path,
            scan_duration,
            ignore_patterns,
            stats,
            warnings,
        }
    }

    /// Get the total size of the tree.
    pub fn total_size(&self) -> u64 {
        self.stats.total_size
    }

    /// Get the total number of files.
    pub fn total_files(&self) -> u64 {
        self.stats.file_count
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn test_tree_stats_default() {
        let stats = TreeStats::default();
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.dir_count, 0);
    }

    #[test]
    fn test_tree_stats_from_tree_counts_root() {
        let now = SystemTime::now();
        let sub = FileNode::new_directory(
            "/proj/sub",
            now,
            vec![FileNode::new_file("/proj/sub/b.py", 20, now)],
        );
        let root = FileNode::new_directory(
            "/proj",
            now,
            vec![FileNode::new_file("/proj/a.py", 10, now), sub],
        );

        let stats = TreeStats::from_tree(&root);
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.dir_count, 2);
        assert_eq!(stats.total_size, 30);
        // Root-derived counts agree with the walk.
        assert_eq!(stats.file_count, root.file_count());
        assert_eq!(stats.dir_count, root.dir_count() + 1);
    }
}
