//! Cached scan results.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use treecache_core::{FileNode, FileTree};

use crate::config::secs;
use crate::key::CacheKey;

/// Where a `get_tree` result came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum CacheSource {
    /// Served from the in-process tier.
    Memory,
    /// Loaded from a disk record and promoted into memory.
    #[default]
    Disk,
    /// Freshly scanned.
    Scan,
}

/// Everything about a cached scan except the tree itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntryMetadata {
    pub key: CacheKey,
    /// Canonical root path that was scanned.
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    /// Updated on every hit.
    pub last_access: DateTime<Utc>,
    #[serde(with = "secs")]
    pub scan_duration: Duration,
    pub file_count: u64,
    /// Directories in the tree, the root included.
    pub dir_count: u64,
    /// Total bytes of all files.
    pub total_size: u64,
    /// Sorted, de-duplicated patterns the scan applied.
    pub ignore_patterns: Vec<String>,
    /// Non-fatal problems recorded during the scan.
    pub warning_count: usize,
    /// Estimated memory held by the tree.
    pub memory_bytes: u64,
    /// How this result was served; not persisted.
    #[serde(skip)]
    pub source: CacheSource,
}

/// One cached scan result: an owned tree plus its metadata.
///
/// Apart from `last_access` and the LRU sequence number, an entry never
/// changes after it is built.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    meta: CacheEntryMetadata,
    tree: Arc<FileNode>,
    /// Tie-breaker for LRU ordering when timestamps collide.
    access_seq: u64,
}

impl CacheEntry {
    /// Wrap a finished scan.
    pub fn from_scan(
        key: CacheKey,
        scan: FileTree,
        ignore_patterns: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let meta = CacheEntryMetadata {
            key,
            root: scan.root_path,
            created_at: now,
            last_access: now,
            scan_duration: scan.scan_duration,
            file_count: scan.stats.file_count,
            dir_count: scan.stats.dir_count,
            total_size: scan.stats.total_size,
            ignore_patterns,
            warning_count: scan.warnings.len(),
            memory_bytes: scan.root.estimated_footprint(),
            source: CacheSource::Scan,
        };
        Self {
            meta,
            tree: Arc::new(scan.root),
            access_seq: 0,
        }
    }

    /// Reassemble an entry read back from disk.
    pub(crate) fn from_parts(mut meta: CacheEntryMetadata, tree: FileNode) -> Self {
        meta.source = CacheSource::Disk;
        meta.memory_bytes = tree.estimated_footprint();
        Self {
            meta,
            tree: Arc::new(tree),
            access_seq: 0,
        }
    }

    pub fn metadata(&self) -> &CacheEntryMetadata {
        &self.meta
    }

    pub fn tree(&self) -> &Arc<FileNode> {
        &self.tree
    }

    pub fn key(&self) -> &CacheKey {
        &self.meta.key
    }

    pub fn root(&self) -> &Path {
        &self.meta.root
    }

    /// Time since the scan, zero if the clock went backwards.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.meta.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the entry may answer a lookup: young enough and root still on disk.
    pub fn is_servable(&self, now: DateTime<Utc>, lookup_ttl: Duration) -> bool {
        self.age(now) <= lookup_ttl && self.meta.root.exists()
    }

    /// LRU ordering key; smaller means less recently used.
    pub(crate) fn recency(&self) -> (DateTime<Utc>, u64) {
        (self.meta.last_access, self.access_seq)
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>, seq: u64) {
        self.meta.last_access = now;
        self.access_seq = seq;
    }

    /// Hand out the shared tree and a metadata copy tagged with `source`.
    pub(crate) fn snapshot(&self, source: CacheSource) -> (Arc<FileNode>, CacheEntryMetadata) {
        let mut meta = self.meta.clone();
        meta.source = source;
        (Arc::clone(&self.tree), meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;
    use treecache_core::{IgnoreSet, TreeStats};

    fn entry(root: &Path, now: DateTime<Utc>) -> CacheEntry {
        let node = FileNode::new_directory(
            root,
            SystemTime::now(),
            vec![FileNode::new_file(root.join("a.py"), 10, SystemTime::now())],
        );
        let stats = TreeStats::from_tree(&node);
        let scan = FileTree::new(
            node,
            root.to_path_buf(),
            IgnoreSet::empty(),
            stats,
            Duration::from_millis(3),
            Vec::new(),
        );
        CacheEntry::from_scan(CacheKey::compute(root, &[]), scan, Vec::new(), now)
    }

    #[test]
    fn test_from_scan_copies_counters() {
        let dir = tempfile::TempDir::new().unwrap();
        let e = entry(dir.path(), Utc::now());
        let meta = e.metadata();
        assert_eq!(meta.file_count, 1);
        assert_eq!(meta.dir_count, 1);
        assert_eq!(meta.total_size, 10);
        assert_eq!(meta.source, CacheSource::Scan);
        assert!(meta.memory_bytes > 0);
    }

    #[test]
    fn test_servable_window() {
        let dir = tempfile::TempDir::new().unwrap();
        let created = Utc::now();
        let e = entry(dir.path(), created);

        let ttl = Duration::from_secs(300);
        assert!(e.is_servable(created, ttl));
        assert!(e.is_servable(created + chrono::Duration::seconds(300), ttl));
        assert!(!e.is_servable(created + chrono::Duration::seconds(301), ttl));
    }

    #[test]
    fn test_missing_root_is_not_servable() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("gone");
        let e = entry(&root, Utc::now());
        assert!(!e.is_servable(Utc::now(), Duration::from_secs(300)));
    }

    #[test]
    fn test_touch_updates_recency() {
        let dir = tempfile::TempDir::new().unwrap();
        let now = Utc::now();
        let mut e = entry(dir.path(), now);
        let before = e.recency();
        e.touch(now, 7);
        assert!(e.recency() > before);
        assert_eq!(e.metadata().last_access, now);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(CacheSource::Memory.to_string(), "memory");
        assert_eq!(CacheSource::Scan.to_string(), "scan");
    }
}
