//! Two-tier tree cache.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use treecache_core::{FileNode, IgnoreSet, ScanConfig, ScanError};
use treecache_scan::TreeScanner;

use crate::config::CacheConfig;
use crate::disk::DiskTier;
use crate::entry::{CacheEntry, CacheEntryMetadata, CacheSource};
use crate::error::CacheError;
use crate::key::{CacheKey, normalize_patterns};
use crate::stats::{CacheStats, Counters, hit_rate};

/// A scanned tree shared with the cache, plus its metadata.
pub type CachedTree = (Arc<FileNode>, CacheEntryMetadata);

/// In-process tier: a bounded map with LRU eviction.
#[derive(Debug, Default)]
pub(crate) struct MemoryTier {
    pub(crate) entries: HashMap<CacheKey, CacheEntry>,
    next_seq: u64,
}

impl MemoryTier {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Insert, evicting the least recently used entry first when full.
    /// Returns the evicted key, if any.
    fn insert(&mut self, mut entry: CacheEntry, now: DateTime<Utc>, capacity: usize) -> Option<CacheKey> {
        let seq = self.next_seq();
        entry.touch(now, seq);

        let mut evicted = None;
        if !self.entries.contains_key(entry.key()) && self.entries.len() >= capacity {
            evicted = self
                .entries
                .values()
                .min_by_key(|e| e.recency())
                .map(|e| e.key().clone());
            if let Some(key) = &evicted {
                self.entries.remove(key);
            }
        }

        self.entries.insert(entry.key().clone(), entry);
        evicted
    }

    fn bytes(&self) -> u64 {
        self.entries.values().map(|e| e.metadata().memory_bytes).sum()
    }
}

/// Cache of scanned project trees with a memory tier and a disk tier.
///
/// Construct one per process and share it behind an [`Arc`]. All operations
/// take `&self`; the memory tier sits behind a single mutex that is never
/// held while scanning.
///
/// Two callers missing the same cold key at the same time will both scan and
/// both insert; the later insert wins. Misses are not coalesced.
#[derive(Debug)]
pub struct TreeCache {
    config: CacheConfig,
    default_patterns: IgnoreSet,
    scanner: TreeScanner,
    pub(crate) memory: Mutex<MemoryTier>,
    pub(crate) disk: DiskTier,
    counters: Counters,
}

impl TreeCache {
    /// Create a cache, creating the cache directory if it does not exist.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        config.validate()?;
        let default_patterns = IgnoreSet::parse(&config.default_ignore_patterns)?;
        let disk = DiskTier::open(&config.cache_dir)?;
        Ok(Self {
            config,
            default_patterns,
            scanner: TreeScanner::new(),
            memory: Mutex::new(MemoryTier::default()),
            disk,
            counters: Counters::default(),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Directory holding the disk records.
    pub fn cache_dir(&self) -> &Path {
        self.disk.dir()
    }

    /// Get the tree for `root`, from memory, disk, or a fresh scan.
    ///
    /// `ignore_patterns` of `None` applies the configured defaults. Patterns
    /// are validated and the root resolved before anything is looked up, so
    /// malformed patterns and missing roots fail without touching the cache.
    pub fn get_tree(
        &self,
        root: impl AsRef<Path>,
        ignore_patterns: Option<&[String]>,
        force_refresh: bool,
    ) -> Result<CachedTree, CacheError> {
        let patterns = match ignore_patterns {
            Some(patterns) => IgnoreSet::parse(patterns)?,
            None => self.default_patterns.clone(),
        };
        let root = resolve_root(root.as_ref())?;
        let normalized = normalize_patterns(&patterns);
        let key = CacheKey::compute(&root, &normalized);

        if !force_refresh {
            if let Some(hit) = self.lookup_memory(&key) {
                self.counters.record_hit();
                tracing::debug!(target: "treecache::store", root = %root.display(), %key, "memory hit");
                return Ok(hit);
            }
            if let Some(hit) = self.lookup_disk(&key) {
                self.counters.record_hit();
                tracing::debug!(target: "treecache::store", root = %root.display(), %key, "disk hit, promoted");
                return Ok(hit);
            }
        }

        self.counters.record_miss();
        tracing::info!(
            target: "treecache::store",
            root = %root.display(),
            force_refresh,
            "scanning"
        );

        let config = ScanConfig {
            root,
            ignore_patterns: patterns,
            threads: self.config.scan_threads,
        };
        let scan = self.scanner.scan(&config)?;
        for warning in &scan.warnings {
            tracing::warn!(
                target: "treecache::store",
                path = %warning.path.display(),
                kind = ?warning.kind,
                "{}",
                warning.message
            );
        }

        let entry = CacheEntry::from_scan(key, scan, normalized, Utc::now());
        if let Err(err) = self.disk.store(&entry) {
            tracing::warn!(target: "treecache::store", error = %err, "keeping entry in memory only");
        }
        Ok(self.insert_memory(entry, CacheSource::Scan))
    }

    fn lookup_memory(&self, key: &CacheKey) -> Option<CachedTree> {
        let now = Utc::now();
        let mut memory = self.memory();
        let seq = memory.next_seq();
        let entry = memory.entries.get_mut(key)?;
        if !entry.is_servable(now, self.config.lookup_ttl) {
            return None;
        }
        entry.touch(now, seq);
        Some(entry.snapshot(CacheSource::Memory))
    }

    fn lookup_disk(&self, key: &CacheKey) -> Option<CachedTree> {
        let entry = match self.disk.load(key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) if err.is_corrupt_record() => {
                tracing::warn!(target: "treecache::store", error = %err, "discarding corrupt record");
                if let Err(err) = self.disk.remove(key) {
                    tracing::warn!(target: "treecache::store", error = %err, "failed to delete corrupt record");
                }
                return None;
            }
            Err(err) => {
                tracing::warn!(target: "treecache::store", error = %err, "disk lookup failed");
                return None;
            }
        };

        if !entry.is_servable(Utc::now(), self.config.lookup_ttl) {
            return None;
        }
        Some(self.insert_memory(entry, CacheSource::Disk))
    }

    fn insert_memory(&self, entry: CacheEntry, source: CacheSource) -> CachedTree {
        let result = entry.snapshot(source);
        if let Some(evicted) = self.memory().insert(entry, Utc::now(), self.config.max_entries) {
            self.counters.record_eviction();
            tracing::debug!(target: "treecache::store", key = %evicted, "evicted least recently used entry");
        }
        result
    }

    /// Remove every entry, in both tiers, rooted at `path`, above it or below it.
    ///
    /// Returns the number of distinct entries removed; zero is not an error.
    pub fn invalidate(&self, path: impl AsRef<Path>) -> usize {
        let target = normalize_path(path.as_ref());
        let related = |root: &Path| root.starts_with(&target) || target.starts_with(root);

        let mut removed: HashSet<CacheKey> = {
            let mut memory = self.memory();
            let keys: Vec<CacheKey> = memory
                .entries
                .values()
                .filter(|e| related(e.root()))
                .map(|e| e.key().clone())
                .collect();
            for key in &keys {
                memory.entries.remove(key);
            }
            keys.into_iter().collect()
        };

        match self.disk.remove_where(related) {
            Ok(keys) => removed.extend(keys),
            Err(err) => {
                tracing::warn!(target: "treecache::store", error = %err, "disk invalidation incomplete");
            }
        }

        tracing::debug!(
            target: "treecache::store",
            path = %target.display(),
            removed = removed.len(),
            "invalidated"
        );
        removed.len()
    }

    /// Snapshot of counters and tier sizes.
    pub fn get_stats(&self) -> CacheStats {
        let (memory_entries, memory_bytes) = {
            let memory = self.memory();
            (memory.entries.len(), memory.bytes())
        };
        let (hits, misses, evictions) = self.counters.load();
        let disk_entries = self.disk.count().unwrap_or_else(|err| {
            tracing::warn!(target: "treecache::store", error = %err, "could not count disk records");
            0
        });

        CacheStats {
            memory_entries,
            memory_bytes,
            hits,
            misses,
            hit_rate: hit_rate(hits, misses),
            evictions,
            disk_entries,
        }
    }

    /// Empty both tiers.
    ///
    /// The memory tier is always emptied; an error reports a disk record
    /// that could not be deleted.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.memory().entries.clear();
        let removed = self.disk.clear()?;
        tracing::info!(target: "treecache::store", disk_removed = removed, "cache cleared");
        Ok(())
    }

    pub(crate) fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Canonicalize a scan root, surfacing missing or non-directory roots.
fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let resolved = root.canonicalize().map_err(|e| ScanError::root(root, e))?;
    if !resolved.is_dir() {
        return Err(ScanError::NotADirectory { path: resolved });
    }
    Ok(resolved)
}

/// Best-effort absolute form of a path that may no longer exist.
fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
