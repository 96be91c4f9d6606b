//! Two-tier cache of scanned project trees.
//!
//! [`TreeCache`] answers "what does the tree under this root look like?"
//! from a bounded in-process LRU tier, then from versioned JSON records on
//! disk, and only scans when neither holds a fresh answer.
//!
//! # Overview
//!
//! - **Keys**: a digest of the canonical root and the sorted pattern set, so
//!   pattern order never causes a miss
//! - **Freshness**: entries older than the lookup TTL, or whose root has
//!   vanished, are never served
//! - **Invalidation**: removes entries at, above, or below a path in both
//!   tiers
//! - **Maintenance**: [`TreeCache::sweep`] drops expired entries;
//!   [`MaintenanceHandle`] runs it periodically on tokio
//!
//! # Example
//!
//! ```rust,no_run
//! use treecache_cache::{CacheConfig, TreeCache};
//!
//! let cache = TreeCache::new(CacheConfig::default()).unwrap();
//! let (tree, meta) = cache.get_tree("/path/to/project", None, false).unwrap();
//! println!("{} files via {}", tree.file_count(), meta.source);
//! ```

mod config;
mod disk;
mod entry;
mod error;
mod key;
mod maintenance;
mod stats;
mod store;

pub use config::{
    CacheConfig, CacheConfigBuilder, DEFAULT_DISK_TTL, DEFAULT_LOOKUP_TTL, DEFAULT_MAX_ENTRIES,
    DEFAULT_MEMORY_TTL, DEFAULT_SWEEP_INTERVAL, default_cache_dir,
};
pub use disk::{RECORD_EXTENSION, SCHEMA_VERSION};
pub use entry::{CacheEntry, CacheEntryMetadata, CacheSource};
pub use error::CacheError;
pub use key::{CacheKey, normalize_patterns};
pub use maintenance::{MaintenanceHandle, SweepReport};
pub use stats::CacheStats;
pub use store::{CachedTree, TreeCache};

// Re-export core types for convenience
pub use treecache_core::{FileNode, IgnoreSet, NodeKind, ScanError, StructuralHash};
