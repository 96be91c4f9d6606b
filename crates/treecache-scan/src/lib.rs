//! Directory scanning engine for treecache.
//!
//! This crate walks a project root with jwalk and builds an owned
//! [`FileNode`] tree plus aggregate counters.
//!
//! # Overview
//!
//! - **Pruned traversal**: directories matched by an ignore pattern are
//!   dropped from their parent's listing and never read
//! - **Deterministic output**: children are ordered directories-first, then
//!   by name, whatever order the walk produced them in
//! - **Local failures**: an unreadable directory becomes an inaccessible,
//!   childless node plus a [`ScanWarning`]; the scan carries on
//!
//! # Example
//!
//! ```rust,no_run
//! use treecache_scan::{IgnoreSet, ScanConfig, TreeScanner};
//!
//! let config = ScanConfig::builder()
//!     .root("/path/to/project")
//!     .ignore_patterns(IgnoreSet::parse(["*.pyc", "node_modules"]).unwrap())
//!     .build()
//!     .unwrap();
//! let tree = TreeScanner::new().scan(&config).unwrap();
//!
//! println!("Total size: {} bytes", tree.total_size());
//! println!("Total files: {}", tree.total_files());
//! ```

mod scanner;

pub use scanner::TreeScanner;

// Re-export core types for convenience
pub use treecache_core::{
    FileNode, FileTree, IgnoreSet, NodeKind, ScanConfig, ScanError, ScanWarning, TreeStats,
    WarningKind,
};
