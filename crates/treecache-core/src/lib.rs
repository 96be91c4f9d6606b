//! Core types for treecache.
//!
//! This crate provides the data structures shared by the scanner and the
//! cache: immutable file nodes with structural hashes, name-based ignore
//! patterns, scan configuration and the error taxonomy.

mod config;
mod error;
mod node;
mod pattern;
mod tree;

pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use node::{FileNode, NodeKind, StructuralHash, Walk};
pub use pattern::{DEFAULT_IGNORE_PATTERNS, IgnorePattern, IgnoreSet};
pub use tree::{FileTree, TreeStats};
