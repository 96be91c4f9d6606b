//! Error types for cache operations.

use std::path::PathBuf;

use thiserror::Error;
use treecache_core::ScanError;

/// Errors that can occur in the cache store.
///
/// Only [`CacheError::Scan`] and [`CacheError::InvalidConfig`] ever reach a
/// `get_tree` caller. Record corruption and persist failures are recovered
/// inside the store and logged.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Scanning failed, or the request was rejected before scanning.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// An on-disk record could not be decoded or failed validation.
    #[error("Corrupt cache record {path}: {reason}")]
    CorruptRecord { path: PathBuf, reason: String },

    /// Writing a record to the cache directory failed.
    #[error("Failed to persist cache record {path}: {source}")]
    PersistWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Other I/O failure in the cache directory.
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration was rejected.
    #[error("Invalid cache configuration: {message}")]
    InvalidConfig { message: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means a disk record should be discarded.
    pub fn is_corrupt_record(&self) -> bool {
        matches!(self, Self::CorruptRecord { .. })
    }
}
