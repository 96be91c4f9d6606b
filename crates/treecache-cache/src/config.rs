//! Cache policy configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use treecache_core::DEFAULT_IGNORE_PATTERNS;

use crate::error::CacheError;

/// How long an entry may serve lookups without a rescan.
pub const DEFAULT_LOOKUP_TTL: Duration = Duration::from_secs(5 * 60);
/// Age after which the maintenance sweep drops a memory entry.
pub const DEFAULT_MEMORY_TTL: Duration = Duration::from_secs(30 * 60);
/// Age after which the maintenance sweep deletes a disk record.
pub const DEFAULT_DISK_TTL: Duration = Duration::from_secs(24 * 60 * 60);
/// Capacity of the memory tier.
pub const DEFAULT_MAX_ENTRIES: usize = 100;
/// Period of the maintenance task.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Policy knobs for a [`TreeCache`](crate::TreeCache).
///
/// Durations are written as (fractional) seconds in JSON.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding disk records.
    #[builder(default = "default_cache_dir()")]
    pub cache_dir: PathBuf,

    /// Maximum age at which an entry is still served by a lookup.
    #[builder(default = "DEFAULT_LOOKUP_TTL")]
    #[serde(with = "secs")]
    pub lookup_ttl: Duration,

    /// Maximum age before the sweep removes a memory entry.
    #[builder(default = "DEFAULT_MEMORY_TTL")]
    #[serde(with = "secs")]
    pub memory_ttl: Duration,

    /// Maximum record file age before the sweep deletes it.
    #[builder(default = "DEFAULT_DISK_TTL")]
    #[serde(with = "secs")]
    pub disk_ttl: Duration,

    /// Maximum number of entries in the memory tier.
    #[builder(default = "DEFAULT_MAX_ENTRIES")]
    pub max_entries: usize,

    /// Period of the background maintenance task.
    #[builder(default = "DEFAULT_SWEEP_INTERVAL")]
    #[serde(with = "secs")]
    pub sweep_interval: Duration,

    /// Patterns applied when `get_tree` is called without any.
    #[builder(default = "default_ignore_patterns()")]
    pub default_ignore_patterns: Vec<String>,

    /// Scanner threads (0 = rayon default pool, 1 = serial).
    #[builder(default = "0")]
    pub scan_threads: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            lookup_ttl: DEFAULT_LOOKUP_TTL,
            memory_ttl: DEFAULT_MEMORY_TTL,
            disk_ttl: DEFAULT_DISK_TTL,
            max_entries: DEFAULT_MAX_ENTRIES,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            default_ignore_patterns: default_ignore_patterns(),
            scan_threads: 0,
        }
    }
}

impl CacheConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_entries == Some(0) {
            return Err("max_entries must be at least 1".to_string());
        }
        if self.sweep_interval == Some(Duration::ZERO) {
            return Err("sweep_interval must be positive".to_string());
        }
        if let Some(ref dir) = self.cache_dir
            && dir.as_os_str().is_empty()
        {
            return Err("cache_dir cannot be empty".to_string());
        }
        Ok(())
    }
}

impl CacheConfig {
    /// Create a new cache config builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Defaults with records kept under `cache_dir`.
    pub fn with_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..Self::default()
        }
    }

    /// Load overrides from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| CacheError::InvalidConfig {
            message: format!("{}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that the builder enforces, for configs built by hand.
    pub fn validate(&self) -> Result<(), CacheError> {
        let invalid = |message: &str| CacheError::InvalidConfig {
            message: message.to_string(),
        };
        if self.max_entries == 0 {
            return Err(invalid("max_entries must be at least 1"));
        }
        if self.sweep_interval.is_zero() {
            return Err(invalid("sweep_interval must be positive"));
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err(invalid("cache_dir cannot be empty"));
        }
        Ok(())
    }
}

/// Platform cache directory, or a folder in the system temp dir.
pub fn default_cache_dir() -> PathBuf {
    ProjectDirs::from("", "", "treecache")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("treecache"))
}

fn default_ignore_patterns() -> Vec<String> {
    DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect()
}

/// Serde adapter writing a [`Duration`] as fractional seconds.
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
