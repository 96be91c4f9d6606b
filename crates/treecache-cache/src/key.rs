//! Cache keys.

use std::fmt;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use treecache_core::IgnoreSet;

/// Digest identifying one (root, pattern set) combination.
///
/// Rendered as 64 lowercase hex characters, which also names the record file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Compute the key for a resolved root and a normalized pattern list.
    ///
    /// `patterns` is expected to come from [`normalize_patterns`].
    pub fn compute(root: &Path, patterns: &[String]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"treecache-key\0");

        let root_bytes = root.as_os_str().as_encoded_bytes();
        hasher.update(&(root_bytes.len() as u64).to_le_bytes());
        hasher.update(root_bytes);

        hasher.update(&(patterns.len() as u64).to_le_bytes());
        for pattern in patterns {
            hasher.update(&(pattern.len() as u64).to_le_bytes());
            hasher.update(pattern.as_bytes());
        }

        Self(hasher.finalize().to_hex().to_string())
    }

    /// Recover a key from a record file stem, if it looks like one.
    pub fn from_hex(hex: &str) -> Option<Self> {
        (hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
            .then(|| Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sorted, de-duplicated pattern text, so that order never changes a key.
pub fn normalize_patterns(patterns: &IgnoreSet) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.as_str().to_string())
        .sorted()
        .dedup()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(root: &str, patterns: &[&str]) -> CacheKey {
        let set = IgnoreSet::parse(patterns).unwrap();
        CacheKey::compute(Path::new(root), &normalize_patterns(&set))
    }

    #[test]
    fn test_pattern_order_does_not_matter() {
        assert_eq!(
            key("/proj", &["*.pyc", "node_modules"]),
            key("/proj", &["node_modules", "*.pyc"])
        );
        assert_eq!(key("/proj", &["a", "a"]), key("/proj", &["a"]));
    }

    #[test]
    fn test_root_and_patterns_distinguish_keys() {
        assert_ne!(key("/proj", &[]), key("/other", &[]));
        assert_ne!(key("/proj", &[]), key("/proj", &["*.pyc"]));
        // Length prefixes keep field boundaries unambiguous.
        assert_ne!(key("/proj", &["ab", "c"]), key("/proj", &["a", "bc"]));
    }

    #[test]
    fn test_hex_round_trip() {
        let k = key("/proj", &["x"]);
        assert_eq!(k.as_str().len(), 64);
        assert_eq!(CacheKey::from_hex(k.as_str()), Some(k));
        assert_eq!(CacheKey::from_hex("not-a-key"), None);
    }
}
