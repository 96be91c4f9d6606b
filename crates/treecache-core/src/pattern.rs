//! Name-based ignore patterns.
//!
//! Patterns are matched against a single entry name, never a full path:
//!
//! - `*suffix` matches names ending with `suffix`
//! - `prefix*` matches names starting with `prefix`
//! - anything else matches when it occurs anywhere in the name
//!
//! The leading-`*` rule wins when a pattern has both, so `*foo*` matches names
//! ending with the literal text `foo*`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// A validated ignore pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IgnorePattern {
    raw: String,
}

impl IgnorePattern {
    /// Parse and validate a pattern.
    pub fn parse(raw: &str) -> Result<Self, ScanError> {
        if raw.is_empty() {
            return Err(ScanError::invalid_pattern(raw, "pattern is empty"));
        }
        if raw.chars().all(|c| c == '*') {
            return Err(ScanError::invalid_pattern(
                raw,
                "pattern would match every entry",
            ));
        }
        if raw.contains(['/', '\\']) {
            return Err(ScanError::invalid_pattern(
                raw,
                "patterns match entry names and cannot contain path separators",
            ));
        }
        if raw.contains('\0') {
            return Err(ScanError::invalid_pattern(raw, "pattern contains NUL"));
        }
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// The pattern text as given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Check whether an entry name matches this pattern.
    pub fn matches(&self, name: &str) -> bool {
        if let Some(suffix) = self.raw.strip_prefix('*') {
            name.ends_with(suffix)
        } else if let Some(prefix) = self.raw.strip_suffix('*') {
            name.starts_with(prefix)
        } else {
            name.contains(self.raw.as_str())
        }
    }
}

impl fmt::Display for IgnorePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for IgnorePattern {
    type Error = ScanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IgnorePattern> for String {
    fn from(pattern: IgnorePattern) -> Self {
        pattern.raw
    }
}

/// An ordered collection of validated ignore patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IgnoreSet {
    patterns: Vec<IgnorePattern>,
}

impl IgnoreSet {
    /// An empty set that ignores nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate every pattern, failing on the first malformed one.
    pub fn parse<I, S>(patterns: I) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| IgnorePattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Check if a name is matched by any pattern.
    pub fn is_ignored(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }

    /// Iterate over the patterns in the order they were given.
    pub fn iter(&self) -> impl Iterator<Item = &IgnorePattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Patterns used when a caller does not supply any: version-control metadata,
/// dependency and virtual-environment directories, tool caches and compiled
/// object files.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    "node_modules",
    ".venv",
    "venv",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    "*.pyc",
    "*.pyo",
    "*.o",
    "*.class",
];
