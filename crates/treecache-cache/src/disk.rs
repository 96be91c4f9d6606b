//! On-disk record tier.
//!
//! Each cached entry is one JSON document in the cache directory:
//!
//! ```text
//! <key>.tree.json
//! {
//!   "schema_version": 1,
//!   "key": "<64 hex chars>",
//!   "meta": { "root": ..., "created_at": ..., ... },
//!   "tree": { "path": ..., "name": ..., "kind": { "type": "directory", ... }, ... }
//! }
//! ```
//!
//! Records are written to a temporary file in the same directory and then
//! renamed into place, so a reader sees either the old or the new record.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use treecache_core::{FileNode, TreeStats};

use crate::entry::{CacheEntry, CacheEntryMetadata};
use crate::error::CacheError;
use crate::key::CacheKey;

/// Current record format version - increment when the layout changes.
pub const SCHEMA_VERSION: u32 = 1;

/// Suffix shared by every record file.
pub const RECORD_EXTENSION: &str = ".tree.json";

/// Prefix of in-flight temporary files.
const TEMP_PREFIX: &str = ".treecache-";

#[derive(Serialize)]
struct RecordRef<'a> {
    schema_version: u32,
    key: &'a CacheKey,
    meta: &'a CacheEntryMetadata,
    tree: &'a FileNode,
}

#[derive(Deserialize)]
struct Record {
    schema_version: u32,
    key: CacheKey,
    meta: CacheEntryMetadata,
    tree: FileNode,
}

/// Just enough of a record to decide whether `invalidate` applies.
#[derive(Deserialize)]
struct RecordHeader {
    schema_version: u32,
    meta: HeaderMeta,
}

#[derive(Deserialize)]
struct HeaderMeta {
    root: PathBuf,
}

/// The set of record files under one cache directory.
#[derive(Debug)]
pub(crate) struct DiskTier {
    dir: PathBuf,
}

impl DiskTier {
    /// Use `dir` for records, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}{RECORD_EXTENSION}"))
    }

    /// Read the record for `key`; `Ok(None)` when there is none.
    pub fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.record_path(key);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };

        let record: Record = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| CacheError::corrupt(&path, e.to_string()))?;
        validate(&path, key, &record)?;

        Ok(Some(CacheEntry::from_parts(record.meta, record.tree)))
    }

    /// Write (or replace) the record for an entry.
    pub fn store(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.record_path(entry.key());
        let persist_failed = |source: std::io::Error| CacheError::PersistWriteFailed {
            path: path.clone(),
            source,
        };

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(persist_failed)?;

        let record = RecordRef {
            schema_version: SCHEMA_VERSION,
            key: entry.key(),
            meta: entry.metadata(),
            tree: entry.tree().as_ref(),
        };
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, &record)
                .map_err(|e| persist_failed(e.into()))?;
            writer.flush().map_err(persist_failed)?;
        }
        temp.as_file().sync_all().map_err(persist_failed)?;
        temp.persist(&path).map_err(|e| persist_failed(e.error))?;
        Ok(())
    }

    /// Delete the record for `key`. Returns whether one existed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool, CacheError> {
        remove_file(&self.record_path(key))
    }

    /// Every record file currently in the directory.
    pub fn record_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };
        Ok(entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| record_key(path).is_some())
            .collect())
    }

    pub fn count(&self) -> Result<usize, CacheError> {
        Ok(self.record_files()?.len())
    }

    /// Delete every record whose root satisfies `related`.
    ///
    /// Unreadable records are deleted too. A record that cannot be deleted is
    /// logged and skipped. Returns the keys removed.
    pub fn remove_where<F>(&self, related: F) -> Result<Vec<CacheKey>, CacheError>
    where
        F: Fn(&Path) -> bool,
    {
        let mut removed = Vec::new();
        for path in self.record_files()? {
            let Some(key) = record_key(&path) else {
                continue;
            };
            let matches = match read_header_root(&path) {
                Ok(root) => related(&root),
                Err(err) => {
                    tracing::warn!(target: "treecache::disk", error = %err, "discarding unreadable record");
                    true
                }
            };
            if matches && discard(&path) {
                removed.push(key);
            }
        }
        Ok(removed)
    }

    /// Delete every record and leftover temporary file. Returns records removed.
    ///
    /// Every file is attempted; the first record that could not be deleted is
    /// reported once the directory has been gone through.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        let mut failure = None;
        for path in self.record_files()? {
            match remove_file(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(target: "treecache::disk", error = %err, "could not delete record");
                    failure.get_or_insert(err);
                }
            }
        }
        for path in self.temp_files()? {
            discard(&path);
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Delete records (and abandoned temp files) whose file mtime is older
    /// than `max_age`. Returns records removed.
    pub fn sweep_expired(&self, max_age: Duration) -> Result<usize, CacheError> {
        let now = SystemTime::now();
        let expired = |path: &Path| {
            fs::metadata(path)
                .and_then(|m| m.modified())
                .map(|mtime| now.duration_since(mtime).unwrap_or(Duration::ZERO) > max_age)
                .unwrap_or(false)
        };

        let mut removed = 0;
        for path in self.record_files()? {
            if expired(&path) && discard(&path) {
                removed += 1;
            }
        }
        for path in self.temp_files()? {
            if expired(&path) {
                discard(&path);
            }
        }
        Ok(removed)
    }

    fn temp_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.dir, e)),
        };
        Ok(entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(TEMP_PREFIX))
            })
            .collect())
    }
}

/// Key encoded in a record file name, if the name is a record's.
fn record_key(path: &Path) -> Option<CacheKey> {
    let name = path.file_name()?.to_str()?;
    CacheKey::from_hex(name.strip_suffix(RECORD_EXTENSION)?)
}

fn read_header_root(path: &Path) -> Result<PathBuf, CacheError> {
    let file = File::open(path).map_err(|e| CacheError::io(path, e))?;
    let header: RecordHeader = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| CacheError::corrupt(path, e.to_string()))?;
    if header.schema_version != SCHEMA_VERSION {
        return Err(CacheError::corrupt(
            path,
            format!("schema version {}", header.schema_version),
        ));
    }
    Ok(header.meta.root)
}

/// Reject records that parsed but cannot be trusted.
fn validate(path: &Path, key: &CacheKey, record: &Record) -> Result<(), CacheError> {
    if record.schema_version != SCHEMA_VERSION {
        return Err(CacheError::corrupt(
            path,
            format!(
                "schema version mismatch: expected {SCHEMA_VERSION}, got {}",
                record.schema_version
            ),
        ));
    }
    if record.key != *key || record.meta.key != *key {
        return Err(CacheError::corrupt(path, "key does not match file name"));
    }
    if record.tree.path() != record.meta.root.as_path() {
        return Err(CacheError::corrupt(path, "tree root does not match metadata"));
    }

    if !record.tree.has_consistent_totals() {
        return Err(CacheError::corrupt(path, "directory totals disagree with children"));
    }

    let counted = TreeStats::from_tree(&record.tree);
    if counted.file_count != record.meta.file_count
        || counted.dir_count != record.meta.dir_count
        || counted.total_size != record.meta.total_size
    {
        return Err(CacheError::corrupt(path, "counters disagree with tree"));
    }
    Ok(())
}

/// Delete `path`, logging a failure instead of returning it.
fn discard(path: &Path) -> bool {
    remove_file(path).unwrap_or_else(|err| {
        tracing::warn!(target: "treecache::disk", error = %err, "could not delete file");
        false
    })
}

fn remove_file(path: &Path) -> Result<bool, CacheError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;
    use treecache_core::{FileTree, IgnoreSet};

    fn sample_entry(root: &Path) -> CacheEntry {
        let now = SystemTime::now();
        let sub = FileNode::new_directory(
            root.join("sub"),
            now,
            vec![FileNode::new_file(root.join("sub/b.py"), 20, now)],
        );
        let node = FileNode::new_directory(
            root,
            now,
            vec![FileNode::new_file(root.join("a.py"), 10, now), sub],
        );
        let stats = TreeStats::from_tree(&node);
        let scan = FileTree::new(
            node,
            root.to_path_buf(),
            IgnoreSet::empty(),
            stats,
            Duration::from_millis(1),
            Vec::new(),
        );
        let patterns = vec!["*.pyc".to_string()];
        CacheEntry::from_scan(CacheKey::compute(root, &patterns), scan, patterns, Utc::now())
    }

    #[test]
    fn test_store_and_load() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path().join("cache")).unwrap();
        let entry = sample_entry(Path::new("/proj"));

        disk.store(&entry).unwrap();
        assert_eq!(disk.count().unwrap(), 1);
        assert!(disk.record_path(entry.key()).to_string_lossy().ends_with(".tree.json"));

        let loaded = disk.load(entry.key()).unwrap().unwrap();
        assert_eq!(loaded.tree(), entry.tree());
        assert_eq!(loaded.metadata().file_count, 2);
        assert_eq!(loaded.metadata().ignore_patterns, vec!["*.pyc".to_string()]);
        assert_eq!(
            loaded.tree().structural_hash(),
            entry.tree().structural_hash()
        );
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path()).unwrap();
        let key = CacheKey::compute(Path::new("/nothing"), &[]);
        assert!(disk.load(&key).unwrap().is_none());
    }

    #[test]
    fn test_garbage_record_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path()).unwrap();
        let key = CacheKey::compute(Path::new("/proj"), &[]);
        fs::write(disk.record_path(&key), b"{ not json").unwrap();

        let err = disk.load(&key).unwrap_err();
        assert!(err.is_corrupt_record());
    }

    #[test]
    fn test_version_mismatch_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path()).unwrap();
        let entry = sample_entry(Path::new("/proj"));
        disk.store(&entry).unwrap();

        let path = disk.record_path(entry.key());
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        value["schema_version"] = serde_json::json!(SCHEMA_VERSION + 1);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        assert!(disk.load(entry.key()).unwrap_err().is_corrupt_record());
    }

    #[test]
    fn test_tampered_counters_are_corrupt() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path()).unwrap();
        let entry = sample_entry(Path::new("/proj"));
        disk.store(&entry).unwrap();

        let path = disk.record_path(entry.key());
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        value["meta"]["file_count"] = serde_json::json!(99);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        assert!(disk.load(entry.key()).unwrap_err().is_corrupt_record());
    }

    #[test]
    fn test_tampered_directory_totals_are_corrupt() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path()).unwrap();
        let entry = sample_entry(Path::new("/proj"));
        disk.store(&entry).unwrap();

        let path = disk.record_path(entry.key());
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        // `sub` sorts before `a.py`; the root-level counters stay consistent.
        value["tree"]["children"][0]["kind"]["file_count"] = serde_json::json!(7);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

        assert!(disk.load(entry.key()).unwrap_err().is_corrupt_record());
    }

    /// A directory carrying a record name cannot be removed with `remove_file`,
    /// even by a privileged user.
    fn stuck_record(disk: &DiskTier) -> PathBuf {
        let path = disk.record_path(&CacheKey::compute(Path::new("/stuck"), &[]));
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), "x").unwrap();
        path
    }

    #[test]
    fn test_failed_removal_does_not_stop_clear() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path()).unwrap();
        let stuck = stuck_record(&disk);
        disk.store(&sample_entry(Path::new("/proj"))).unwrap();
        disk.store(&sample_entry(Path::new("/other"))).unwrap();

        assert!(disk.clear().is_err());
        assert_eq!(disk.record_files().unwrap(), vec![stuck]);
    }

    #[test]
    fn test_failed_removal_does_not_stop_remove_where_or_sweep() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path()).unwrap();
        let stuck = stuck_record(&disk);
        disk.store(&sample_entry(Path::new("/proj"))).unwrap();
        disk.store(&sample_entry(Path::new("/other"))).unwrap();

        let removed = disk.remove_where(|_| true).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(disk.record_files().unwrap(), vec![stuck.clone()]);

        disk.store(&sample_entry(Path::new("/proj"))).unwrap();
        disk.store(&sample_entry(Path::new("/other"))).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(disk.sweep_expired(Duration::from_millis(1)).unwrap(), 2);
        assert_eq!(disk.record_files().unwrap(), vec![stuck]);
    }

    #[test]
    fn test_remove_where_matches_roots() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path()).unwrap();
        let proj = sample_entry(Path::new("/proj"));
        let other = sample_entry(Path::new("/other"));
        disk.store(&proj).unwrap();
        disk.store(&other).unwrap();

        let removed = disk.remove_where(|root| root.starts_with("/proj")).unwrap();
        assert_eq!(removed, vec![proj.key().clone()]);
        assert_eq!(disk.count().unwrap(), 1);
        assert!(disk.load(other.key()).unwrap().is_some());
    }

    #[test]
    fn test_sweep_and_clear() {
        let temp = TempDir::new().unwrap();
        let disk = DiskTier::open(temp.path()).unwrap();
        disk.store(&sample_entry(Path::new("/proj"))).unwrap();
        disk.store(&sample_entry(Path::new("/other"))).unwrap();

        assert_eq!(disk.sweep_expired(Duration::from_secs(3600)).unwrap(), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(disk.sweep_expired(Duration::from_millis(1)).unwrap(), 2);

        disk.store(&sample_entry(Path::new("/proj"))).unwrap();
        assert_eq!(disk.clear().unwrap(), 1);
        assert_eq!(disk.count().unwrap(), 0);
    }
}
