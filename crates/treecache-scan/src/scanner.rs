//! JWalk-based directory scanner.

use std::collections::{HashMap, HashSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use jwalk::{Parallelism, WalkDir};

use treecache_core::{
    FileNode, FileTree, ScanConfig, ScanError, ScanWarning, TreeStats, WarningKind,
};

/// Scanner that walks a project root with jwalk and builds an owned tree.
///
/// Ignored directories are pruned from their parent's listing before jwalk
/// reads them, so their contents are never visited.
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeScanner;

impl TreeScanner {
    /// Create a new scanner.
    pub fn new() -> Self {
        Self
    }

    /// Perform a scan of the configured root.
    ///
    /// Failures about the root itself are returned as errors. Failures below
    /// the root become [`ScanWarning`]s on the returned tree.
    pub fn scan(&self, config: &ScanConfig) -> Result<FileTree, ScanError> {
        let start = Instant::now();
        let root_path = config
            .root
            .canonicalize()
            .map_err(|e| ScanError::root(&config.root, e))?;

        let root_metadata =
            std::fs::metadata(&root_path).map_err(|e| ScanError::root(&root_path, e))?;
        if !root_metadata.is_dir() {
            return Err(ScanError::NotADirectory { path: root_path });
        }

        tracing::debug!(
            target: "treecache::scan",
            root = %root_path.display(),
            patterns = config.ignore_patterns.len(),
            "scan started"
        );

        let mut collected = Collected::default();
        self.collect_entries(config, &root_path, &mut collected);

        let root_node = build_node(
            &root_path,
            modified_of(&root_metadata),
            &mut collected.entries_by_parent,
            &collected.unreadable_dirs,
        );
        let stats = TreeStats::from_tree(&root_node);
        let tree = FileTree::new(
            root_node,
            root_path,
            config.ignore_patterns.clone(),
            stats,
            start.elapsed(),
            collected.warnings,
        );

        tracing::debug!(
            target: "treecache::scan",
            root = %tree.root_path.display(),
            files = tree.total_files(),
            bytes = tree.total_size(),
            warnings = tree.warnings.len(),
            elapsed_ms = tree.scan_duration.as_millis() as u64,
            "scan finished"
        );

        Ok(tree)
    }

    /// Walk the root, grouping surviving entries by parent directory.
    fn collect_entries(&self, config: &ScanConfig, root_path: &Path, collected: &mut Collected) {
        let filter = config.clone();

        let walker = WalkDir::new(root_path)
            .parallelism(parallelism(config.threads))
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(0)
            .process_read_dir(move |depth, _path, _state, children| {
                // No depth: the synthetic listing holding only the root itself.
                if depth.is_none() {
                    return;
                }
                children.retain(|entry| match entry {
                    Ok(e) => !filter.should_ignore(&e.file_name().to_string_lossy()),
                    Err(_) => true,
                });
            });

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    match err.io_error() {
                        Some(io) => collected.listing_failed(path, io),
                        None => collected.warnings.push(ScanWarning::new(
                            path,
                            err.to_string(),
                            WarningKind::ReadError,
                        )),
                    }
                    continue;
                }
            };

            let path = entry.path();

            if let Some(err) = &entry.read_children_error {
                match err.io_error() {
                    Some(io) => collected.listing_failed(path.clone(), io),
                    None => collected.warnings.push(ScanWarning::new(
                        &path,
                        err.to_string(),
                        WarningKind::ReadError,
                    )),
                }
            }

            // The root is built from metadata fetched before the walk.
            if entry.depth == 0 {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    collected.warnings.push(ScanWarning::new(
                        &path,
                        err.to_string(),
                        WarningKind::MetadataError,
                    ));
                    continue;
                }
            };

            let Some(parent) = path.parent().map(Path::to_path_buf) else {
                continue;
            };

            let is_dir = entry.file_type().is_dir();
            collected
                .entries_by_parent
                .entry(parent)
                .or_default()
                .push(EntryInfo {
                    path,
                    is_dir,
                    size: if is_dir { 0 } else { metadata.len() },
                    modified: modified_of(&metadata),
                });
        }
    }
}

/// Everything gathered during one walk.
#[derive(Default)]
struct Collected {
    entries_by_parent: HashMap<PathBuf, Vec<EntryInfo>>,
    unreadable_dirs: HashSet<PathBuf>,
    warnings: Vec<ScanWarning>,
}

impl Collected {
    /// Record a directory whose listing failed, once per directory.
    fn listing_failed(&mut self, path: PathBuf, error: &std::io::Error) {
        if self.unreadable_dirs.insert(path.clone()) {
            self.warnings.push(ScanWarning::read_error(path, error));
        }
    }
}

/// Temporary struct for collecting entry information.
struct EntryInfo {
    path: PathBuf,
    is_dir: bool,
    size: u64,
    modified: SystemTime,
}

/// Recursively build a directory node from the collected entries.
fn build_node(
    path: &Path,
    modified: SystemTime,
    entries_by_parent: &mut HashMap<PathBuf, Vec<EntryInfo>>,
    unreadable_dirs: &HashSet<PathBuf>,
) -> FileNode {
    if unreadable_dirs.contains(path) {
        return FileNode::new_inaccessible_directory(path, modified);
    }

    let children = entries_by_parent
        .remove(path)
        .unwrap_or_default()
        .into_iter()
        .map(|entry| {
            if entry.is_dir {
                build_node(&entry.path, entry.modified, entries_by_parent, unreadable_dirs)
            } else {
                FileNode::new_file(entry.path, entry.size, entry.modified)
            }
        })
        .collect();

    FileNode::new_directory(path, modified, children)
}

fn parallelism(threads: usize) -> Parallelism {
    match threads {
        0 => Parallelism::RayonDefaultPool {
            busy_timeout: Duration::from_millis(100),
        },
        1 => Parallelism::Serial,
        n => Parallelism::RayonNewPool(n),
    }
}

fn modified_of(metadata: &Metadata) -> SystemTime {
    metadata.modified().unwrap_or(UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use treecache_core::IgnoreSet;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();
        fs::write(root.join("dir2/file4.txt"), "another file here").unwrap();

        temp
    }

    #[test]
    fn test_basic_scan() {
        let temp = create_test_tree();
        let tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

        assert_eq!(tree.stats.file_count, 4);
        // root, dir1, dir2, subdir
        assert_eq!(tree.stats.dir_count, 4);
        assert_eq!(tree.stats.total_size, 5 + 17 + 4 + 17);
        assert_eq!(tree.root.total_size(), tree.stats.total_size);
        assert!(!tree.has_warnings());
    }

    #[test]
    fn test_children_directories_first_then_name() {
        let temp = create_test_tree();
        let tree = TreeScanner::new().scan(&ScanConfig::new(temp.path())).unwrap();

        let names: Vec<_> = tree.root.children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["dir1", "dir2", "file1.txt"]);
    }

    #[test]
    fn test_ignore_patterns() {
        let temp = create_test_tree();
        let config = ScanConfig::builder()
            .root(temp.path())
            .ignore_patterns(IgnoreSet::parse(["dir2"]).unwrap())
            .build()
            .unwrap();

        let tree = TreeScanner::new().scan(&config).unwrap();

        assert!(!tree.root.children().iter().any(|c| c.name() == "dir2"));
        assert_eq!(tree.stats.file_count, 3);
    }

    #[test]
    fn test_serial_and_parallel_agree() {
        let temp = create_test_tree();
        let serial = ScanConfig::builder()
            .root(temp.path())
            .threads(1usize)
            .build()
            .unwrap();
        let parallel = ScanConfig::builder()
            .root(temp.path())
            .threads(2usize)
            .build()
            .unwrap();

        let a = TreeScanner::new().scan(&serial).unwrap();
        let b = TreeScanner::new().scan(&parallel).unwrap();
        assert_eq!(a.root, b.root);
        assert_eq!(a.root.structural_hash(), b.root.structural_hash());
    }

    #[test]
    fn test_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = TreeScanner::new()
            .scan(&ScanConfig::new(temp.path().join("nope")))
            .unwrap_err();
        assert!(matches!(err, ScanError::RootNotFound { .. }));
    }

    #[test]
    fn test_root_is_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain.txt");
        fs::write(&file, "x").unwrap();

        let err = TreeScanner::new().scan(&ScanConfig::new(&file)).unwrap_err();
        assert!(matches!(err, ScanError::NotADirectory { .. }));
    }
}
