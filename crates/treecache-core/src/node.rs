//! File and directory node types.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use compact_str::CompactString;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Directories with at least this many children hash them in parallel.
const PARALLEL_HASH_THRESHOLD: usize = 64;

/// BLAKE3 digest over a subtree's structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructuralHash(pub [u8; 32]);

impl StructuralHash {
    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Type of file system node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    /// Regular file (symlinks are recorded as files and never followed).
    File,
    /// Directory.
    Directory {
        /// Total number of files in this subtree.
        file_count: u64,
        /// Total number of directories below this one.
        dir_count: u64,
        /// Listing this directory failed; it has no children.
        inaccessible: bool,
    },
}

impl NodeKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeKind::Directory { .. })
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, NodeKind::File)
    }
}

/// A single file or directory in a scanned tree.
///
/// Nodes are immutable once built. A directory owns its children, which the
/// constructor orders directories-first and then by name. There is no parent
/// link; lookups descend from the root by path prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    path: PathBuf,
    name: CompactString,
    kind: NodeKind,
    /// Own size for files, aggregate for directories.
    size: u64,
    modified: SystemTime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<FileNode>,
    #[serde(skip)]
    hash: OnceLock<StructuralHash>,
}

impl FileNode {
    /// Create a file node from already-fetched metadata.
    pub fn new_file(path: impl Into<PathBuf>, size: u64, modified: SystemTime) -> Self {
        let path = path.into();
        Self {
            name: name_of(&path),
            path,
            kind: NodeKind::File,
            size,
            modified,
            children: Vec::new(),
            hash: OnceLock::new(),
        }
    }

    /// Create a directory node that takes ownership of its children.
    ///
    /// Aggregate size and counts are derived here and never change afterwards.
    pub fn new_directory(
        path: impl Into<PathBuf>,
        modified: SystemTime,
        mut children: Vec<FileNode>,
    ) -> Self {
        children.sort_by(compare_entries);

        let mut size = 0u64;
        let mut file_count = 0u64;
        let mut dir_count = 0u64;
        for child in &children {
            size += child.size;
            match child.kind {
                NodeKind::File => file_count += 1,
                NodeKind::Directory {
                    file_count: fc,
                    dir_count: dc,
                    ..
                } => {
                    file_count += fc;
                    dir_count += dc + 1;
                }
            }
        }

        let path = path.into();
        Self {
            name: name_of(&path),
            path,
            kind: NodeKind::Directory {
                file_count,
                dir_count,
                inaccessible: false,
            },
            size,
            modified,
            children,
            hash: OnceLock::new(),
        }
    }

    /// Create a childless directory whose contents could not be listed.
    pub fn new_inaccessible_directory(path: impl Into<PathBuf>, modified: SystemTime) -> Self {
        let path = path.into();
        Self {
            name: name_of(&path),
            path,
            kind: NodeKind::Directory {
                file_count: 0,
                dir_count: 0,
                inaccessible: true,
            },
            size: 0,
            modified,
            children: Vec::new(),
            hash: OnceLock::new(),
        }
    }

    /// Absolute path of this entry.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name of this entry.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Check if this node is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Check if this node is a file.
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    /// Whether listing this directory failed during the scan.
    pub fn is_inaccessible(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Directory {
                inaccessible: true,
                ..
            }
        )
    }

    /// Size recorded at construction (aggregate for directories).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last modification time.
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    /// Children, directories first and then files, each sorted by name.
    pub fn children(&self) -> &[FileNode] {
        &self.children
    }

    /// Get the number of direct children.
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Get file count for directories, 1 for files.
    pub fn file_count(&self) -> u64 {
        match self.kind {
            NodeKind::Directory { file_count, .. } => file_count,
            NodeKind::File => 1,
        }
    }

    /// Get the number of directories below this one.
    pub fn dir_count(&self) -> u64 {
        match self.kind {
            NodeKind::Directory { dir_count, .. } => dir_count,
            NodeKind::File => 0,
        }
    }

    /// Recursively sum the sizes of all files in this subtree.
    pub fn total_size(&self) -> u64 {
        match self.kind {
            NodeKind::File => self.size,
            NodeKind::Directory { .. } => self.children.iter().map(FileNode::total_size).sum(),
        }
    }

    /// Whether every directory's stored size and counts match its children.
    ///
    /// Always true for trees built through the constructors; a deserialized
    /// tree may not be.
    pub fn has_consistent_totals(&self) -> bool {
        self.walk().all(|node| match node.kind {
            NodeKind::File => node.children.is_empty(),
            NodeKind::Directory {
                file_count,
                dir_count,
                ..
            } => {
                let (size, files, dirs) =
                    node.children
                        .iter()
                        .fold((0u64, 0u64, 0u64), |(size, files, dirs), child| {
                            (
                                size.saturating_add(child.size),
                                files.saturating_add(child.file_count()),
                                dirs.saturating_add(child.dir_count())
                                    .saturating_add(u64::from(child.is_dir())),
                            )
                        });
                size == node.size && files == file_count && dirs == dir_count
            }
        })
    }

    /// Find the node at `path`, descending only into subtrees whose path is a
    /// prefix of it.
    pub fn find(&self, path: impl AsRef<Path>) -> Result<&FileNode, ScanError> {
        let target = path.as_ref();
        self.find_node(target).ok_or_else(|| ScanError::NodeNotFound {
            path: target.to_path_buf(),
        })
    }

    fn find_node(&self, target: &Path) -> Option<&FileNode> {
        if self.path == target {
            return Some(self);
        }
        if !target.starts_with(&self.path) {
            return None;
        }
        self.children
            .iter()
            .find(|child| target.starts_with(&child.path))
            .and_then(|child| child.find_node(target))
    }

    /// Structural hash of this subtree, computed on first use and memoized.
    pub fn structural_hash(&self) -> StructuralHash {
        *self.hash.get_or_init(|| self.compute_hash())
    }

    fn compute_hash(&self) -> StructuralHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.name.len() as u64).to_le_bytes());
        hasher.update(self.name.as_bytes());
        hasher.update(&[u8::from(self.is_dir())]);
        hasher.update(&self.size.to_le_bytes());
        update_with_time(&mut hasher, self.modified);

        if self.is_dir() {
            let mut child_hashes: Vec<StructuralHash> =
                if self.children.len() >= PARALLEL_HASH_THRESHOLD {
                    self.children
                        .par_iter()
                        .map(FileNode::structural_hash)
                        .collect()
                } else {
                    self.children.iter().map(FileNode::structural_hash).collect()
                };
            // Child order must not influence the digest.
            child_hashes.sort_unstable();
            hasher.update(&(child_hashes.len() as u64).to_le_bytes());
            for hash in &child_hashes {
                hasher.update(&hash.0);
            }
        }

        StructuralHash(*hasher.finalize().as_bytes())
    }

    /// Depth-first, pre-order iterator over this node and its descendants.
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Rough number of heap and inline bytes this subtree occupies in memory.
    pub fn estimated_footprint(&self) -> u64 {
        self.walk()
            .map(|node| {
                std::mem::size_of::<FileNode>()
                    + node.path.as_os_str().len()
                    + if node.name.is_heap_allocated() {
                        node.name.len()
                    } else {
                        0
                    }
            })
            .sum::<usize>() as u64
    }
}

impl PartialEq for FileNode {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.name == other.name
            && self.kind == other.kind
            && self.size == other.size
            && self.modified == other.modified
            && self.children == other.children
    }
}

impl Eq for FileNode {}

/// Iterator returned by [`FileNode::walk`].
#[derive(Debug)]
pub struct Walk<'a> {
    stack: Vec<&'a FileNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a FileNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Directories before files, then by name.
fn compare_entries(a: &FileNode, b: &FileNode) -> Ordering {
    a.is_file()
        .cmp(&b.is_file())
        .then_with(|| a.name.cmp(&b.name))
}

fn name_of(path: &Path) -> CompactString {
    path.file_name()
        .map(|n| CompactString::new(n.to_string_lossy()))
        .unwrap_or_else(|| CompactString::new(path.to_string_lossy()))
}

fn update_with_time(hasher: &mut blake3::Hasher, time: SystemTime) {
    let (sign, since) = match time.duration_since(UNIX_EPOCH) {
        Ok(d) => (1u8, d),
        Err(e) => (0u8, e.duration()),
    };
    hasher.update(&[sign]);
    hasher.update(&since.as_secs().to_le_bytes());
    hasher.update(&since.subsec_nanos().to_le_bytes());
}
