//! Case-insensitive path index over a staged reference tree (C1).
//!
//! Built once by a single recursive walk; immutable and freely shared
//! read-only across classifier workers afterward.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A single directory level: case-folded entry name to the child node.
#[derive(Debug)]
enum Node {
    Dir {
        /// Actual on-disk path of this directory.
        real_path: PathBuf,
        /// Case-folded child name -> child node.
        children: HashMap<String, Node>,
    },
    File {
        /// Actual on-disk path of this file.
        real_path: PathBuf,
    },
}

/// The case-insensitive path index (C1). Lookup is O(depth).
#[derive(Debug)]
pub struct PathIndex {
    root: Node,
}

impl PathIndex {
    /// Build the index with a single recursive walk of `root`.
    ///
    /// Determinism: when two entries in the same directory share a
    /// lowercase form, the one kept is the first encountered in a
    /// directory listing sorted lexicographically by the actual name.
    pub fn build(root: &Path) -> Result<Self, IndexError> {
        let root_node = build_node(root)?;
        Ok(Self { root: root_node })
    }

    /// Resolve a generated-relative path against the index. Returns the
    /// absolute path inside the staged reference tree, or `None` on a miss
    /// at any level.
    pub fn lookup(&self, relative: &[String]) -> Option<PathBuf> {
        let mut node = &self.root;
        for (i, segment) in relative.iter().enumerate() {
            let lower = segment.to_ascii_lowercase();
            let Node::Dir { children, .. } = node else {
                return None;
            };
            let child = children.get(&lower)?;
            let is_last = i == relative.len() - 1;
            match (is_last, child) {
                (true, Node::File { real_path }) => return Some(real_path.clone()),
                (false, Node::Dir { .. }) => node = child,
                _ => return None,
            }
        }
        None
    }
}

fn build_node(dir: &Path) -> Result<Node, IndexError> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|source| IndexError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|e| e.ok())
        .collect();
    // Sort lexicographically by actual name so duplicate-lowercase
    // collisions resolve to the first name in a stable, documented order.
    entries.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut children = HashMap::new();
    for entry in entries {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        if children.contains_key(&lower) {
            continue;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        let node = if file_type.is_dir() {
            build_node(&entry.path())?
        } else if file_type.is_file() || file_type.is_symlink() {
            Node::File {
                real_path: entry.path(),
            }
        } else {
            continue;
        };
        children.insert(lower, node);
    }

    Ok(Node::Dir {
        real_path: dir.to_path_buf(),
        children,
    })
}

/// Split an OS path into its component strings, for use as a lookup key.
pub fn path_segments(relative: &Path) -> Vec<String> {
    relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => s.to_str().map(str::to_string),
            _ => None,
        })
        .collect()
}
