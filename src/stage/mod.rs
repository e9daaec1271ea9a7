//! Scratch workspace and the reference stager (C4).

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to create scratch workspace: {0}")]
    WorkspaceCreate(#[source] io::Error),
    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),
    #[error("failed to read top level of {path}: {source}")]
    ReadTopLevel {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Owns the scratch workspace for one job. Destroyed on drop unless
/// `keep` was requested, in which case the directory is leaked to disk
/// and its path is returned to the caller via [`ScratchWorkspace::keep_path`].
pub struct ScratchWorkspace {
    dir: Option<tempfile::TempDir>,
    kept_path: Option<PathBuf>,
}

impl ScratchWorkspace {
    /// Create a fresh scratch workspace with `staged_reference/`,
    /// `pack/`, and `loose/` subdirectories.
    pub fn create(keep: bool) -> Result<Self, StageError> {
        let dir = tempfile::Builder::new()
            .prefix("bsaforge-")
            .tempdir()
            .map_err(StageError::WorkspaceCreate)?;

        std::fs::create_dir_all(dir.path().join("staged_reference"))
            .map_err(StageError::WorkspaceCreate)?;
        std::fs::create_dir_all(dir.path().join("pack")).map_err(StageError::WorkspaceCreate)?;
        std::fs::create_dir_all(dir.path().join("loose")).map_err(StageError::WorkspaceCreate)?;
        std::fs::create_dir_all(dir.path().join("chunks")).map_err(StageError::WorkspaceCreate)?;

        let kept_path = if keep {
            Some(dir.path().to_path_buf())
        } else {
            None
        };

        Ok(Self {
            dir: Some(dir),
            kept_path,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.as_ref().expect("workspace not yet released").path()
    }

    pub fn staged_reference_dir(&self) -> PathBuf {
        self.root().join("staged_reference")
    }

    pub fn pack_root(&self) -> PathBuf {
        self.root().join("pack")
    }

    pub fn loose_root(&self) -> PathBuf {
        self.root().join("loose")
    }

    pub fn chunk_dir(&self, chunk_name: &str) -> PathBuf {
        self.root().join("chunks").join(chunk_name)
    }

    /// Consume the workspace, leaving its contents on disk if `keep` was
    /// requested at creation time, and return the retained path if so.
    pub fn release(mut self) -> Option<PathBuf> {
        if let Some(path) = self.kept_path.take() {
            if let Some(dir) = self.dir.take() {
                // `into_path` disarms the TempDir's own Drop cleanup.
                let _ = dir.into_path();
            }
            Some(path)
        } else {
            None
        }
    }
}

/// Summary of what the stager did, for the manifest / log.
#[derive(Debug, Default)]
pub struct StageReport {
    pub staged_top_levels: Vec<String>,
    pub mod_only_top_levels: Vec<String>,
}

/// C4: stage only the top-level reference subtrees the generated tree
/// touches.
pub fn stage_reference(
    generated_root: &Path,
    reference_root: &Path,
    staged_reference_dir: &Path,
) -> Result<StageReport, StageError> {
    let generated_top_levels = top_level_names_lower(generated_root)
        .map_err(|source| StageError::ReadTopLevel {
            path: generated_root.to_path_buf(),
            source,
        })?;

    let reference_entries = read_top_level_case_map(reference_root).map_err(|source| {
        StageError::ReadTopLevel {
            path: reference_root.to_path_buf(),
            source,
        }
    })?;

    let mut report = StageReport::default();

    for lower_name in &generated_top_levels {
        match reference_entries.get(lower_name) {
            Some(actual_name) => {
                let src = reference_root.join(actual_name);
                let dst = staged_reference_dir.join(actual_name);
                if dst.exists() {
                    return Err(StageError::DestinationExists(dst));
                }
                copy_dir_recursive(&src, &dst)?;
                report.staged_top_levels.push(actual_name.clone());
            }
            None => {
                report.mod_only_top_levels.push(lower_name.clone());
            }
        }
    }

    if !report.mod_only_top_levels.is_empty() {
        tracing::info!(
            dirs = ?report.mod_only_top_levels,
            "mod-only top-level directories (not present in reference tree)"
        );
    }

    Ok(report)
}

fn top_level_names_lower(root: &Path) -> io::Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if let Some(first) = relative.components().next() {
            if let std::path::Component::Normal(s) = first {
                if let Some(s) = s.to_str() {
                    out.insert(s.to_ascii_lowercase());
                }
            }
        }
    }
    // A shallow read_dir already yields only top-level entries, but files
    // directly under `root` (rather than directories) also contribute a
    // "top-level name"; that's fine — stage_reference will simply find no
    // directory match for them in the reference tree, same as any other
    // mod-only top level.
    Ok(out)
}

fn read_top_level_case_map(root: &Path) -> io::Result<std::collections::HashMap<String, String>> {
    let mut map = std::collections::HashMap::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            map.entry(name.to_ascii_lowercase()).or_insert_with(|| name.to_string());
        }
    }
    Ok(map)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), StageError> {
    std::fs::create_dir_all(dst).map_err(|source| StageError::Copy {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source,
    })?;

    for entry in WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|source| StageError::Copy {
                from: entry.path().to_path_buf(),
                to: target.clone(),
                source,
            })?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|source| StageError::Copy {
                    from: entry.path().to_path_buf(),
                    to: target.clone(),
                    source,
                })?;
            }
            std::fs::copy(entry.path(), &target).map_err(|source| StageError::Copy {
                from: entry.path().to_path_buf(),
                to: target.clone(),
                source,
            })?;
        }
    }

    Ok(())
}
