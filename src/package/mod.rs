//! Package assembler (C9): stages archives, loose overrides, and a
//! manifest into one directory, then compresses it into the final
//! deliverable.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build::BuiltChunk;
use crate::classify::Counts;
use crate::oracle::GameVariant;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("failed to stage package contents: {0}")]
    Stage(#[source] std::io::Error),
    #[error("failed to serialize manifest: {0}")]
    ManifestSerialize(#[source] toml::ser::Error),
    #[error("failed to write manifest: {0}")]
    ManifestWrite(#[source] std::io::Error),
    #[error("external compressor exited with status {status}: {stderr}")]
    CompressorFailed { status: String, stderr: String },
    #[error("failed to launch compressor {tool}: {source}")]
    CompressorLaunch {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("zip fallback failed: {0}")]
    ZipFallback(#[source] std::io::Error),
}

/// Which external compressor to prefer, if any.
#[derive(Debug, Clone)]
pub enum CompressorTool {
    /// 7-Zip CLI: `7z a <out> <staging_dir>/*`.
    SevenZip { executable: PathBuf },
}

/// One built (or attempted) archive chunk, as recorded in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkManifestEntry {
    pub name: String,
    pub file_count: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub success: bool,
    pub used_fallback: bool,
    pub plugin_stub_emitted: bool,
}

/// Aggregate loose-override stats, per spec.md §6's `loose: {file_count, bytes}`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LooseManifestEntry {
    pub file_count: usize,
    pub bytes: u64,
}

/// One non-fatal failure surfaced from any stage, per spec.md §6's
/// `failures: [{path, kind, message}]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFailure {
    pub path: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub mod_name: String,
    pub game_variant: String,
    pub tool_version: String,
    pub created_at: DateTime<Utc>,
    pub chunks: Vec<ChunkManifestEntry>,
    pub loose: LooseManifestEntry,
    pub pack_count: usize,
    pub loose_count: usize,
    pub skip_count: usize,
    pub fail_count: usize,
    pub failures: Vec<ManifestFailure>,
}

#[allow(clippy::too_many_arguments)]
impl Manifest {
    pub fn new(
        mod_name: &str,
        game_variant: GameVariant,
        chunks: Vec<ChunkManifestEntry>,
        loose: LooseManifestEntry,
        counts: Counts,
        failures: Vec<ManifestFailure>,
        created_at: SystemTime,
    ) -> Self {
        Self {
            mod_name: mod_name.to_string(),
            game_variant: game_variant.id().to_string(),
            tool_version: crate::CRATE_VERSION.to_string(),
            created_at: DateTime::<Utc>::from(created_at),
            chunks,
            loose,
            pack_count: counts.pack,
            loose_count: counts.loose,
            skip_count: counts.skip,
            fail_count: counts.fail,
            failures,
        }
    }
}

/// Build a [`ChunkManifestEntry`] for one successfully built chunk.
pub fn chunk_manifest_entry(chunk: &BuiltChunk, plugin_stub_emitted: bool) -> ChunkManifestEntry {
    ChunkManifestEntry {
        name: chunk.name.clone(),
        file_count: chunk.file_count,
        input_bytes: chunk.input_bytes,
        output_bytes: std::fs::metadata(&chunk.output_path).map(|m| m.len()).unwrap_or(0),
        success: true,
        used_fallback: chunk.used_fallback,
        plugin_stub_emitted,
    }
}

/// Walk `loose_root` and summarize its contents for the manifest's `loose`
/// field. Returns the zero entry if `loose_root` doesn't exist.
pub fn summarize_loose(loose_root: &Path) -> LooseManifestEntry {
    if !loose_root.exists() {
        return LooseManifestEntry::default();
    }
    let mut entry = LooseManifestEntry::default();
    for file in walkdir::WalkDir::new(loose_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        entry.file_count += 1;
        entry.bytes += file.metadata().map(|m| m.len()).unwrap_or(0);
    }
    entry
}

const INSTALL_TEXT: &str = "Extract this archive into your game's mod directory (or mod manager \
staging folder), preserving the Data/-relative layout: archives/ contains \
the packaged .bsa/.ba2 files and the plugin stub, loose/ contains files \
that must stay as loose overrides.\n";

/// C9: assemble `archives_dir` (the built chunks), `loose_root` (loose
/// override files), and a generated manifest/readme into `staging_dir`,
/// then compress `staging_dir` into `output_path`.
pub fn assemble_package(
    staging_dir: &Path,
    archives: &[BuiltChunk],
    archives_dir: &Path,
    loose_root: &Path,
    manifest: &Manifest,
    output_path: &Path,
    compressor: Option<&CompressorTool>,
) -> Result<(), PackageError> {
    stage_package(staging_dir, archives, archives_dir, loose_root, manifest)?;
    compress_package(staging_dir, output_path, compressor)
}

fn stage_package(
    staging_dir: &Path,
    archives: &[BuiltChunk],
    archives_dir: &Path,
    loose_root: &Path,
    manifest: &Manifest,
) -> Result<(), PackageError> {
    let archives_out = staging_dir.join("archives");
    let loose_out = staging_dir.join("loose");
    std::fs::create_dir_all(&archives_out).map_err(PackageError::Stage)?;
    std::fs::create_dir_all(&loose_out).map_err(PackageError::Stage)?;

    for chunk in archives {
        let src = archives_dir.join(&chunk.name);
        let dst = archives_out.join(&chunk.name);
        std::fs::copy(&src, &dst).map_err(PackageError::Stage)?;

        let basename = match chunk.name.rsplit_once('.') {
            Some((base, _ext)) => base,
            None => chunk.name.as_str(),
        };
        for stub_ext in ["esp", "esm", "esl"] {
            let stub_src = archives_dir.join(format!("{basename}.{stub_ext}"));
            if stub_src.exists() {
                let stub_dst = archives_out.join(format!("{basename}.{stub_ext}"));
                std::fs::copy(&stub_src, &stub_dst).map_err(PackageError::Stage)?;
            }
        }
    }

    if loose_root.exists() {
        copy_dir_recursive(loose_root, &loose_out).map_err(PackageError::Stage)?;
    }

    let manifest_toml = toml::to_string_pretty(manifest).map_err(PackageError::ManifestSerialize)?;
    std::fs::write(staging_dir.join("manifest.toml"), manifest_toml)
        .map_err(PackageError::ManifestWrite)?;
    std::fs::write(staging_dir.join("INSTALL.txt"), INSTALL_TEXT)
        .map_err(PackageError::ManifestWrite)?;

    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in walkdir::WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn compress_package(
    staging_dir: &Path,
    output_path: &Path,
    compressor: Option<&CompressorTool>,
) -> Result<(), PackageError> {
    if let Some(CompressorTool::SevenZip { executable }) = compressor {
        match run_sevenzip(executable, staging_dir, output_path) {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "external compressor failed, falling back to zip"
                );
            }
        }
    }

    zip_directory(staging_dir, output_path)
}

fn run_sevenzip(
    executable: &Path,
    staging_dir: &Path,
    output_path: &Path,
) -> Result<(), PackageError> {
    let output = Command::new(executable)
        .arg("a")
        .arg(output_path)
        .arg(staging_dir.join("*"))
        .current_dir(staging_dir)
        .output()
        .map_err(|source| PackageError::CompressorLaunch {
            tool: executable.to_path_buf(),
            source,
        })?;

    if !output.status.success() {
        return Err(PackageError::CompressorFailed {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(())
}

fn zip_directory(staging_dir: &Path, output_path: &Path) -> Result<(), PackageError> {
    let file = std::fs::File::create(output_path).map_err(PackageError::ZipFallback)?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(staging_dir)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(staging_dir).unwrap_or(entry.path());
        let name = relative.to_string_lossy().replace('\\', "/");

        writer
            .start_file(name, options)
            .map_err(|e| PackageError::ZipFallback(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        let bytes = std::fs::read(entry.path()).map_err(PackageError::ZipFallback)?;
        writer.write_all(&bytes).map_err(PackageError::ZipFallback)?;
    }

    writer
        .finish()
        .map_err(|e| PackageError::ZipFallback(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    Ok(())
}
