//! Archive builder driver (C7): invokes an external archive-creation tool
//! per planned chunk, falling back to a plain ZIP when no such tool is
//! configured or available.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::plan::Chunk;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to stage chunk contents for {chunk}: {source}")]
    Stage {
        chunk: String,
        #[source]
        source: std::io::Error,
    },
    #[error("archive tool for chunk {chunk} exited with status {status}: {stderr}")]
    ToolFailed {
        chunk: String,
        status: String,
        stderr: String,
    },
    #[error("failed to launch archive tool {tool} for chunk {chunk}: {source}")]
    Launch {
        tool: PathBuf,
        chunk: String,
        #[source]
        source: std::io::Error,
    },
    #[error("zip fallback failed for chunk {chunk}: {source}")]
    ZipFallback {
        chunk: String,
        #[source]
        source: std::io::Error,
    },
}

/// Which external archive-building tool flavor to drive, if any.
#[derive(Debug, Clone)]
pub enum ArchiveTool {
    /// Bethesda Archive2-style: `Archive2.exe <root> -c=<out> -r=<root>`.
    Archive2 { executable: PathBuf },
    /// BSArch-style: `bsarch.exe pack <root> <out> -<game>`.
    BsArch { executable: PathBuf, game_flag: String },
}

/// Result of building one chunk.
#[derive(Debug, Clone)]
pub struct BuiltChunk {
    pub name: String,
    pub output_path: PathBuf,
    pub file_count: usize,
    pub input_bytes: u64,
    pub used_fallback: bool,
}

/// A chunk whose archive tool AND zip fallback both failed. Non-fatal: the
/// chunk is skipped (and gets no plugin stub), the job continues with the
/// remaining chunks — see spec.md §7's "Archive builder failure" row.
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    pub chunk: String,
    pub message: String,
}

/// Outcome of building every planned chunk: the chunks that produced an
/// archive (natively or via zip fallback) plus the ones that didn't.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub built: Vec<BuiltChunk>,
    pub failures: Vec<ChunkFailure>,
}

/// C7: build every chunk in `plan`, staging each chunk's files under
/// `pack_root` into an isolated directory first so the archive tool sees
/// exactly (and only) that chunk's contents.
///
/// A single chunk's failure (staging, tool, and zip fallback all failing)
/// does not abort the job: it is recorded in `BuildReport::failures` and
/// the remaining chunks are still attempted.
pub fn build_chunks(
    plan_chunks: &[Chunk],
    pack_root: &Path,
    chunk_scratch_root: &Path,
    archives_out_dir: &Path,
    tool: Option<&ArchiveTool>,
) -> Result<BuildReport, BuildError> {
    std::fs::create_dir_all(archives_out_dir).map_err(|source| BuildError::Stage {
        chunk: "<archives output directory>".to_string(),
        source,
    })?;

    let mut report = BuildReport::default();
    for chunk in plan_chunks {
        match build_one_chunk(chunk, pack_root, chunk_scratch_root, archives_out_dir, tool) {
            Ok(built) => report.built.push(built),
            Err(err) => {
                tracing::error!(chunk = %chunk.name, error = %err, "chunk failed, skipping its plugin stub");
                report.failures.push(ChunkFailure {
                    chunk: chunk.name.clone(),
                    message: err.to_string(),
                });
            }
        }
    }
    Ok(report)
}

fn build_one_chunk(
    chunk: &Chunk,
    pack_root: &Path,
    chunk_scratch_root: &Path,
    archives_out_dir: &Path,
    tool: Option<&ArchiveTool>,
) -> Result<BuiltChunk, BuildError> {
    let chunk_dir = chunk_scratch_root.join(&chunk.name);
    stage_chunk(chunk, pack_root, &chunk_dir).map_err(|source| BuildError::Stage {
        chunk: chunk.name.clone(),
        source,
    })?;

    let output_path = archives_out_dir.join(&chunk.name);
    let file_count = chunk.files.len();
    let input_bytes = chunk.total_size;

    match tool {
        Some(tool) => match run_tool(tool, &chunk_dir, &output_path, &chunk.name) {
            Ok(()) => Ok(BuiltChunk {
                name: chunk.name.clone(),
                output_path,
                file_count,
                input_bytes,
                used_fallback: false,
            }),
            Err(err) => {
                tracing::warn!(
                    chunk = %chunk.name,
                    error = %err,
                    "external archive tool failed, falling back to zip"
                );
                zip_fallback(&chunk_dir, &output_path, &chunk.name)?;
                Ok(BuiltChunk {
                    name: chunk.name.clone(),
                    output_path,
                    file_count,
                    input_bytes,
                    used_fallback: true,
                })
            }
        },
        None => {
            zip_fallback(&chunk_dir, &output_path, &chunk.name)?;
            Ok(BuiltChunk {
                name: chunk.name.clone(),
                output_path,
                file_count,
                input_bytes,
                used_fallback: true,
            })
        }
    }
}

fn stage_chunk(chunk: &Chunk, pack_root: &Path, chunk_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(chunk_dir)?;
    for relative in &chunk.files {
        let src = pack_root.join(relative);
        let dst = chunk_dir.join(relative);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&src, &dst)?;
    }
    Ok(())
}

fn run_tool(
    tool: &ArchiveTool,
    chunk_dir: &Path,
    output_path: &Path,
    chunk_name: &str,
) -> Result<(), BuildError> {
    let (executable, args): (&Path, Vec<String>) = match tool {
        ArchiveTool::Archive2 { executable } => (
            executable,
            vec![
                chunk_dir.display().to_string(),
                format!("-c={}", output_path.display()),
                format!("-r={}", chunk_dir.display()),
            ],
        ),
        ArchiveTool::BsArch { executable, game_flag } => (
            executable,
            vec![
                "pack".to_string(),
                chunk_dir.display().to_string(),
                output_path.display().to_string(),
                format!("-{game_flag}"),
            ],
        ),
    };

    let output = Command::new(executable)
        .args(&args)
        .output()
        .map_err(|source| BuildError::Launch {
            tool: executable.to_path_buf(),
            chunk: chunk_name.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(BuildError::ToolFailed {
            chunk: chunk_name.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(())
}

fn zip_fallback(chunk_dir: &Path, output_path: &Path, chunk_name: &str) -> Result<(), BuildError> {
    let file = std::fs::File::create(output_path).map_err(|source| BuildError::ZipFallback {
        chunk: chunk_name.to_string(),
        source,
    })?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(chunk_dir)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(chunk_dir)
            .unwrap_or(entry.path());
        let name = relative.to_string_lossy().replace('\\', "/");

        writer
            .start_file(name, options)
            .map_err(|e| BuildError::ZipFallback {
                chunk: chunk_name.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })?;
        let bytes = std::fs::read(entry.path()).map_err(|source| BuildError::ZipFallback {
            chunk: chunk_name.to_string(),
            source,
        })?;
        writer
            .write_all(&bytes)
            .map_err(|source| BuildError::ZipFallback {
                chunk: chunk_name.to_string(),
                source,
            })?;
    }

    writer.finish().map_err(|e| BuildError::ZipFallback {
        chunk: chunk_name.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    })?;
    Ok(())
}
