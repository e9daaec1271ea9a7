//! Job orchestrator (C10): drives staging, indexing, classification,
//! chunk planning, archive building, stub emission, and packaging end to
//! end for one job.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use thiserror::Error;

use crate::build::{self, ArchiveTool, BuildError, BuiltChunk};
use crate::classify::{self, ClassifyError, Counts, Outcome};
use crate::config::{JobConfig, ResolvedArchiveBuilder};
use crate::index::{IndexError, PathIndex};
use crate::oracle;
use crate::package::{self, chunk_manifest_entry, CompressorTool, Manifest, ManifestFailure, PackageError};
use crate::plan::{self, PackFile};
use crate::progress::{Phase, ProgressEvent, ProgressSink};
use crate::stage::{self, ScratchWorkspace, StageError};
use crate::stub::{self, PluginExtension};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("job was cancelled")]
    Cancelled,
    #[error(transparent)]
    Stage(#[from] StageError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error("failed to build a {threads}-thread classifier worker pool: {message}")]
    Classify { threads: usize, message: String },
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Package(#[from] PackageError),
}

/// Result of one complete job.
#[derive(Debug)]
pub struct JobReport {
    pub outcomes: Vec<Outcome>,
    pub counts: Counts,
    pub chunks: Vec<BuiltChunk>,
    pub manifest: Manifest,
    pub output_package: PathBuf,
    pub scratch_kept_at: Option<PathBuf>,
}

/// Run one job from a resolved [`JobConfig`] to a packaged deliverable.
pub fn run_job(
    config: &JobConfig,
    cancel: &AtomicBool,
    progress: &dyn ProgressSink,
) -> Result<JobReport, OrchestratorError> {
    let workspace = ScratchWorkspace::create(config.keep_scratch)?;

    progress.on_event(ProgressEvent::PhaseStarted { phase: Phase::Staging });
    stage::stage_reference(
        &config.generated_root,
        &config.reference_root,
        &workspace.staged_reference_dir(),
    )?;
    progress.on_event(ProgressEvent::PhaseFinished { phase: Phase::Staging });
    check_cancelled(cancel)?;

    progress.on_event(ProgressEvent::PhaseStarted { phase: Phase::Indexing });
    let index = PathIndex::build(&workspace.staged_reference_dir())?;
    let dir_set = oracle::enumerate(config.game_variant, Some(&workspace.staged_reference_dir()));
    progress.on_event(ProgressEvent::PhaseFinished { phase: Phase::Indexing });
    check_cancelled(cancel)?;

    progress.on_event(ProgressEvent::PhaseStarted { phase: Phase::Classifying });
    let classify_report = classify::classify_all(
        &config.generated_root,
        &index,
        &dir_set,
        &workspace.pack_root(),
        &workspace.loose_root(),
        config.threads,
        cancel,
    )
    .map_err(|e| match e {
        ClassifyError::Walk { path, source } => {
            OrchestratorError::Stage(StageError::ReadTopLevel { path, source })
        }
        ClassifyError::WorkerPool { threads, source } => {
            OrchestratorError::Classify { threads, message: source.to_string() }
        }
    })?;
    progress.on_event(ProgressEvent::PhaseFinished { phase: Phase::Classifying });
    check_cancelled(cancel)?;

    let pack_files: Vec<PackFile> = classify_report
        .outcomes
        .iter()
        .filter(|o| o.verdict == classify::Verdict::Pack)
        .filter_map(|o| {
            o.canonical_path.as_ref().map(|p| PackFile {
                relative_path: p.clone(),
                size: o.size,
            })
        })
        .collect();

    progress.on_event(ProgressEvent::PhaseStarted { phase: Phase::Planning });
    let plan = plan::plan_chunks(
        &pack_files,
        config.chunk_budget_bytes,
        &config.mod_name,
        config.game_variant.archive_extension(),
    );
    progress.on_event(ProgressEvent::PhaseFinished { phase: Phase::Planning });
    check_cancelled(cancel)?;

    progress.on_event(ProgressEvent::PhaseStarted { phase: Phase::Building });
    let archives_dir = workspace.root().join("built_archives");
    let archive_tool = config.tool_paths.resolve_archive_builder().map(|resolved| match resolved {
        ResolvedArchiveBuilder::Explicit(executable) => ArchiveTool::Archive2 { executable },
        ResolvedArchiveBuilder::BsArch(executable) => ArchiveTool::BsArch {
            executable,
            game_flag: config.game_variant.bsarch_game_flag().to_string(),
        },
    });
    let built_chunks = build::build_chunks(
        &plan.chunks,
        &workspace.pack_root(),
        &workspace.root().join("chunks"),
        &archives_dir,
        archive_tool.as_ref(),
    )?;
    let no_index_name = format!("{}.{}", config.mod_name, config.game_variant.archive_extension());
    let mut chunk_entries = Vec::with_capacity(built_chunks.built.len());
    for (i, chunk) in built_chunks.built.iter().enumerate() {
        progress.on_event(ProgressEvent::ChunkBuilt {
            current: i + 1,
            total: built_chunks.built.len(),
            name: &chunk.name,
        });

        // Chunk 0 (the no-index name) honors the configured plugin
        // extension; later chunks are always plain masterless stubs.
        let extension = if chunk.name == no_index_name {
            config.plugin_extension
        } else {
            PluginExtension::Esp
        };
        let stub_path = archives_dir.join(format!("{}.{}", chunk_basename(&chunk.name), extension.as_str()));
        let emitted = match stub::write_plugin_stub(&stub_path, extension, &[]) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(chunk = %chunk.name, error = %err, "plugin stub emission failed, continuing");
                false
            }
        };
        chunk_entries.push(chunk_manifest_entry(chunk, emitted));
    }
    progress.on_event(ProgressEvent::PhaseFinished { phase: Phase::Building });
    check_cancelled(cancel)?;

    progress.on_event(ProgressEvent::PhaseStarted { phase: Phase::Packaging });

    let mut failures: Vec<ManifestFailure> = classify_report
        .outcomes
        .iter()
        .filter_map(|o| {
            o.failure.as_ref().map(|f| ManifestFailure {
                path: f.path.display().to_string(),
                kind: format!("{:?}", f.kind),
                message: f.message.clone(),
            })
        })
        .collect();
    failures.extend(built_chunks.failures.iter().map(|f| ManifestFailure {
        path: f.chunk.clone(),
        kind: "archive_build_failure".to_string(),
        message: f.message.clone(),
    }));

    let manifest = Manifest::new(
        &config.mod_name,
        config.game_variant,
        chunk_entries,
        package::summarize_loose(&workspace.loose_root()),
        classify_report.counts,
        failures,
        SystemTime::now(),
    );

    let staging_dir = workspace.root().join("package_staging");
    let compressor = config
        .tool_paths
        .resolve_compressor()
        .map(|executable| CompressorTool::SevenZip { executable });

    package::assemble_package(
        &staging_dir,
        &built_chunks.built,
        &archives_dir,
        &workspace.loose_root(),
        &manifest,
        &config.output_package,
        compressor.as_ref(),
    )?;
    progress.on_event(ProgressEvent::PhaseFinished { phase: Phase::Packaging });

    let scratch_kept_at = workspace.release();

    Ok(JobReport {
        outcomes: classify_report.outcomes,
        counts: classify_report.counts,
        chunks: built_chunks.built,
        manifest,
        output_package: config.output_package.clone(),
        scratch_kept_at,
    })
}

/// Strip a chunk's archive extension to get the basename its plugin stub
/// should share (`MyMod0.bsa` -> `MyMod0`).
fn chunk_basename(chunk_name: &str) -> &str {
    match chunk_name.rsplit_once('.') {
        Some((base, _ext)) => base,
        None => chunk_name,
    }
}

fn check_cancelled(cancel: &AtomicBool) -> Result<(), OrchestratorError> {
    if cancel.load(Ordering::Relaxed) {
        Err(OrchestratorError::Cancelled)
    } else {
        Ok(())
    }
}
