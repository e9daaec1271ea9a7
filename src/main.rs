use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use bsaforge::{
    classify, index, oracle, plan,
    progress::IndicatifProgressSink,
    run_job, ClassifyError, GameVariant, JobConfig, PluginExtension,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bsaforge")]
#[command(author, version, about = "Classify and package generated mod output against a reference game tree")]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify and package generated output into archives plus loose overrides.
    Pack {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        generated: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        game: String,
        #[arg(long)]
        mod_name: String,
        #[arg(long)]
        threads: Option<usize>,
        #[arg(long)]
        chunk_budget_bytes: Option<u64>,
        #[arg(long)]
        compression_level: Option<u8>,
        #[arg(long, default_value_t = false)]
        keep_scratch: bool,
        #[arg(long, default_value = "esp")]
        plugin_extension: String,
        #[arg(long)]
        archive_builder_path: Option<PathBuf>,
        #[arg(long)]
        compressor_path: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        debug: bool,
    },

    /// Run classification only, without building or packaging anything.
    ClassifyOnly {
        #[arg(long)]
        reference: PathBuf,
        #[arg(long)]
        generated: PathBuf,
        #[arg(long)]
        game: String,
    },

    /// Plan chunk layout for a list of files, without touching disk.
    Plan {
        #[arg(long)]
        chunk_budget_bytes: u64,
        #[arg(long)]
        mod_name: String,
        #[arg(long)]
        game: String,
        /// `path:size` pairs
        files: Vec<String>,
    },
}

/// Wire a stderr layer plus, when `log_file_dir` is given (the `pack`
/// subcommand knows its output directory up front), a second layer
/// appending to a log file under that directory — the "Log file under the
/// output directory" filesystem output spec.md §6 calls for.
fn setup_logging(verbosity: u8, log_file_dir: Option<&std::path::Path>) {
    let filter = match verbosity {
        0 => "bsaforge=info",
        1 => "bsaforge=debug",
        _ => "bsaforge=trace",
    };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = log_file_dir.and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("bsaforge.log"))
            .ok()?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(file)),
        )
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_file_dir = match &cli.command {
        Commands::Pack { output, .. } => Some(match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }),
        _ => None,
    };
    setup_logging(cli.verbose, log_file_dir.as_deref());

    match cli.command {
        Commands::Pack {
            reference,
            generated,
            output,
            game,
            mod_name,
            threads,
            chunk_budget_bytes,
            compression_level,
            keep_scratch,
            plugin_extension,
            archive_builder_path,
            compressor_path,
            debug,
        } => {
            let game_variant =
                GameVariant::from_id(&game).with_context(|| format!("unknown game variant: {game}"))?;

            let mut config = JobConfig::new(reference, generated, output, game_variant, mod_name);
            if let Some(threads) = threads {
                config.threads = threads;
            }
            if let Some(budget) = chunk_budget_bytes {
                config.chunk_budget_bytes = budget;
            }
            if let Some(level) = compression_level {
                config.compression_level = level;
            }
            config.keep_scratch = keep_scratch;
            config.debug = debug;
            config.plugin_extension = match plugin_extension.to_ascii_lowercase().as_str() {
                "esp" => PluginExtension::Esp,
                "esm" => PluginExtension::Esm,
                "esl" => PluginExtension::Esl,
                other => bail!("unknown plugin extension: {other}"),
            };
            config.tool_paths.archive_builder = archive_builder_path;
            config.tool_paths.compressor = compressor_path;

            let cancel = AtomicBool::new(false);
            let sink = IndicatifProgressSink::new();
            let report = run_job(&config, &cancel, &sink).context("job failed")?;

            println!(
                "pack={} loose={} skip={} fail={}",
                report.counts.pack, report.counts.loose, report.counts.skip, report.counts.fail
            );
            println!("package written to {}", report.output_package.display());
            if report.counts.fail > 0 {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::ClassifyOnly {
            reference,
            generated,
            game,
        } => {
            let game_variant =
                GameVariant::from_id(&game).with_context(|| format!("unknown game variant: {game}"))?;

            let index = index::PathIndex::build(&reference).context("failed to index reference tree")?;
            let dir_set = oracle::enumerate(game_variant, Some(&reference));
            let cancel = AtomicBool::new(false);

            let threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            let report = classify::classify_all(
                &generated,
                &index,
                &dir_set,
                &std::env::temp_dir().join("bsaforge-classify-only-pack"),
                &std::env::temp_dir().join("bsaforge-classify-only-loose"),
                threads,
                &cancel,
            )
            .map_err(|err| match err {
                ClassifyError::Walk { path, source } => {
                    anyhow::anyhow!("failed to walk {}: {source}", path.display())
                }
                ClassifyError::WorkerPool { threads, source } => {
                    anyhow::anyhow!("failed to build a {threads}-thread worker pool: {source}")
                }
            })?;

            println!(
                "pack={} loose={} skip={} fail={}",
                report.counts.pack, report.counts.loose, report.counts.skip, report.counts.fail
            );
            Ok(())
        }

        Commands::Plan {
            chunk_budget_bytes,
            mod_name,
            game,
            files,
        } => {
            let game_variant =
                GameVariant::from_id(&game).with_context(|| format!("unknown game variant: {game}"))?;

            let pack_files = files
                .iter()
                .map(|entry| {
                    let (path, size) = entry
                        .rsplit_once(':')
                        .with_context(|| format!("expected path:size, got {entry}"))?;
                    let size: u64 = size.parse().with_context(|| format!("invalid size in {entry}"))?;
                    Ok(plan::PackFile {
                        relative_path: PathBuf::from(path),
                        size,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let archive_plan = plan::plan_chunks(
                &pack_files,
                chunk_budget_bytes,
                &mod_name,
                game_variant.archive_extension(),
            );

            for chunk in &archive_plan.chunks {
                println!("{} ({} bytes, {} files)", chunk.name, chunk.total_size, chunk.files.len());
            }
            Ok(())
        }
    }
}
