//! Job configuration.
//!
//! `JobConfig` is the one fully-resolved shape every layer below the CLI
//! consumes. `Profile` is the optional on-disk defaults file the CLI reads
//! before applying flags; the orchestrator and engine never see it.

mod paths;

pub use paths::Paths;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::oracle::GameVariant;
use crate::stub::PluginExtension;

/// Fully resolved configuration for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub reference_root: PathBuf,
    pub generated_root: PathBuf,
    pub output_package: PathBuf,

    pub game_variant: GameVariant,
    pub mod_name: String,

    pub threads: usize,
    pub chunk_budget_bytes: u64,
    pub compression_level: u8,
    pub keep_scratch: bool,
    pub debug: bool,
    #[serde(with = "plugin_extension_serde")]
    pub plugin_extension: PluginExtension,

    pub tool_paths: ToolPaths,
}

impl JobConfig {
    pub fn new(
        reference_root: PathBuf,
        generated_root: PathBuf,
        output_package: PathBuf,
        game_variant: GameVariant,
        mod_name: String,
    ) -> Self {
        Self {
            reference_root,
            generated_root,
            output_package,
            game_variant,
            mod_name,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            chunk_budget_bytes: 2 * (1 << 30),
            compression_level: 5,
            keep_scratch: false,
            debug: false,
            plugin_extension: PluginExtension::Esp,
            tool_paths: ToolPaths::default(),
        }
    }
}

mod plugin_extension_serde {
    use super::PluginExtension;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &PluginExtension, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PluginExtension, D::Error> {
        let raw = String::deserialize(d)?;
        match raw.to_ascii_lowercase().as_str() {
            "esp" => Ok(PluginExtension::Esp),
            "esm" => Ok(PluginExtension::Esm),
            "esl" => Ok(PluginExtension::Esl),
            other => Err(serde::de::Error::custom(format!(
                "unknown plugin extension: {other}"
            ))),
        }
    }
}

/// Resolved paths to external collaborator tools: the archive builder and
/// the final compressor. Resolution order, applied by the CLI before a
/// `JobConfig` reaches the orchestrator: explicit path, then `PATH` lookup,
/// then absence (C7/C9 fall back immediately rather than probing).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPaths {
    pub archive_builder: Option<PathBuf>,
    pub compressor: Option<PathBuf>,
}

/// An archive builder resolved by [`ToolPaths::resolve_archive_builder`],
/// tagged with which calling convention produced it so the orchestrator
/// knows which `ArchiveTool` variant to drive it with.
#[derive(Debug, Clone)]
pub enum ResolvedArchiveBuilder {
    /// An explicitly configured path; assumed Archive2-style (the common
    /// case when a user points this crate at Bethesda's own tool).
    Explicit(PathBuf),
    /// Found on `PATH` under the conventional `bsarch` name.
    BsArch(PathBuf),
}

impl ToolPaths {
    /// Resolve the archive builder: explicit config path first, then a
    /// `PATH` lookup for `bsarch` (the community cross-game tool, which
    /// every variant in [`GameVariant`] maps to a flag for), then absence.
    pub fn resolve_archive_builder(&self) -> Option<ResolvedArchiveBuilder> {
        if let Some(path) = &self.archive_builder {
            return Some(ResolvedArchiveBuilder::Explicit(path.clone()));
        }
        which::which("bsarch").ok().map(ResolvedArchiveBuilder::BsArch)
    }

    /// Resolve the compressor: explicit config path first, then a `PATH`
    /// lookup for `7z`, then absence.
    pub fn resolve_compressor(&self) -> Option<PathBuf> {
        self.compressor
            .clone()
            .or_else(|| which::which("7z").ok())
    }
}

/// Optional on-disk defaults, read by the CLI from
/// `~/.config/bsaforge/config.toml`. CLI flags always override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub default_mod_name_prefix: Option<String>,
    pub default_compression_level: Option<u8>,
    pub tool_paths: ToolPaths,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            default_mod_name_prefix: None,
            default_compression_level: None,
            tool_paths: ToolPaths::default(),
        }
    }
}

impl Profile {
    /// Load the on-disk profile, or the default profile if none exists yet.
    pub fn load() -> Result<Self> {
        let paths = Paths::new();
        let config_path = paths.config_file();

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(&config_path).context("failed to read config file")?;
        toml::from_str(&content).context("failed to parse config file")
    }

    /// Persist the profile to disk, creating the config directory if needed.
    pub fn save(&self) -> Result<()> {
        let paths = Paths::new();
        paths
            .ensure_config_dir()
            .context("failed to create config directory")?;

        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(paths.config_file(), content).context("failed to write config file")?;
        Ok(())
    }
}
