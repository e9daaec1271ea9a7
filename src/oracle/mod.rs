//! Game variant identity and the directory oracle (C3).
//!
//! The oracle answers two questions for a given game: what are the
//! canonical top-level directory names of its `Data` layout, and what is
//! the on-disk casing of each one in a particular reference tree?

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// The closed set of game variants this crate understands.
///
/// Selects the oracle's fallback directory set, the archive extension
/// (`bsa` vs `ba2`), and the plugin stub's signature tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameVariant {
    Skyrim,
    SkyrimSe,
    SkyrimAe,
    Fallout4,
    Fallout76,
    Starfield,
}

impl GameVariant {
    /// Parse from the stable identifier used in configuration and the CLI.
    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "skyrim" => Some(Self::Skyrim),
            "skyrim_se" | "skyrimse" => Some(Self::SkyrimSe),
            "skyrim_ae" | "skyrimae" => Some(Self::SkyrimAe),
            "fallout4" => Some(Self::Fallout4),
            "fallout76" => Some(Self::Fallout76),
            "starfield" => Some(Self::Starfield),
            _ => None,
        }
    }

    /// Stable identifier string, the inverse of [`GameVariant::from_id`].
    pub fn id(&self) -> &'static str {
        match self {
            Self::Skyrim => "skyrim",
            Self::SkyrimSe => "skyrim_se",
            Self::SkyrimAe => "skyrim_ae",
            Self::Fallout4 => "fallout4",
            Self::Fallout76 => "fallout76",
            Self::Starfield => "starfield",
        }
    }

    /// Archive file extension used by this game's engine (without the dot).
    pub fn archive_extension(&self) -> &'static str {
        match self {
            Self::Skyrim | Self::SkyrimSe | Self::SkyrimAe => "bsa",
            Self::Fallout4 | Self::Fallout76 | Self::Starfield => "ba2",
        }
    }

    /// Plugin record signature this game's engine expects in a header.
    pub fn plugin_signature(&self) -> &'static [u8; 4] {
        match self {
            Self::Skyrim => b"TES4",
            Self::SkyrimSe | Self::SkyrimAe | Self::Fallout4 | Self::Fallout76 | Self::Starfield => {
                b"TES4"
            }
        }
    }

    /// Game flag passed to a `bsarch`-style archive builder resolved from
    /// `PATH` (see [`crate::config::ToolPaths::resolve_archive_builder`]).
    pub fn bsarch_game_flag(&self) -> &'static str {
        match self {
            Self::Skyrim => "tes5",
            Self::SkyrimSe | Self::SkyrimAe => "sse",
            Self::Fallout4 => "fo4",
            Self::Fallout76 => "fo76",
            Self::Starfield => "sf",
        }
    }

    /// Built-in fallback top-level directory names, used when the
    /// reference root is unavailable or unreadable.
    fn fallback_directories(&self) -> &'static [&'static str] {
        const COMMON: &[&str] = &[
            "meshes",
            "textures",
            "sounds",
            "music",
            "scripts",
            "interface",
            "actors",
            "materials",
            "shaders",
            "strings",
            "video",
            "seq",
            "grass",
            "lodsettings",
            "facegendata",
            "facegeom",
        ];
        COMMON
    }
}

/// Case-preserved top-level directory set for a resolved game/reference
/// pair. `lower` is the case-folded set used for membership tests; `actual`
/// maps a case-folded name to the casing observed (or assumed) on disk.
#[derive(Debug, Clone, Default)]
pub struct GameDirectorySet {
    lower: HashSet<String>,
    actual: HashMap<String, String>,
}

impl GameDirectorySet {
    /// Whether `name` (any case) names a canonical top-level directory.
    pub fn contains(&self, name: &str) -> bool {
        self.lower.contains(&name.to_ascii_lowercase())
    }

    /// The on-disk (or assumed) casing for a case-folded directory name.
    /// Falls back to the lowercase form itself when no casing was observed.
    pub fn actual_casing(&self, lower_name: &str) -> String {
        self.actual
            .get(lower_name)
            .cloned()
            .unwrap_or_else(|| lower_name.to_string())
    }

    fn insert(&mut self, actual_name: &str) {
        let lower = actual_name.to_ascii_lowercase();
        self.actual.entry(lower.clone()).or_insert_with(|| actual_name.to_string());
        self.lower.insert(lower);
    }
}

/// C3: Game Directory Oracle.
///
/// `enumerate` is total — it never fails. If `reference_root` is missing or
/// unreadable, only the built-in fallback set is returned.
pub fn enumerate(variant: GameVariant, reference_root: Option<&Path>) -> GameDirectorySet {
    let mut set = GameDirectorySet::default();

    if let Some(root) = reference_root {
        if let Ok(entries) = std::fs::read_dir(root) {
            for entry in entries.flatten() {
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if !file_type.is_dir() {
                    continue;
                }
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                set.insert(&name);
            }
        } else {
            tracing::debug!(
                root = %root.display(),
                "reference root unreadable, falling back to built-in directory set"
            );
        }
    }

    for name in variant.fallback_directories() {
        if !set.lower.contains(*name) {
            set.insert(name);
        }
    }

    set
}
