//! XDG-compliant path management for the optional on-disk profile.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths, resolved via the XDG base directory specification.
#[derive(Debug, Clone)]
pub struct Paths {
    dirs: ProjectDirs,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    /// Create a new Paths instance
    pub fn new() -> Self {
        let dirs = ProjectDirs::from("", "", "bsaforge")
            .expect("failed to determine project directories");
        Self { dirs }
    }

    /// Config directory: ~/.config/bsaforge/
    pub fn config_dir(&self) -> PathBuf {
        self.dirs.config_dir().to_path_buf()
    }

    /// Profile file: ~/.config/bsaforge/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir().join("config.toml")
    }

    pub fn ensure_config_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())
    }
}
