//! Plugin stub emitter (C8): writes a minimal TES4 header record so the
//! packaged archive has a plugin to load it, without carrying any real
//! game records.

use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FLAG_MASTER: u32 = 0x0000_0001;
const FLAG_LIGHT: u32 = 0x0000_0200;

#[derive(Debug, Error)]
pub enum StubError {
    #[error("failed to write plugin stub {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Extension a plugin stub should be written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginExtension {
    Esp,
    Esm,
    Esl,
}

impl PluginExtension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Esp => "esp",
            Self::Esm => "esm",
            Self::Esl => "esl",
        }
    }

    fn flag(&self) -> u32 {
        match self {
            Self::Esp => 0,
            Self::Esm => FLAG_MASTER,
            Self::Esl => FLAG_LIGHT,
        }
    }
}

/// C8: write a minimal TES4 header record at `out_path`.
///
/// `masters` are recorded as `MAST`/`DATA` subrecord pairs so the stub can
/// declare dependence on the base game's masters; callers typically pass
/// an empty list.
pub fn write_plugin_stub(
    out_path: &Path,
    extension: PluginExtension,
    masters: &[String],
) -> Result<(), StubError> {
    let mut body = Vec::new();

    for master in masters {
        write_subrecord(&mut body, b"MAST", &null_terminated(master));
        write_subrecord(&mut body, b"DATA", &0u64.to_le_bytes());
    }

    let mut file = std::fs::File::create(out_path).map_err(|source| StubError::Io {
        path: out_path.to_path_buf(),
        source,
    })?;

    let write_all = |file: &mut std::fs::File, buf: &[u8]| -> Result<(), StubError> {
        file.write_all(buf).map_err(|source| StubError::Io {
            path: out_path.to_path_buf(),
            source,
        })
    };

    write_all(&mut file, b"TES4")?;
    write_all(&mut file, &(body.len() as u32).to_le_bytes())?;
    write_all(&mut file, &(FLAG_MASTER | extension.flag()).to_le_bytes())?;
    // Form ID (4 bytes, always 0 for the header record) + version info (4 bytes).
    write_all(&mut file, &[0u8; 8])?;
    write_all(&mut file, &body)?;

    Ok(())
}

fn null_terminated(s: &str) -> Vec<u8> {
    let mut out = s.as_bytes().to_vec();
    out.push(0);
    out
}

fn write_subrecord(buf: &mut Vec<u8>, tag: &[u8; 4], data: &[u8]) {
    buf.extend_from_slice(tag);
    buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
    buf.extend_from_slice(data);
}
