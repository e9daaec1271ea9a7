//! Content fingerprinting (C2).
//!
//! Digests are the sole gate for "are these two files the same content" —
//! see the Digest Law in spec. BLAKE3 is used for its streaming API and
//! cryptographic collision resistance; equality of digests implies equality
//! of bytes for any practical adversary.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 32-byte content fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("failed to hash {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

const BLOCK_SIZE: usize = 64 * 1024;

/// Stream `path` in fixed-size blocks and return its content digest.
/// Never loads the whole file into memory.
pub fn digest_file(path: &Path) -> Result<Digest, DigestError> {
    let mut file = File::open(path).map_err(|source| DigestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let read = file.read(&mut buf).map_err(|source| DigestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(Digest(*hasher.finalize().as_bytes()))
}

/// Compare two files by content. `equal(a, b) := digest(a) == digest(b)`.
///
/// Per the Classifier's short-circuit allowance, a size mismatch is
/// reported as unequal without hashing either file.
pub fn files_equal(a: &Path, b: &Path) -> Result<bool, DigestError> {
    let (size_a, size_b) = (
        std::fs::metadata(a)
            .map_err(|source| DigestError::Io { path: a.to_path_buf(), source })?
            .len(),
        std::fs::metadata(b)
            .map_err(|source| DigestError::Io { path: b.to_path_buf(), source })?
            .len(),
    );
    if size_a != size_b {
        return Ok(false);
    }
    if size_a == 0 {
        return Ok(true);
    }

    Ok(digest_file(a)? == digest_file(b)?)
}
