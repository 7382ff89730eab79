//! Cache keys derived from file identity
//!
//! A fingerprint hashes the absolute path, byte size and modification time of
//! a source file. File contents are never read, so resolving a key costs one
//! `stat`. Files that keep all three attributes are treated as identical even
//! if their bytes changed.

use crate::error::ThumbnailError;
use crate::source::SourceFile;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of hex characters in a fingerprint (16 digest bytes)
pub const FINGERPRINT_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Resolve the fingerprint of `source` as the file exists right now.
    ///
    /// The file is stat'ed again, so a snapshot whose file was edited since
    /// listing yields the new key. Fails with `InvalidPath` when the file is gone.
    pub fn resolve(source: &SourceFile) -> Result<Self, ThumbnailError> {
        let metadata =
            fs::metadata(&source.path).map_err(|e| ThumbnailError::invalid_path(&source.path, e))?;
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        Ok(Self::from_parts(&source.path, metadata.len(), modified))
    }

    /// Pure derivation from identity attributes
    pub fn from_parts(path: &Path, size: u64, modified: SystemTime) -> Self {
        let absolute_path = path.to_string_lossy();
        let modified_ms = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(absolute_path.as_bytes());
        hasher.update(size.to_le_bytes());
        hasher.update(modified_ms.to_le_bytes());

        let digest = hasher.finalize();
        Self(hex::encode(&digest[..FINGERPRINT_LEN / 2]))
    }

    /// Parse a fingerprint back from a cache file stem
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == FINGERPRINT_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
