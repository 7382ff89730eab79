//! Source file snapshots taken at listing time

use crate::error::ThumbnailError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Extensions the generator is expected to decode (compared case-insensitively)
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "webp", "gif", "tif", "tiff",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Image,
    Unsupported,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false);

        if supported {
            FileKind::Image
        } else {
            FileKind::Unsupported
        }
    }
}

/// Immutable snapshot of a file's identity attributes
///
/// A snapshot is never refreshed in place. Whether it went stale is only
/// discovered by resolving its [`Fingerprint`](crate::Fingerprint) again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub kind: FileKind,
}

impl SourceFile {
    /// Stat `path` and take a snapshot. The stored path is canonicalized.
    pub fn snapshot(path: &Path) -> Result<Self, ThumbnailError> {
        let absolute = path
            .canonicalize()
            .map_err(|e| ThumbnailError::invalid_path(path, e))?;
        let metadata =
            fs::metadata(&absolute).map_err(|e| ThumbnailError::invalid_path(&absolute, e))?;
        Ok(Self::from_metadata(absolute, &metadata))
    }

    /// Build a snapshot from metadata the caller already holds (e.g. from a directory walk)
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Self {
        let kind = FileKind::from_path(&path);
        Self {
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
            kind,
            path,
        }
    }

    pub fn file_name(&self) -> Cow<'_, str> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.path.to_string_lossy())
    }

    pub fn is_image(&self) -> bool {
        self.kind == FileKind::Image
    }
}
