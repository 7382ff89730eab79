//! Error taxonomy for the thumbnail pipeline
//!
//! Every failure the resolver, generator or store can produce is a
//! [`ThumbnailError`]. The scheduler never lets one escape a worker: it is
//! folded into a per-request failure event carrying the [`ErrorKind`].

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    /// Source vanished or moved between listing and resolution
    #[error("source file is missing or unreadable: {}", path.display())]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Corrupt or unsupported image
    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error("failed to encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),

    /// Disk full, permission denied and friends
    #[error("failed to write cache entry {}: {source}", path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache entry {} is unreadable", path.display())]
    CacheCorruption { path: PathBuf },

    /// The cache root could not be created or written at startup
    #[error("cache root {} is not writable: {source}", path.display())]
    CacheUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache I/O error at {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start thumbnail workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Serializable discriminant of [`ThumbnailError`], carried in failure events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidPath,
    Decode,
    Encode,
    CacheWrite,
    CacheCorruption,
    CacheUnavailable,
    CacheIo,
    WorkerPool,
}

impl ThumbnailError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ThumbnailError::InvalidPath { .. } => ErrorKind::InvalidPath,
            ThumbnailError::Decode { .. } => ErrorKind::Decode,
            ThumbnailError::Encode(_) => ErrorKind::Encode,
            ThumbnailError::CacheWrite { .. } => ErrorKind::CacheWrite,
            ThumbnailError::CacheCorruption { .. } => ErrorKind::CacheCorruption,
            ThumbnailError::CacheUnavailable { .. } => ErrorKind::CacheUnavailable,
            ThumbnailError::CacheIo { .. } => ErrorKind::CacheIo,
            ThumbnailError::WorkerPool(_) => ErrorKind::WorkerPool,
        }
    }

    pub(crate) fn invalid_path(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ThumbnailError::InvalidPath {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn cache_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ThumbnailError::CacheIo {
            path: path.into(),
            source,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::InvalidPath => "invalid path",
            ErrorKind::Decode => "decode error",
            ErrorKind::Encode => "encode error",
            ErrorKind::CacheWrite => "cache write error",
            ErrorKind::CacheCorruption => "cache corruption",
            ErrorKind::CacheUnavailable => "cache unavailable",
            ErrorKind::CacheIo => "cache I/O error",
            ErrorKind::WorkerPool => "worker pool error",
        };
        f.write_str(name)
    }
}
