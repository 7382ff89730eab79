//! Thumbnail generation and caching engine for Galleria
//!
//! Turns arbitrarily large image files into uniformly sized previews, persists
//! them on disk keyed by source-file identity, and serves them to an
//! interactive front-end without blocking it.
//!
//! # Features
//!
//! - **Identity keys**: fingerprints from path, size and mtime; no content reads
//! - **Dual caching**: byte-budgeted in-memory LRU in front of an atomic disk store
//! - **Crop or fit**: center-cropped grid tiles or aspect-preserving previews
//! - **Bounded pool**: rayon workers sized to the machine, visible items first
//! - **Deduplication**: at most one generation in flight per fingerprint
//! - **Streaming**: results arrive on a channel in completion order
//! - **Graceful degradation**: an unwritable cache root falls back to memory only

pub mod error;
pub mod fingerprint;
pub mod generate;
pub mod lru;
pub mod scheduler;
pub mod source;
pub mod store;

pub use error::{ErrorKind, ThumbnailError};
pub use fingerprint::Fingerprint;
pub use generate::{
    encode_thumbnail, generate_thumbnail, resize_image, source_dimensions, Generate, ImageGenerator, ResizeMode,
    TargetSize, ThumbnailFormat,
};
pub use lru::ByteBudgetLru;
pub use scheduler::{
    Priority, Provenance, RequestId, RequestState, SchedulerStats, ThumbnailEvent,
    ThumbnailFailure, ThumbnailRequest, ThumbnailResult, ThumbnailScheduler,
};
pub use source::{FileKind, SourceFile, SUPPORTED_EXTENSIONS};
pub use store::{CacheEntry, CacheManifest, CacheStore};

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;

/// Cache layout version; bump when the entry format changes
pub const CACHE_VERSION: &str = "v1";

/// Thumbnail settings, constructed once at startup and passed to the store and scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub target: TargetSize,
    pub mode: ResizeMode,
    pub format: ThumbnailFormat,
    pub jpeg_quality: u8,
    /// Worker threads; 0 picks one less than the available parallelism
    pub workers: usize,
    /// Byte budget of the decoded in-memory front; 0 disables it
    pub memory_budget: usize,
    /// Upper bound for the on-disk cache, enforced by `CacheStore::trim_to`
    pub max_disk_bytes: Option<u64>,
    /// Overrides the platform cache directory
    pub cache_root: Option<PathBuf>,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            target: TargetSize::new(220, 124),
            mode: ResizeMode::Crop,
            format: ThumbnailFormat::Jpeg,
            jpeg_quality: 90,
            workers: 0,
            memory_budget: 64 * 1024 * 1024, // 64MB
            max_disk_bytes: None,
            cache_root: None,
        }
    }
}

impl ThumbnailConfig {
    /// Number of pool threads to start
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }

    /// The configured cache root, or the versioned platform default
    pub fn cache_root(&self) -> Result<PathBuf, ThumbnailError> {
        match &self.cache_root {
            Some(root) => Ok(root.clone()),
            None => default_cache_root(),
        }
    }
}

/// `<platform cache dir>/galleria/thumbnails/<version>`
pub fn default_cache_root() -> Result<PathBuf, ThumbnailError> {
    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
        .ok_or_else(|| ThumbnailError::CacheUnavailable {
            path: PathBuf::from("galleria"),
            source: io::Error::new(io::ErrorKind::NotFound, "no cache or home directory"),
        })?;
    Ok(base.join("galleria").join("thumbnails").join(CACHE_VERSION))
}
