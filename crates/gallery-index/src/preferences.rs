//! Persisted user preferences
//!
//! Read once at startup and treated as read-only by everything downstream.
//!
//! ```json
//! {
//!   "folders": ["/home/me/Pictures"],
//!   "sort": { "key": "date", "direction": "descending" },
//!   "thumbnails": { "target": { "width": 220, "height": 124 }, "mode": "crop" }
//! }
//! ```

use crate::sort::SortOrder;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thumbnail_cache::ThumbnailConfig;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Gallery folders, scanned at startup
    pub folders: Vec<PathBuf>,
    pub sort: SortOrder,
    pub thumbnails: ThumbnailConfig,
}

impl Preferences {
    /// `<platform config dir>/galleria/preferences.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("galleria").join("preferences.json"))
    }

    /// Load from `path`. A missing file yields defaults, and so does a malformed
    /// one after a warning; only an unreadable file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No preferences at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        match serde_json::from_str(&text) {
            Ok(prefs) => Ok(prefs),
            Err(e) => {
                warn!("Ignoring malformed preferences {}: {}", path.display(), e);
                Ok(Self::default())
            }
        }
    }

    /// Load from the platform location, or defaults when there is none
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize preferences")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
