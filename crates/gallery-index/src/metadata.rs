//! Rating, color label and tag sidecars
//!
//! Each image may carry a `<image>.meta.json` file next to it. Missing or
//! malformed sidecars read as empty metadata. Writes merge into the existing
//! document so keys written by other tools survive.

use crate::filter::Predicate;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thumbnail_cache::SourceFile;
use tracing::debug;

pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Highest star rating
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarMetadata {
    /// 0 means unrated
    pub rating: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_color: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SidecarMetadata {
    /// The label, with the "none" placeholder read as no label
    pub fn label(&self) -> Option<&str> {
        self.label_color
            .as_deref()
            .filter(|label| !label.is_empty() && !label.eq_ignore_ascii_case("none"))
    }

    /// Whether any tag contains `needle` (already lowercased)
    pub fn has_tag_containing(&self, needle: &str) -> bool {
        self.tags.iter().any(|tag| tag.to_lowercase().contains(needle))
    }
}

pub fn sidecar_path(image: &Path) -> PathBuf {
    let mut name = OsString::from(image.as_os_str());
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Read the sidecar of `image`; absent or unreadable sidecars yield defaults
pub fn read_metadata(image: &Path) -> SidecarMetadata {
    let path = sidecar_path(image);
    let text = match fs::read_to_string(&path) {
        Ok(text) => text,
        Err(_) => return SidecarMetadata::default(),
    };
    match serde_json::from_str(&text) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Ignoring malformed sidecar {}: {}", path.display(), e);
            SidecarMetadata::default()
        }
    }
}

/// Apply `change` to the current sidecar of `image` and write it back
pub fn update_metadata(
    image: &Path,
    change: impl FnOnce(&mut SidecarMetadata),
) -> Result<SidecarMetadata> {
    let mut metadata = read_metadata(image);
    change(&mut metadata);
    metadata.rating = metadata.rating.min(MAX_RATING);

    let path = sidecar_path(image);
    let json = serde_json::to_string_pretty(&metadata).context("Failed to serialize sidecar")?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(metadata)
}

/// Filters fed by the metadata sidecars
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataFilter {
    /// Exact star rating; 0 selects unrated images
    Rating(u8),
    /// Color label, case-insensitive; "none" selects unlabeled images
    Label(String),
}

impl MetadataFilter {
    pub fn matches(&self, metadata: &SidecarMetadata) -> bool {
        match self {
            MetadataFilter::Rating(rating) => metadata.rating == *rating,
            MetadataFilter::Label(wanted) => match metadata.label() {
                Some(label) => label.eq_ignore_ascii_case(wanted),
                None => wanted.eq_ignore_ascii_case("none"),
            },
        }
    }

    pub fn into_predicate(self) -> Predicate {
        Arc::new(move |source: &SourceFile| self.matches(&read_metadata(&source.path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_malformed_sidecars_read_as_default() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let image = dir.path().join("a.jpg");
        assert_eq!(read_metadata(&image), SidecarMetadata::default());

        fs::write(sidecar_path(&image), "{ not json")?;
        assert_eq!(read_metadata(&image), SidecarMetadata::default());
        Ok(())
    }

    #[test]
    fn test_update_merges_and_keeps_unknown_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let image = dir.path().join("a.jpg");
        fs::write(sidecar_path(&image), r#"{ "label_color": "red", "camera": "x100" }"#)?;

        let updated = update_metadata(&image, |m| m.rating = 9)?;
        assert_eq!(updated.rating, MAX_RATING);

        let reread = read_metadata(&image);
        assert_eq!(reread.rating, MAX_RATING);
        assert_eq!(reread.label(), Some("red"));
        assert_eq!(reread.extra.get("camera"), Some(&serde_json::json!("x100")));
        Ok(())
    }

    #[test]
    fn test_filters() {
        let rated = SidecarMetadata {
            rating: 3,
            label_color: Some("Blue".to_string()),
            ..Default::default()
        };
        let unlabeled = SidecarMetadata {
            label_color: Some("none".to_string()),
            ..Default::default()
        };

        assert!(MetadataFilter::Rating(3).matches(&rated));
        assert!(!MetadataFilter::Rating(0).matches(&rated));
        assert!(MetadataFilter::Rating(0).matches(&unlabeled));
        assert!(MetadataFilter::Label("blue".to_string()).matches(&rated));
        assert!(MetadataFilter::Label("none".to_string()).matches(&unlabeled));
        assert!(!MetadataFilter::Label("none".to_string()).matches(&rated));
    }

    #[test]
    fn test_sidecar_path_appends_suffix() {
        assert_eq!(
            sidecar_path(Path::new("/photos/a.jpg")),
            PathBuf::from("/photos/a.jpg.meta.json")
        );
    }
}
