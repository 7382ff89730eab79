//! Recursive folder scanning
//!
//! A folder is walked once and its images are grouped by the directory that
//! directly contains them, so a photo library with nested albums shows one
//! group per album.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thumbnail_cache::SourceFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Images grouped by containing directory, each group sorted by path
pub type FolderGroups = BTreeMap<PathBuf, Vec<SourceFile>>;

/// Walk `root` and snapshot every supported image below it.
///
/// Entries that cannot be read are logged and skipped; only a missing or
/// unreadable `root` is an error.
pub fn scan_folder(root: &Path) -> Result<FolderGroups> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Failed to open folder {}", root.display()))?;
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    let mut groups = FolderGroups::new();
    let mut skipped = 0usize;

    for entry in WalkDir::new(&root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                skipped += 1;
                continue;
            }
        };
        let source = SourceFile::from_metadata(entry.path().to_path_buf(), &metadata);
        if !source.is_image() {
            continue;
        }

        let parent = source
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());
        groups.entry(parent).or_default().push(source);
    }

    for files in groups.values_mut() {
        files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    debug!(
        root = %root.display(),
        groups = groups.len(),
        images = groups.values().map(Vec::len).sum::<usize>(),
        skipped,
        "scanned folder"
    );
    Ok(groups)
}
