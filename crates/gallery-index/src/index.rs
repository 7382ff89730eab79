//! The ordered, filterable view over the gallery folders
//!
//! `GalleryIndex` owns the scanned snapshots and the current view (active
//! group, filter, sort). It feeds the scheduler in viewport-first order and
//! keeps track of which requests are still outstanding, so that files leaving
//! the view have their requests withdrawn.
//!
//! Re-sorting and re-filtering only reorder snapshots. Nothing is
//! re-fingerprinted or regenerated.

use crate::filter::Filter;
use crate::scan::{scan_folder, FolderGroups};
use crate::sort::SortOrder;
use crate::viewport::{priority_order, Viewport};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thumbnail_cache::{
    ErrorKind, RequestId, ResizeMode, SourceFile, TargetSize, ThumbnailConfig, ThumbnailEvent,
    ThumbnailRequest, ThumbnailScheduler,
};
use tracing::{debug, info, warn};

pub struct GalleryIndex {
    scheduler: Arc<ThumbnailScheduler>,
    target: TargetSize,
    mode: ResizeMode,

    folders: Vec<PathBuf>,
    groups: FolderGroups,
    active: Option<PathBuf>,
    sort: SortOrder,
    filter: Filter,
    entries: Vec<SourceFile>,

    outstanding: HashMap<RequestId, SourceFile>,
    by_path: HashMap<PathBuf, RequestId>,
    needs_refresh: bool,
}

impl GalleryIndex {
    pub fn new(scheduler: Arc<ThumbnailScheduler>, config: &ThumbnailConfig, sort: SortOrder) -> Self {
        Self {
            scheduler,
            target: config.target,
            mode: config.mode,
            folders: Vec::new(),
            groups: FolderGroups::new(),
            active: None,
            sort,
            filter: Filter::new(),
            entries: Vec::new(),
            outstanding: HashMap::new(),
            by_path: HashMap::new(),
            needs_refresh: false,
        }
    }

    /// Add and scan a gallery folder. Adding a known folder rescans it.
    ///
    /// Returns the number of images found under it.
    pub fn add_folder(&mut self, folder: &Path) -> Result<usize> {
        let folder = folder
            .canonicalize()
            .with_context(|| format!("Failed to open folder {}", folder.display()))?;
        let scanned = scan_folder(&folder)?;
        let found = scanned.values().map(Vec::len).sum();

        self.groups.retain(|dir, _| !dir.starts_with(&folder));
        self.groups.extend(scanned);
        if !self.folders.contains(&folder) {
            self.folders.push(folder.clone());
        }

        info!("Added {} ({} images)", folder.display(), found);
        self.rebuild();
        Ok(found)
    }

    /// Remove a gallery folder. Requests for its files are cancelled.
    ///
    /// Returns false when the folder was not part of the gallery.
    pub fn remove_folder(&mut self, folder: &Path) -> bool {
        let folder = folder.canonicalize().unwrap_or_else(|_| folder.to_path_buf());
        let before = self.folders.len();
        self.folders.retain(|known| known != &folder);
        if self.folders.len() == before {
            return false;
        }

        // Keep groups still covered by another (enclosing) folder
        let folders = &self.folders;
        self.groups.retain(|dir, _| {
            !dir.starts_with(&folder) || folders.iter().any(|other| dir.starts_with(other))
        });
        if self.active.as_ref().is_some_and(|dir| !self.groups.contains_key(dir)) {
            self.active = None;
        }

        info!("Removed {}", folder.display());
        self.rebuild();
        true
    }

    /// Re-scan every folder, e.g. after an `InvalidPath` failure.
    ///
    /// Folders that fail to scan are dropped. When every folder fails the
    /// listing is left as it was and the last error is returned.
    pub fn refresh(&mut self) -> Result<()> {
        let mut groups = FolderGroups::new();
        let mut kept = Vec::with_capacity(self.folders.len());
        let mut last_error = None;
        for folder in &self.folders {
            match scan_folder(folder) {
                Ok(scanned) => {
                    groups.extend(scanned);
                    kept.push(folder.clone());
                }
                Err(e) => {
                    warn!("Dropping folder {}: {:#}", folder.display(), e);
                    last_error = Some(e);
                }
            }
        }
        if kept.is_empty() {
            if let Some(e) = last_error {
                return Err(e.context("No gallery folder could be rescanned"));
            }
        }

        self.folders = kept;
        self.groups = groups;
        if self.active.as_ref().is_some_and(|dir| !self.groups.contains_key(dir)) {
            self.active = None;
        }
        self.needs_refresh = false;
        self.rebuild();
        Ok(())
    }

    /// Show one directory group, or every group when `None`
    pub fn open(&mut self, dir: Option<&Path>) -> Result<()> {
        self.active = match dir {
            Some(dir) => {
                let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
                if !self.groups.contains_key(&dir) {
                    anyhow::bail!("{} is not a gallery directory", dir.display());
                }
                Some(dir)
            }
            None => None,
        };
        self.rebuild();
        Ok(())
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
        self.rebuild();
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = filter;
        self.rebuild();
    }

    /// Submit thumbnail requests for the current entries, viewport first.
    ///
    /// Files that already have a request outstanding are not resubmitted.
    pub fn request_thumbnails(&mut self, viewport: Viewport) -> Vec<RequestId> {
        let mut submitted = Vec::new();
        for (index, priority) in priority_order(self.entries.len(), viewport) {
            let source = &self.entries[index];
            if self.by_path.contains_key(&source.path) {
                continue;
            }

            let request = ThumbnailRequest::new(source.clone(), self.target, self.mode)
                .with_priority(priority);
            let id = self.scheduler.submit(request);
            self.by_path.insert(source.path.clone(), id);
            self.outstanding.insert(id, source.clone());
            submitted.push(id);
        }
        debug!(submitted = submitted.len(), outstanding = self.outstanding.len(), "requested thumbnails");
        submitted
    }

    /// Record a scheduler event and return the entry it belongs to.
    ///
    /// Events for requests this index no longer tracks return `None`.
    pub fn settle(&mut self, event: &ThumbnailEvent) -> Option<SourceFile> {
        let source = self.outstanding.remove(&event.request_id())?;
        self.by_path.remove(&source.path);

        if let ThumbnailEvent::Failed(failure) = event {
            if failure.kind == ErrorKind::InvalidPath {
                self.needs_refresh = true;
            }
        }
        Some(source)
    }

    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    pub fn entries(&self) -> &[SourceFile] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    /// Directory groups with their image counts, ignoring the filter
    pub fn groups(&self) -> impl Iterator<Item = (&Path, usize)> {
        self.groups.iter().map(|(dir, files)| (dir.as_path(), files.len()))
    }

    /// Every image under the gallery folders, ignoring the view
    pub fn all_files(&self) -> impl Iterator<Item = &SourceFile> {
        self.groups.values().flatten()
    }

    pub fn active(&self) -> Option<&Path> {
        self.active.as_deref()
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn scheduler(&self) -> &Arc<ThumbnailScheduler> {
        &self.scheduler
    }

    fn rebuild(&mut self) {
        let mut entries: Vec<SourceFile> = match &self.active {
            Some(dir) => self.groups.get(dir).cloned().unwrap_or_default(),
            None => self.groups.values().flatten().cloned().collect(),
        };
        if !self.filter.is_empty() {
            entries.retain(|source| self.filter.matches(source));
        }
        self.sort.apply(&mut entries);
        self.entries = entries;
        self.cancel_departed();
    }

    fn cancel_departed(&mut self) {
        let live: HashSet<&Path> = self.entries.iter().map(|s| s.path.as_path()).collect();
        let departed: Vec<RequestId> = self
            .outstanding
            .iter()
            .filter(|(_, source)| !live.contains(source.path.as_path()))
            .map(|(id, _)| *id)
            .collect();
        if departed.is_empty() {
            return;
        }

        let cancelled = self.scheduler.cancel_many(departed.iter().copied());
        for id in &departed {
            if let Some(source) = self.outstanding.remove(id) {
                self.by_path.remove(&source.path);
            }
        }
        debug!(departed = departed.len(), cancelled, "withdrew requests for files leaving the view");
    }
}

impl std::fmt::Debug for GalleryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GalleryIndex")
            .field("folders", &self.folders)
            .field("groups", &self.groups.len())
            .field("active", &self.active)
            .field("sort", &self.sort)
            .field("entries", &self.entries.len())
            .field("outstanding", &self.outstanding.len())
            .finish()
    }
}
