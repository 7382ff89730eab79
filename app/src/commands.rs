use crate::cli::ThumbsArgs;
use anyhow::{bail, Context as _, Result};
use bytesize::ByteSize;
use chrono::{DateTime, Local};
use gallery_index::{scan_folder, Filter, GalleryIndex, MetadataFilter, Preferences, Viewport};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thumbnail_cache::{
    CacheStore, Fingerprint, Provenance, TargetSize, ThumbnailEvent, ThumbnailScheduler,
};
use tracing::{info, warn};

/// Longest wait for a single thumbnail before giving up
const EVENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings shared by every subcommand
#[derive(Debug)]
pub struct Context {
    pub prefs: Preferences,
}

impl Context {
    pub fn load(prefs_path: Option<&Path>, cache_root: Option<PathBuf>) -> Result<Self> {
        let mut prefs = match prefs_path {
            Some(path) => Preferences::load(path)?,
            None => Preferences::load_default()?,
        };
        if let Some(root) = cache_root {
            prefs.thumbnails.cache_root = Some(root);
        }
        Ok(Self { prefs })
    }

    /// The folders named on the command line, or the configured ones
    fn folders(&self, explicit: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
        let folders = if explicit.is_empty() {
            self.prefs.folders.clone()
        } else {
            explicit
        };
        if folders.is_empty() {
            bail!("No folders given and none configured in the preferences");
        }
        Ok(folders)
    }

    fn open_store(&self) -> Result<CacheStore> {
        let root = self.prefs.thumbnails.cache_root()?;
        Ok(CacheStore::open(root, &self.prefs.thumbnails)?)
    }
}

pub fn scan(ctx: &Context, folders: Vec<PathBuf>) -> Result<()> {
    let mut images = 0usize;
    let mut bytes = 0u64;

    for folder in ctx.folders(folders)? {
        let groups = scan_folder(&folder)?;
        for (dir, files) in &groups {
            let size: u64 = files.iter().map(|f| f.size).sum();
            let latest = files
                .iter()
                .map(|f| f.modified)
                .max()
                .map(format_time)
                .unwrap_or_default();
            println!(
                "{}  {} images, {}, latest {}",
                dir.display(),
                files.len(),
                ByteSize::b(size),
                latest
            );
            images += files.len();
            bytes += size;
        }
    }

    println!("{} images, {}", images, ByteSize::b(bytes));
    Ok(())
}

pub fn thumbs(ctx: &Context, args: ThumbsArgs) -> Result<()> {
    let mut config = ctx.prefs.thumbnails.clone();
    config.target = TargetSize::new(
        args.width.unwrap_or(config.target.width),
        args.height.unwrap_or(config.target.height),
    );
    if config.target.width == 0 || config.target.height == 0 {
        bail!("Thumbnail size must be at least 1x1, got {}", config.target);
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    let sort = args.sort.unwrap_or(ctx.prefs.sort);

    let (store, problem) = CacheStore::open_or_degrade(&config);
    if let (Some(max), true) = (config.max_disk_bytes, store.is_persistent()) {
        match store.trim_to(max) {
            Ok(0) => {}
            Ok(removed) => info!("Trimmed {} old thumbnails to stay under {}", removed, ByteSize::b(max)),
            Err(e) => warn!("Could not trim the cache: {}", e),
        }
    }

    let scheduler = Arc::new(ThumbnailScheduler::new(Arc::new(store), &config)?);
    let mut index = GalleryIndex::new(Arc::clone(&scheduler), &config, sort);
    for folder in ctx.folders(args.folders)? {
        if let Err(e) = index.add_folder(&folder) {
            warn!("Skipping {}: {:#}", folder.display(), e);
        }
    }

    let mut filter = Filter::new();
    if let Some(text) = &args.search {
        filter = filter.with_search(text);
    }
    if let Some(rating) = args.rating {
        filter = filter.with_metadata(MetadataFilter::Rating(rating));
    }
    if let Some(label) = args.label {
        filter = filter.with_metadata(MetadataFilter::Label(label));
    }
    index.set_filter(filter);

    let started = Instant::now();
    let ids = index.request_thumbnails(Viewport::new(0, args.visible));
    info!(
        "Requested {} thumbnails at {} ({}) on {} workers",
        ids.len(),
        config.target,
        config.mode,
        scheduler.worker_count()
    );

    let results = scheduler.results();
    let mut failed = 0usize;
    while index.outstanding() > 0 {
        let event = results
            .recv_timeout(EVENT_TIMEOUT)
            .context("Timed out waiting for thumbnails")?;
        let Some(source) = index.settle(&event) else {
            continue;
        };
        match &event {
            ThumbnailEvent::Ready(result) => {
                let (width, height) = result.dimensions();
                let origin = match result.provenance {
                    Provenance::CacheHit => "cached",
                    Provenance::Generated => "generated",
                };
                println!("ok    {}  {}x{}  {}", source.path.display(), width, height, origin);
            }
            ThumbnailEvent::Failed(failure) => {
                failed += 1;
                println!("fail  {}  {}: {}", source.path.display(), failure.kind, failure.message);
            }
        }
    }

    if index.needs_refresh() {
        info!("Some files vanished while listing; rescanning");
        if let Err(e) = index.refresh() {
            warn!("Rescan failed: {:#}", e);
        }
    }

    let stats = scheduler.stats();
    println!(
        "{} thumbnails in {:.1}s: {} from cache, {} generated, {} failed",
        ids.len(),
        started.elapsed().as_secs_f64(),
        stats.cache_hits,
        stats.generated,
        failed
    );
    if let Some(e) = problem {
        println!("Thumbnails were not saved: {}", e);
    }
    Ok(())
}

pub fn cache_info(ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let manifest = store.manifest()?;

    let root = manifest
        .root
        .as_deref()
        .map(|root| root.display().to_string())
        .unwrap_or_else(|| "(memory only)".to_string());
    println!("root     {}", root);
    println!("entries  {}", manifest.entry_count);
    println!("size     {}", ByteSize::b(manifest.total_bytes));
    if let Some(max) = ctx.prefs.thumbnails.max_disk_bytes {
        println!("limit    {}", ByteSize::b(max));
    }
    Ok(())
}

pub fn cache_clear(ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let removed = store.clear()?;
    println!("Removed {} cached thumbnails", removed);
    Ok(())
}

pub fn cache_trim(ctx: &Context, max_mb: u64) -> Result<()> {
    let store = ctx.open_store()?;
    let removed = store.trim_to(max_mb.saturating_mul(1024 * 1024))?;
    println!(
        "Removed {} thumbnails; cache is now {}",
        removed,
        ByteSize::b(store.total_size()?)
    );
    Ok(())
}

/// Remove entries whose source is no longer under any of `folders`.
///
/// A folder that fails to scan aborts the sweep, so nothing live is removed.
pub fn cache_sweep(ctx: &Context, folders: Vec<PathBuf>) -> Result<()> {
    let mut live = HashSet::new();
    for folder in ctx.folders(folders)? {
        let groups = scan_folder(&folder)?;
        live.extend(
            groups
                .values()
                .flatten()
                .map(|f| Fingerprint::from_parts(&f.path, f.size, f.modified)),
        );
    }

    let store = ctx.open_store()?;
    let removed = store.sweep_orphans(&live)?;
    println!("Removed {} orphaned thumbnails, kept {}", removed, store.entry_count()?);
    Ok(())
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string()
}
