//! Disk-backed thumbnail store with an in-memory front
//!
//! Each entry is a single file `<fingerprint>.<ext>` directly under the cache
//! root. Writes go to a `.tmp-*` file in the same directory and are renamed
//! into place, so readers never observe a partial thumbnail. Temp files are
//! invisible to size accounting, `clear`, `trim_to` and `sweep_orphans`.
//!
//! An entry that exists but cannot be decoded is treated as a miss: it is
//! removed and the caller regenerates it.
//!
//! `clear` does not coordinate with concurrent `put` calls. A put that renames
//! its file after a clear simply leaves that entry behind (last writer wins).

use crate::error::ThumbnailError;
use crate::fingerprint::Fingerprint;
use crate::generate::{encode_thumbnail, ThumbnailFormat};
use crate::lru::ByteBudgetLru;
use crate::ThumbnailConfig;
use image::{DynamicImage, GenericImageView};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const TEMP_PREFIX: &str = ".tmp-";

/// Metadata of one stored thumbnail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    /// `None` when the store runs memory-only
    pub path: Option<PathBuf>,
    pub format: ThumbnailFormat,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub created: SystemTime,
}

/// Aggregate view of the cache for the management UI. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheManifest {
    pub root: Option<PathBuf>,
    pub total_bytes: u64,
    pub entry_count: usize,
    pub memory_entries: usize,
    pub memory_bytes: usize,
}

#[derive(Clone)]
struct MemoryEntry {
    entry: CacheEntry,
    bitmap: Arc<DynamicImage>,
}

/// Main thumbnail store
pub struct CacheStore {
    root: Option<PathBuf>,
    jpeg_quality: u8,
    memory: ByteBudgetLru<Fingerprint, MemoryEntry>,
}

impl CacheStore {
    /// Open a persistent store rooted at `root`, creating it if needed.
    ///
    /// Fails with `CacheUnavailable` when the directory cannot be created or written.
    pub fn open(root: impl Into<PathBuf>, config: &ThumbnailConfig) -> Result<Self, ThumbnailError> {
        let root = root.into();
        let unavailable = |source: io::Error| ThumbnailError::CacheUnavailable {
            path: root.clone(),
            source,
        };

        fs::create_dir_all(&root).map_err(unavailable)?;
        // Probe writability the same way puts write: a temp file in the root
        tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&root)
            .map_err(unavailable)?;

        info!(root = %root.display(), "opened thumbnail cache");
        Ok(Self {
            root: Some(root),
            jpeg_quality: config.jpeg_quality,
            memory: ByteBudgetLru::new(config.memory_budget),
        })
    }

    /// A store that keeps thumbnails in memory only
    pub fn memory_only(config: &ThumbnailConfig) -> Self {
        Self {
            root: None,
            jpeg_quality: config.jpeg_quality,
            memory: ByteBudgetLru::new(config.memory_budget),
        }
    }

    /// Open the configured root, or fall back to a memory-only store.
    ///
    /// The startup error is returned alongside the degraded store so the
    /// caller can surface it once.
    pub fn open_or_degrade(config: &ThumbnailConfig) -> (Self, Option<ThumbnailError>) {
        let opened = config
            .cache_root()
            .and_then(|root| Self::open(root, config));
        match opened {
            Ok(store) => (store, None),
            Err(e) => {
                warn!("thumbnail cache disabled, keeping thumbnails in memory only: {}", e);
                (Self::memory_only(config), Some(e))
            }
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn is_persistent(&self) -> bool {
        self.root.is_some()
    }

    fn entry_path(root: &Path, fingerprint: &Fingerprint, format: ThumbnailFormat) -> PathBuf {
        root.join(format!("{}.{}", fingerprint, format.extension()))
    }

    /// Look up an entry without decoding it. A missing entry is not an error.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        if let Some(hit) = self.memory_hit(fingerprint) {
            return Some(hit.entry);
        }
        match self.probe_disk(fingerprint) {
            DiskProbe::Found(entry) => Some(entry),
            DiskProbe::Missing | DiskProbe::Unreadable(_) => None,
        }
    }

    /// A memory-front hit whose disk file, if it has one, is still the one we wrote.
    /// A copy whose file went missing or changed size is dropped.
    fn memory_hit(&self, fingerprint: &Fingerprint) -> Option<MemoryEntry> {
        let hit = self.memory.get(fingerprint)?;
        if let Some(path) = hit.entry.path.as_deref() {
            let intact = fs::metadata(path).is_ok_and(|m| m.len() == hit.entry.byte_size);
            if !intact {
                debug!(entry = %path.display(), "cache file changed on disk; dropping memory copy");
                self.memory.remove(fingerprint);
                return None;
            }
        }
        Some(hit)
    }

    fn probe_disk(&self, fingerprint: &Fingerprint) -> DiskProbe {
        let Some(root) = self.root.as_deref() else {
            return DiskProbe::Missing;
        };

        for format in ThumbnailFormat::ALL {
            let path = Self::entry_path(root, fingerprint, format);
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            return match image::image_dimensions(&path) {
                Ok((width, height)) => DiskProbe::Found(CacheEntry {
                    fingerprint: fingerprint.clone(),
                    path: Some(path),
                    format,
                    width,
                    height,
                    byte_size: metadata.len(),
                    created: metadata.modified().unwrap_or(UNIX_EPOCH),
                }),
                Err(e) => {
                    debug!(entry = %path.display(), "unreadable cache entry header: {}", e);
                    DiskProbe::Unreadable(path)
                }
            };
        }

        DiskProbe::Missing
    }

    /// Look up and decode an entry. Corrupt entries are removed and reported as absent.
    pub fn load(&self, fingerprint: &Fingerprint) -> Option<(CacheEntry, Arc<DynamicImage>)> {
        if let Some(hit) = self.memory_hit(fingerprint) {
            return Some((hit.entry, hit.bitmap));
        }

        let entry = match self.probe_disk(fingerprint) {
            DiskProbe::Found(entry) => entry,
            DiskProbe::Missing => return None,
            DiskProbe::Unreadable(path) => {
                self.discard_corrupt(&path, "unreadable header");
                return None;
            }
        };
        let path = entry.path.clone()?;

        match read_complete(&path, entry.format) {
            Ok(img) => {
                let bitmap = Arc::new(img);
                self.remember(entry.clone(), Arc::clone(&bitmap));
                Some((entry, bitmap))
            }
            Err(reason) => {
                self.discard_corrupt(&path, &reason);
                None
            }
        }
    }

    fn discard_corrupt(&self, path: &Path, reason: &str) {
        let err = ThumbnailError::CacheCorruption {
            path: path.to_path_buf(),
        };
        debug!("{} ({}); treating as a miss", err, reason);
        if let Err(e) = remove_if_exists(path) {
            debug!("could not remove corrupt entry {}: {}", path.display(), e);
        }
    }

    /// Encode and store a thumbnail, replacing any prior entry for `fingerprint`.
    ///
    /// The bitmap is kept in the memory front even when the disk write fails.
    pub fn put(
        &self,
        fingerprint: &Fingerprint,
        bitmap: &DynamicImage,
        format: ThumbnailFormat,
    ) -> Result<CacheEntry, ThumbnailError> {
        let bytes = encode_thumbnail(bitmap, format, self.jpeg_quality)?;
        let (width, height) = bitmap.dimensions();
        let mut entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            path: None,
            format,
            width,
            height,
            byte_size: bytes.len() as u64,
            created: SystemTime::now(),
        };

        let written = match self.root.as_deref() {
            Some(root) => self.write_atomic(root, fingerprint, format, &bytes).map(Some),
            None => Ok(None),
        };
        entry.path = written.as_ref().ok().cloned().flatten();

        self.remember(entry.clone(), Arc::new(bitmap.clone()));
        written.map(|_| entry)
    }

    fn write_atomic(
        &self,
        root: &Path,
        fingerprint: &Fingerprint,
        format: ThumbnailFormat,
        bytes: &[u8],
    ) -> Result<PathBuf, ThumbnailError> {
        let final_path = Self::entry_path(root, fingerprint, format);
        let write_error = |source: io::Error| ThumbnailError::CacheWrite {
            path: final_path.clone(),
            source,
        };

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(root)
            .map_err(write_error)?;
        temp.write_all(bytes).map_err(write_error)?;
        temp.flush().map_err(write_error)?;
        temp.persist(&final_path).map_err(|e| write_error(e.error))?;

        // The entry is in place; a stale sibling only wastes space
        for other in ThumbnailFormat::ALL.into_iter().filter(|f| *f != format) {
            let stale = Self::entry_path(root, fingerprint, other);
            if let Err(e) = remove_if_exists(&stale) {
                debug!("could not remove stale entry {}: {}", stale.display(), e);
            }
        }

        debug!(entry = %final_path.display(), bytes = bytes.len(), "stored thumbnail");
        Ok(final_path)
    }

    fn remember(&self, entry: CacheEntry, bitmap: Arc<DynamicImage>) {
        let byte_size = bitmap.as_bytes().len();
        let key = entry.fingerprint.clone();
        self.memory.insert(key, MemoryEntry { entry, bitmap }, byte_size);
    }

    /// Remove one entry. Removing an absent entry succeeds.
    pub fn evict(&self, fingerprint: &Fingerprint) -> Result<(), ThumbnailError> {
        self.memory.remove(fingerprint);
        if let Some(root) = self.root.as_deref() {
            for format in ThumbnailFormat::ALL {
                let path = Self::entry_path(root, fingerprint, format);
                remove_if_exists(&path).map_err(|e| ThumbnailError::cache_io(&path, e))?;
            }
        }
        Ok(())
    }

    /// Total encoded bytes of all entries
    pub fn total_size(&self) -> Result<u64, ThumbnailError> {
        Ok(self.manifest()?.total_bytes)
    }

    pub fn entry_count(&self) -> Result<usize, ThumbnailError> {
        Ok(self.manifest()?.entry_count)
    }

    /// Walk the cache root. O(entries); meant for the management view, not the hot path.
    pub fn manifest(&self) -> Result<CacheManifest, ThumbnailError> {
        let (total_bytes, entry_count) = match self.root.as_deref() {
            Some(root) => {
                let files = self.entry_files(root)?;
                (files.iter().map(|f| f.size).sum(), files.len())
            }
            None => (0, 0),
        };

        Ok(CacheManifest {
            root: self.root.clone(),
            total_bytes,
            entry_count,
            memory_entries: self.memory.len(),
            memory_bytes: self.memory.total_bytes(),
        })
    }

    /// Remove every entry. Clearing an empty or missing cache succeeds.
    pub fn clear(&self) -> Result<usize, ThumbnailError> {
        self.memory.clear();
        let Some(root) = self.root.as_deref() else {
            return Ok(0);
        };

        fs::create_dir_all(root).map_err(|e| ThumbnailError::cache_io(root, e))?;
        let files = self.entry_files(root)?;
        let removed = self.remove_files(files.iter())?;
        info!(removed, "cleared thumbnail cache");
        Ok(removed)
    }

    /// Delete oldest entries until the cache holds at most `max_bytes`
    pub fn trim_to(&self, max_bytes: u64) -> Result<usize, ThumbnailError> {
        let Some(root) = self.root.as_deref() else {
            return Ok(0);
        };

        let mut files = self.entry_files(root)?;
        let mut total: u64 = files.iter().map(|f| f.size).sum();
        if total <= max_bytes {
            return Ok(0);
        }

        // Oldest first
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        let mut doomed = Vec::new();
        for file in &files {
            if total <= max_bytes {
                break;
            }
            total = total.saturating_sub(file.size);
            doomed.push(file);
        }

        let removed = self.remove_files(doomed.into_iter())?;
        info!(removed, max_bytes, "trimmed thumbnail cache");
        Ok(removed)
    }

    /// Delete entries whose fingerprint is not in `live`
    pub fn sweep_orphans(&self, live: &HashSet<Fingerprint>) -> Result<usize, ThumbnailError> {
        let Some(root) = self.root.as_deref() else {
            return Ok(0);
        };

        let files = self.entry_files(root)?;
        let removed = self.remove_files(files.iter().filter(|f| !live.contains(&f.fingerprint)))?;
        info!(removed, "swept orphaned thumbnails");
        Ok(removed)
    }

    fn remove_files<'a>(&self, files: impl Iterator<Item = &'a EntryFile>) -> Result<usize, ThumbnailError> {
        let mut removed = 0;
        for file in files {
            self.memory.remove(&file.fingerprint);
            if remove_if_exists(&file.path).map_err(|e| ThumbnailError::cache_io(&file.path, e))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn entry_files(&self, root: &Path) -> Result<Vec<EntryFile>, ThumbnailError> {
        let read_dir = match fs::read_dir(root) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ThumbnailError::cache_io(root, e)),
        };

        let mut files = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| ThumbnailError::cache_io(root, e))?;
            let path = dir_entry.path();
            let Some(fingerprint) = parse_entry_name(&path) else {
                continue;
            };
            // Entries may vanish under a concurrent clear or evict
            let Ok(metadata) = dir_entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(EntryFile {
                fingerprint,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(UNIX_EPOCH),
                path,
            });
        }
        Ok(files)
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("root", &self.root)
            .field("memory", &self.memory)
            .finish()
    }
}

enum DiskProbe {
    Missing,
    Found(CacheEntry),
    Unreadable(PathBuf),
}

struct EntryFile {
    fingerprint: Fingerprint,
    path: PathBuf,
    size: u64,
    modified: SystemTime,
}

/// `<fingerprint>.<jpg|png>`; temp files and strangers yield `None`
fn parse_entry_name(path: &Path) -> Option<Fingerprint> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with(TEMP_PREFIX) {
        return None;
    }
    let (stem, ext) = name.rsplit_once('.')?;
    ThumbnailFormat::from_extension(ext)?;
    Fingerprint::parse(stem)
}

/// Read and decode an entry, rejecting files that lost their trailing marker
fn read_complete(path: &Path, format: ThumbnailFormat) -> Result<DynamicImage, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let complete = match format {
        ThumbnailFormat::Jpeg => bytes.ends_with(&[0xFF, 0xD9]),
        ThumbnailFormat::Png => bytes.len() >= 12 && &bytes[bytes.len() - 8..bytes.len() - 4] == b"IEND",
    };
    if !complete {
        return Err("truncated".to_string());
    }
    image::load_from_memory(&bytes).map_err(|e| e.to_string())
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn config() -> ThumbnailConfig {
        ThumbnailConfig::default()
    }

    fn no_memory() -> ThumbnailConfig {
        ThumbnailConfig {
            memory_budget: 0,
            ..ThumbnailConfig::default()
        }
    }

    fn key(n: u64) -> Fingerprint {
        Fingerprint::from_parts(Path::new("/photos/img.jpg"), n, UNIX_EPOCH)
    }

    fn bitmap(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 3 % 256) as u8, 90])
        }))
    }

    #[test]
    fn test_open_creates_root() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("thumbnails").join("v1");
        let store = CacheStore::open(&root, &config())?;
        assert!(root.is_dir());
        assert!(store.is_persistent());
        assert_eq!(store.root(), Some(root.as_path()));
        // The writability probe leaves nothing behind
        assert_eq!(fs::read_dir(&root)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_put_then_lookup_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &no_memory())?;
        let original = bitmap(64, 48);

        let entry = store.put(&key(1), &original, ThumbnailFormat::Png)?;
        assert_eq!((entry.width, entry.height), (64, 48));
        let path = entry.path.clone().expect("persistent entry has a path");
        assert!(path.to_string_lossy().ends_with(".png"));

        let found = store.lookup(&key(1)).expect("entry present");
        assert_eq!(found.path, Some(path));
        assert_eq!(found.byte_size, entry.byte_size);

        let (_, loaded) = store.load(&key(1)).expect("decodable");
        assert_eq!(loaded.to_rgb8(), original.to_rgb8());
        Ok(())
    }

    #[test]
    fn test_lookup_missing_is_absent() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &config())?;
        assert!(store.lookup(&key(7)).is_none());
        assert!(store.load(&key(7)).is_none());
        Ok(())
    }

    #[test]
    fn test_put_overwrites_other_format() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &no_memory())?;

        store.put(&key(1), &bitmap(16, 16), ThumbnailFormat::Png)?;
        store.put(&key(1), &bitmap(16, 16), ThumbnailFormat::Jpeg)?;

        assert_eq!(store.entry_count()?, 1);
        assert_eq!(store.lookup(&key(1)).map(|e| e.format), Some(ThumbnailFormat::Jpeg));
        Ok(())
    }

    #[test]
    fn test_stuck_sibling_does_not_fail_put() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &no_memory())?;
        // A directory under the other format's name cannot be removed as a file
        let sibling = dir.path().join(format!("{}.png", key(1)));
        fs::create_dir(&sibling)?;
        fs::write(sibling.join("keep"), b"x")?;

        let entry = store.put(&key(1), &bitmap(16, 16), ThumbnailFormat::Jpeg)?;
        assert!(entry.path.is_some());
        assert_eq!(store.lookup(&key(1)).map(|e| e.format), Some(ThumbnailFormat::Jpeg));
        Ok(())
    }

    #[test]
    fn test_evict_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &config())?;
        store.put(&key(1), &bitmap(16, 16), ThumbnailFormat::Jpeg)?;

        store.evict(&key(1))?;
        assert!(store.lookup(&key(1)).is_none());
        store.evict(&key(1))?;
        Ok(())
    }

    #[test]
    fn test_clear_twice() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &config())?;
        for n in 0..3 {
            store.put(&key(n), &bitmap(16, 16), ThumbnailFormat::Jpeg)?;
        }
        assert_eq!(store.entry_count()?, 3);
        assert!(store.total_size()? > 0);

        assert_eq!(store.clear()?, 3);
        assert_eq!(store.total_size()?, 0);
        assert_eq!(store.entry_count()?, 0);

        assert_eq!(store.clear()?, 0);
        assert_eq!(store.total_size()?, 0);
        assert_eq!(store.entry_count()?, 0);
        assert!(store.lookup(&key(0)).is_none());
        Ok(())
    }

    #[test]
    fn test_clear_leaves_temp_files_alone() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &config())?;
        let temp = dir.path().join(".tmp-inflight.jpg");
        fs::write(&temp, b"partial")?;
        fs::write(dir.path().join("notes.txt"), b"not ours")?;

        store.clear()?;
        assert!(temp.exists());
        assert_eq!(store.entry_count()?, 0);
        Ok(())
    }

    #[test]
    fn test_clear_after_root_deleted() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("cache");
        let store = CacheStore::open(&root, &config())?;
        fs::remove_dir_all(&root)?;

        assert_eq!(store.entry_count()?, 0);
        assert_eq!(store.clear()?, 0);
        assert!(root.is_dir());
        Ok(())
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &no_memory())?;
        let entry = store.put(&key(1), &bitmap(64, 64), ThumbnailFormat::Jpeg)?;
        let path = entry.path.expect("persistent entry has a path");

        let bytes = fs::read(&path)?;
        fs::write(&path, &bytes[..bytes.len() / 2])?;

        assert!(store.load(&key(1)).is_none());
        assert!(!path.exists(), "corrupt entry is evicted");
        Ok(())
    }

    #[test]
    fn test_truncated_file_behind_memory_copy_is_a_miss() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &config())?;
        let entry = store.put(&key(1), &bitmap(64, 64), ThumbnailFormat::Jpeg)?;
        let path = entry.path.expect("persistent entry has a path");
        assert!(store.load(&key(1)).is_some());

        let bytes = fs::read(&path)?;
        fs::write(&path, &bytes[..bytes.len() / 2])?;

        assert!(store.load(&key(1)).is_none());
        assert!(!path.exists(), "corrupt entry is evicted");
        assert_eq!(store.manifest()?.memory_entries, 0);
        Ok(())
    }

    #[test]
    fn test_deleted_file_drops_memory_copy() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &config())?;
        let entry = store.put(&key(1), &bitmap(16, 16), ThumbnailFormat::Png)?;
        fs::remove_file(entry.path.expect("persistent entry has a path"))?;

        assert!(store.lookup(&key(1)).is_none());
        Ok(())
    }

    #[test]
    fn test_trim_removes_oldest_first() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &no_memory())?;
        let mut sizes = Vec::new();
        for n in 0..3 {
            let entry = store.put(&key(n), &bitmap(32, 32), ThumbnailFormat::Png)?;
            let path = entry.path.expect("persistent entry has a path");
            filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_000 + n as i64, 0))?;
            sizes.push(entry.byte_size);
        }

        let budget = sizes[1] + sizes[2];
        assert_eq!(store.trim_to(budget)?, 1);
        assert!(store.lookup(&key(0)).is_none());
        assert!(store.lookup(&key(1)).is_some());
        assert!(store.lookup(&key(2)).is_some());

        assert_eq!(store.trim_to(u64::MAX)?, 0);
        Ok(())
    }

    #[test]
    fn test_sweep_orphans_keeps_live_entries() -> Result<()> {
        let dir = tempdir()?;
        let store = CacheStore::open(dir.path(), &config())?;
        for n in 0..4 {
            store.put(&key(n), &bitmap(8, 8), ThumbnailFormat::Jpeg)?;
        }

        let live: HashSet<_> = [key(1), key(3)].into_iter().collect();
        assert_eq!(store.sweep_orphans(&live)?, 2);
        assert!(store.lookup(&key(0)).is_none());
        assert!(store.lookup(&key(1)).is_some());
        assert_eq!(store.entry_count()?, 2);
        Ok(())
    }

    #[test]
    fn test_memory_only_store() -> Result<()> {
        let store = CacheStore::memory_only(&config());
        assert!(!store.is_persistent());

        let entry = store.put(&key(1), &bitmap(20, 10), ThumbnailFormat::Jpeg)?;
        assert!(entry.path.is_none());
        let (found, loaded) = store.load(&key(1)).expect("held in memory");
        assert_eq!(found.width, 20);
        assert_eq!(loaded.dimensions(), (20, 10));

        let manifest = store.manifest()?;
        assert_eq!(manifest.entry_count, 0);
        assert_eq!(manifest.memory_entries, 1);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_open_or_degrade_on_unwritable_root() -> Result<()> {
        let dir = tempdir()?;
        // A regular file where the root directory should be
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, b"")?;
        let config = ThumbnailConfig {
            cache_root: Some(blocker.join("thumbnails")),
            ..ThumbnailConfig::default()
        };

        let (store, err) = CacheStore::open_or_degrade(&config);
        assert!(!store.is_persistent());
        assert_eq!(err.map(|e| e.kind()), Some(crate::ErrorKind::CacheUnavailable));
        Ok(())
    }

    #[test]
    fn test_parse_entry_name() {
        let fp = key(1);
        assert_eq!(parse_entry_name(Path::new(&format!("/c/{}.jpg", fp))), Some(fp.clone()));
        assert_eq!(parse_entry_name(Path::new(&format!("/c/{}.gif", fp))), None);
        assert_eq!(parse_entry_name(Path::new("/c/.tmp-abc.jpg")), None);
        assert_eq!(parse_entry_name(Path::new("/c/readme")), None);
    }
}
