use anyhow::Result;
use filetime::FileTime;
use gallery_index::{
    update_metadata, Filter, GalleryIndex, MetadataFilter, SortOrder, Viewport,
};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use thumbnail_cache::{
    CacheStore, ErrorKind, TargetSize, ThumbnailConfig, ThumbnailEvent, ThumbnailScheduler,
};

const TIMEOUT: Duration = Duration::from_secs(30);

struct Gallery {
    dir: TempDir,
    config: ThumbnailConfig,
}

impl Gallery {
    fn new() -> Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("photos/trip"))?;
        let config = ThumbnailConfig {
            target: TargetSize::square(32),
            workers: 2,
            cache_root: Some(dir.path().join("cache")),
            ..ThumbnailConfig::default()
        };
        Ok(Self { dir, config })
    }

    fn photos(&self) -> PathBuf {
        self.dir.path().join("photos")
    }

    fn image(&self, relative: &str, width: u32, mtime: i64) -> Result<PathBuf> {
        let path = self.photos().join(relative);
        RgbImage::from_pixel(width, 40, Rgb([200, 80, 10])).save(&path)?;
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0))?;
        Ok(path)
    }

    fn index(&self, sort: &str) -> Result<GalleryIndex> {
        let store = Arc::new(CacheStore::open(self.config.cache_root()?, &self.config)?);
        let scheduler = Arc::new(ThumbnailScheduler::new(store, &self.config)?);
        Ok(GalleryIndex::new(
            scheduler,
            &self.config,
            sort.parse::<SortOrder>().map_err(anyhow::Error::msg)?,
        ))
    }
}

fn names(index: &GalleryIndex) -> Vec<String> {
    index.entries().iter().map(|f| f.file_name().into_owned()).collect()
}

fn settle_all(index: &mut GalleryIndex, n: usize) -> Result<Vec<ThumbnailEvent>> {
    let results = index.scheduler().results();
    let mut events = Vec::new();
    for _ in 0..n {
        let event = results.recv_timeout(TIMEOUT)?;
        assert!(index.settle(&event).is_some(), "unknown event {:?}", event);
        events.push(event);
    }
    Ok(events)
}

#[test]
fn test_listing_sorting_and_groups() -> Result<()> {
    let gallery = Gallery::new()?;
    gallery.image("b.png", 60, 3_000)?;
    gallery.image("a.png", 80, 1_000)?;
    gallery.image("trip/c.png", 40, 2_000)?;
    fs::write(gallery.photos().join("readme.txt"), b"not an image")?;

    let mut index = gallery.index("name-asc")?;
    assert_eq!(index.add_folder(&gallery.photos())?, 3);
    assert_eq!(index.groups().count(), 2);
    assert_eq!(names(&index), vec!["a.png", "b.png", "c.png"]);

    index.set_sort("date-new".parse().map_err(anyhow::Error::msg)?);
    assert_eq!(names(&index), vec!["b.png", "c.png", "a.png"]);

    index.open(Some(&gallery.photos().join("trip")))?;
    assert_eq!(names(&index), vec!["c.png"]);
    assert!(index.open(Some(Path::new("/definitely/not/here"))).is_err());

    index.open(None)?;
    assert_eq!(index.len(), 3);
    Ok(())
}

#[test]
fn test_thumbnails_arrive_and_settle() -> Result<()> {
    let gallery = Gallery::new()?;
    for (i, name) in ["one.png", "two.png", "three.png"].iter().enumerate() {
        gallery.image(name, 50 + i as u32, 1_000)?;
    }
    let mut index = gallery.index("name-asc")?;
    index.add_folder(&gallery.photos())?;

    let ids = index.request_thumbnails(Viewport::new(0, 1));
    assert_eq!(ids.len(), 3);
    // Already outstanding: nothing is resubmitted
    assert!(index.request_thumbnails(Viewport::all()).is_empty());

    let events = settle_all(&mut index, 3)?;
    assert!(events.iter().all(|e| matches!(e, ThumbnailEvent::Ready(_))));
    assert_eq!(index.outstanding(), 0);

    // A second pass is served from the cache and re-sorting never regenerates
    let generated = index.scheduler().stats().generated;
    index.set_sort("size-large".parse().map_err(anyhow::Error::msg)?);
    index.request_thumbnails(Viewport::all());
    settle_all(&mut index, 3)?;
    assert_eq!(index.scheduler().stats().generated, generated);
    Ok(())
}

#[test]
fn test_filtering_out_withdraws_requests() -> Result<()> {
    let gallery = Gallery::new()?;
    let keep = gallery.image("keep.png", 50, 1_000)?;
    gallery.image("drop.png", 50, 1_000)?;
    update_metadata(&keep, |m| m.rating = 5)?;

    let mut index = gallery.index("name-asc")?;
    index.add_folder(&gallery.photos())?;
    index.request_thumbnails(Viewport::all());
    assert_eq!(index.outstanding(), 2);

    index.set_filter(Filter::new().with_metadata(MetadataFilter::Rating(5)));
    assert_eq!(names(&index), vec!["keep.png"]);
    assert_eq!(index.outstanding(), 1);

    index.set_filter(Filter::new().with_search("DROP"));
    assert_eq!(names(&index), vec!["drop.png"]);
    assert_eq!(index.outstanding(), 0);
    Ok(())
}

#[test]
fn test_vanished_file_requests_refresh() -> Result<()> {
    let gallery = Gallery::new()?;
    gallery.image("stays.png", 50, 1_000)?;
    let doomed = gallery.image("goes.png", 50, 1_000)?;

    let mut index = gallery.index("name-asc")?;
    index.add_folder(&gallery.photos())?;
    fs::remove_file(&doomed)?;

    index.request_thumbnails(Viewport::all());
    let events = settle_all(&mut index, 2)?;
    let failure = events
        .iter()
        .find_map(|e| match e {
            ThumbnailEvent::Failed(f) => Some(f),
            _ => None,
        })
        .expect("one failure");
    assert_eq!(failure.kind, ErrorKind::InvalidPath);
    assert!(index.needs_refresh());

    index.refresh()?;
    assert!(!index.needs_refresh());
    assert_eq!(names(&index), vec!["stays.png"]);
    Ok(())
}

#[test]
fn test_refresh_fails_when_every_folder_is_gone() -> Result<()> {
    let gallery = Gallery::new()?;
    gallery.image("a.png", 50, 1_000)?;
    let other = gallery.dir.path().join("other");
    fs::create_dir(&other)?;
    RgbImage::from_pixel(30, 30, Rgb([0, 0, 0])).save(other.join("z.png"))?;

    let mut index = gallery.index("name-asc")?;
    index.add_folder(&gallery.photos())?;
    index.add_folder(&other)?;

    // One folder left: the survivor is kept
    fs::remove_dir_all(&other)?;
    index.refresh()?;
    assert_eq!(index.folders().len(), 1);
    assert_eq!(names(&index), vec!["a.png"]);

    // None left: an error, and the last good listing stays
    fs::remove_dir_all(gallery.photos())?;
    assert!(index.refresh().is_err());
    assert_eq!(index.folders().len(), 1);
    assert_eq!(names(&index), vec!["a.png"]);
    Ok(())
}

#[test]
fn test_removing_a_folder_cancels_its_requests() -> Result<()> {
    let gallery = Gallery::new()?;
    gallery.image("a.png", 50, 1_000)?;
    let other = gallery.dir.path().join("other");
    fs::create_dir(&other)?;
    RgbImage::from_pixel(30, 30, Rgb([0, 0, 0])).save(other.join("z.png"))?;

    let mut index = gallery.index("name-asc")?;
    index.add_folder(&gallery.photos())?;
    index.add_folder(&other)?;
    assert_eq!(index.folders().len(), 2);
    index.request_thumbnails(Viewport::all());
    assert_eq!(index.outstanding(), 2);

    assert!(index.remove_folder(&other));
    assert!(!index.remove_folder(&other));
    assert_eq!(names(&index), vec!["a.png"]);
    assert_eq!(index.outstanding(), 1);
    Ok(())
}
