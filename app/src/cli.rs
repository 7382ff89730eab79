use clap::{ArgAction, Args, Parser, Subcommand};
use gallery_index::SortOrder;
use std::path::PathBuf;
use thumbnail_cache::ResizeMode;

#[derive(Parser, Debug)]
#[command(name = "galleria")]
#[command(version, about = "Browse image folders with cached thumbnails")]
pub struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Preferences file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub prefs: Option<PathBuf>,

    /// Thumbnail cache directory override
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the images in gallery folders, grouped by directory
    Scan {
        /// Folders to scan (defaults to the folders in the preferences)
        folders: Vec<PathBuf>,
    },

    /// Generate or fetch thumbnails for gallery folders
    Thumbs(ThumbsArgs),

    /// Inspect or maintain the thumbnail cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args, Debug)]
pub struct ThumbsArgs {
    /// Folders to process (defaults to the folders in the preferences)
    pub folders: Vec<PathBuf>,

    /// Thumbnail width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Thumbnail height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// crop (fill the tile) or fit (preserve aspect)
    #[arg(long)]
    pub mode: Option<ResizeMode>,

    /// name-asc, name-desc, date-new, date-old, size-large or size-small
    #[arg(long)]
    pub sort: Option<SortOrder>,

    /// Only files whose name or tags contain TEXT
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    /// Only files with this star rating (0 = unrated)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
    pub rating: Option<u8>,

    /// Only files with this color label ("none" = unlabeled)
    #[arg(long, value_name = "COLOR")]
    pub label: Option<String>,

    /// Number of leading entries treated as on screen
    #[arg(long, default_value = "48")]
    pub visible: usize,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show the cache location and size
    Info,
    /// Delete every cached thumbnail
    Clear,
    /// Delete the oldest thumbnails until the cache fits
    Trim {
        /// Size limit in mebibytes
        #[arg(long)]
        max_mb: u64,
    },
    /// Delete thumbnails of files no longer present in the given folders
    Sweep {
        /// Folders whose files are still live (defaults to the preferences)
        folders: Vec<PathBuf>,
    },
}
