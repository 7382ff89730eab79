//! Gallery listing for Galleria
//!
//! Scans the gallery folders, keeps an ordered and filterable view of the
//! images, and drives the thumbnail scheduler in viewport-first order.

pub mod filter;
pub mod index;
pub mod metadata;
pub mod preferences;
pub mod scan;
pub mod sort;
pub mod viewport;

pub use filter::{Filter, Predicate};
pub use index::GalleryIndex;
pub use metadata::{read_metadata, sidecar_path, update_metadata, MetadataFilter, SidecarMetadata};
pub use preferences::Preferences;
pub use scan::{scan_folder, FolderGroups};
pub use sort::{SortDirection, SortKey, SortOrder};
pub use viewport::{priority_order, Viewport};
