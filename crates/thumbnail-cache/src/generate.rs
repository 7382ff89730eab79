//! Thumbnail generation pipeline
//!
//! Decodes a source image, scales it to the requested target with either
//! crop-to-fill or fit-within semantics, and encodes the result for the cache
//! store. Generation is deterministic: the same file and target always yield
//! the same pixels.

use crate::error::ThumbnailError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use std::io::{self, Cursor};
use std::path::Path;

/// Resampling filter for every resize. Never nearest-neighbor.
const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Upper bound on decoder allocations for a single source image
const MAX_DECODE_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }
}

impl std::fmt::Display for TargetSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Scale to cover the target, then center-crop to exactly the target size.
    /// This is what the grid view uses.
    #[default]
    Crop,
    /// Scale to fit inside the target, preserving aspect ratio. Never upscales.
    Fit,
}

impl ResizeMode {
    /// Dimensions of the thumbnail this mode makes from a `source`-sized image
    pub fn output_dimensions(&self, source: (u32, u32), target: TargetSize) -> (u32, u32) {
        let (width, height) = source;
        if width == 0 || height == 0 || target.width == 0 || target.height == 0 {
            return source;
        }

        match self {
            ResizeMode::Crop => (target.width, target.height),
            ResizeMode::Fit => {
                // If image is already within bounds, don't upscale
                if width <= target.width && height <= target.height {
                    return source;
                }
                let ratio = (target.width as f64 / width as f64).min(target.height as f64 / height as f64);
                (
                    scaled(width, ratio).min(target.width),
                    scaled(height, ratio).min(target.height),
                )
            }
        }
    }
}

impl std::fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResizeMode::Crop => write!(f, "crop"),
            ResizeMode::Fit => write!(f, "fit"),
        }
    }
}

impl std::str::FromStr for ResizeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "crop" | "fill" => Ok(ResizeMode::Crop),
            "fit" => Ok(ResizeMode::Fit),
            _ => Err(format!("Invalid resize mode: {}. Valid options: crop, fit", s)),
        }
    }
}

/// On-disk encoding of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    #[default]
    Jpeg,
    Png,
}

impl ThumbnailFormat {
    pub const ALL: [ThumbnailFormat; 2] = [ThumbnailFormat::Jpeg, ThumbnailFormat::Png];

    pub fn extension(&self) -> &'static str {
        match self {
            ThumbnailFormat::Jpeg => "jpg",
            ThumbnailFormat::Png => "png",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }
}

impl std::fmt::Display for ThumbnailFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThumbnailFormat::Jpeg => write!(f, "jpeg"),
            ThumbnailFormat::Png => write!(f, "png"),
        }
    }
}

impl std::str::FromStr for ThumbnailFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(ThumbnailFormat::Jpeg),
            "png" => Ok(ThumbnailFormat::Png),
            _ => Err(format!("Invalid thumbnail format: {}. Valid options: jpeg, png", s)),
        }
    }
}

/// The seam the scheduler generates through
pub trait Generate: Send + Sync {
    fn generate(
        &self,
        path: &Path,
        target: TargetSize,
        mode: ResizeMode,
    ) -> Result<DynamicImage, ThumbnailError>;
}

/// Production generator backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageGenerator;

impl Generate for ImageGenerator {
    fn generate(
        &self,
        path: &Path,
        target: TargetSize,
        mode: ResizeMode,
    ) -> Result<DynamicImage, ThumbnailError> {
        generate_thumbnail(path, target, mode)
    }
}

/// Decode `path` and scale it to `target`
pub fn generate_thumbnail(
    path: &Path,
    target: TargetSize,
    mode: ResizeMode,
) -> Result<DynamicImage, ThumbnailError> {
    let img = decode_image(path)?;
    Ok(resize_image(img, target, mode))
}

/// Decode a source image, sniffing its content rather than trusting the extension
pub fn decode_image(path: &Path) -> Result<DynamicImage, ThumbnailError> {
    let decode_error = |message: String| ThumbnailError::Decode {
        path: path.to_path_buf(),
        message,
    };

    let reader = ImageReader::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ThumbnailError::invalid_path(path, e),
        _ => decode_error(e.to_string()),
    })?;
    let mut reader = reader
        .with_guessed_format()
        .map_err(|e| decode_error(e.to_string()))?;

    let mut limits = Limits::default();
    limits.max_alloc = Some(MAX_DECODE_BYTES);
    reader.limits(limits);

    reader.decode().map_err(|e| decode_error(e.to_string()))
}

/// Read only the header of a source image. `None` when it is not a readable image.
pub fn source_dimensions(path: &Path) -> Option<(u32, u32)> {
    ImageReader::open(path)
        .ok()?
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Scale an image to `target` under `mode`
pub fn resize_image(img: DynamicImage, target: TargetSize, mode: ResizeMode) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || target.width == 0 || target.height == 0 {
        return img;
    }

    match mode {
        ResizeMode::Fit => {
            let (new_width, new_height) = mode.output_dimensions((width, height), target);
            if (new_width, new_height) == (width, height) {
                return img;
            }
            img.resize_exact(new_width, new_height, RESIZE_FILTER)
        }
        ResizeMode::Crop => {
            let ratio = (target.width as f64 / width as f64).max(target.height as f64 / height as f64);
            // Covering dimensions, never smaller than the target on either side
            let new_width = scaled(width, ratio).max(target.width);
            let new_height = scaled(height, ratio).max(target.height);

            let covered = if (new_width, new_height) == (width, height) {
                img
            } else {
                img.resize_exact(new_width, new_height, RESIZE_FILTER)
            };

            let x = (new_width - target.width) / 2;
            let y = (new_height - target.height) / 2;
            covered.crop_imm(x, y, target.width, target.height)
        }
    }
}

fn scaled(dimension: u32, ratio: f64) -> u32 {
    ((dimension as f64 * ratio).round() as u32).max(1)
}

/// Encode a thumbnail for the cache store
pub fn encode_thumbnail(
    img: &DynamicImage,
    format: ThumbnailFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, ThumbnailError> {
    let mut buffer = Vec::new();

    match format {
        ThumbnailFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = img.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality.clamp(1, 100));
            encoder.encode_image(&rgb).map_err(ThumbnailError::Encode)?;
        }
        ThumbnailFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                .map_err(ThumbnailError::Encode)?;
        }
    }

    Ok(buffer)
}
