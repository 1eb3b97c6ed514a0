//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the operations the compressor needs:
//! decode (with orientation and mode normalization), resize, encode, and EXIF
//! info extraction. The compressor only ever talks to this trait, so the ladder
//! logic can be exercised against a recording mock with a synthetic size model.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): `image` for decode and
//! resampling, libwebp (via the `webp` crate) for WebP, `image` for JPEG.

use super::exif_info::ExifInfo;
use super::params::EncodeParams;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Image is {width}x{height}, exceeding the {max_pixels} pixel limit")]
    TooManyPixels {
        width: u32,
        height: u32,
        max_pixels: u64,
    },
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Width and height of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn of(image: &DynamicImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn longer_edge(self) -> u32 {
        self.width.max(self.height)
    }
}

/// Trait for image processing backends.
pub trait ImageBackend: Sync {
    /// Decode raw bytes into an upright, single-frame raster whose mode is
    /// RGB8 or RGBA8. Rasters larger than `max_pixels` are rejected before
    /// pixel data is allocated.
    fn decode(&self, raw: &[u8], max_pixels: u64) -> Result<DynamicImage, BackendError>;

    /// Resample to exact dimensions with a high-quality filter.
    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage;

    /// Encode a raster. `params.quality` is ignored by lossless codecs that
    /// have no effort knob.
    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError>;

    /// Read the human-readable EXIF summary written to `_info.json` files.
    fn read_exif_info(&self, raw: &[u8]) -> ExifInfo;
}
