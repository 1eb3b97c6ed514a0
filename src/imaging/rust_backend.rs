//! Pure Rust image processing backend (plus libwebp for lossy WebP).
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, BMP, TIFF, WebP) | `image::ImageReader`, first frame only |
//! | Orientation | `kamadak-exif` tag read + `image` rotate/flip |
//! | Mode normalization | RGBA8 when the source has alpha, RGB8 otherwise |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → WebP | `webp::Encoder::encode_advanced`, `method = 6` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |
//! | EXIF summary | [`exif_info`](super::exif_info) |

use super::backend::{BackendError, ImageBackend};
use super::exif_info::{self, ExifInfo};
use super::params::{EncodeParams, OutputFormat};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;

/// libwebp effort level: 6 is the slowest and produces the smallest output at a
/// given quality. Derivatives are generated off the request path.
const WEBP_METHOD: i32 = 6;

/// Production backend: `image` crate decoders and resampling, libwebp for WebP.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_err(e: image::ImageError) -> BackendError {
    BackendError::Decode(e.to_string())
}

/// Decode the first frame, rejecting rasters over `max_pixels` before any
/// pixel buffer is allocated.
fn decode_first_frame(raw: &[u8], max_pixels: u64) -> Result<DynamicImage, BackendError> {
    let reader = ImageReader::new(Cursor::new(raw)).with_guessed_format()?;
    if reader.format().is_none() {
        return Err(BackendError::Decode("unrecognized image format".into()));
    }

    let decoder = reader.into_decoder().map_err(decode_err)?;
    let (width, height) = decoder.dimensions();
    if width as u64 * height as u64 > max_pixels {
        return Err(BackendError::TooManyPixels {
            width,
            height,
            max_pixels,
        });
    }

    DynamicImage::from_decoder(decoder).map_err(decode_err)
}

/// Rotate/flip according to an EXIF orientation value (1–8).
fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Collapse every color type to RGB8, or RGBA8 when an alpha channel exists.
fn normalize_mode(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.into_rgba8()),
        other => DynamicImage::ImageRgb8(other.into_rgb8()),
    }
}

fn encode_webp(img: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
    let converted;
    let encoder = match img {
        DynamicImage::ImageRgb8(buf) => webp::Encoder::from_rgb(buf.as_raw(), buf.width(), buf.height()),
        DynamicImage::ImageRgba8(buf) => {
            webp::Encoder::from_rgba(buf.as_raw(), buf.width(), buf.height())
        }
        other => {
            converted = other.to_rgba8();
            webp::Encoder::from_rgba(converted.as_raw(), converted.width(), converted.height())
        }
    };

    let mut config = webp::WebPConfig::new()
        .map_err(|_| BackendError::Encode("libwebp rejected the default config".into()))?;
    config.method = WEBP_METHOD;
    config.quality = params.quality.value() as f32;
    config.lossless = i32::from(params.lossless);

    let encoded = encoder
        .encode_advanced(&config)
        .map_err(|e| BackendError::Encode(format!("WebP encode failed: {e:?}")))?;
    Ok(encoded.to_vec())
}

/// JPEG has no lossless mode and no alpha: a lossless request encodes at
/// quality 100, and alpha is dropped.
fn encode_jpeg(img: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
    let quality = if params.lossless {
        100
    } else {
        params.quality.value() as u8
    };
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    let result = if img.color().has_alpha() {
        DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
    } else {
        img.write_with_encoder(encoder)
    };
    result.map_err(|e| BackendError::Encode(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn decode(&self, raw: &[u8], max_pixels: u64) -> Result<DynamicImage, BackendError> {
        let img = decode_first_frame(raw, max_pixels)?;
        let orientation = exif_info::read_orientation(raw);
        if orientation != 1 {
            tracing::debug!(orientation, "applying EXIF orientation");
        }
        Ok(normalize_mode(apply_orientation(img, orientation)))
    }

    fn resize(&self, image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width, height, FilterType::Lanczos3)
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, BackendError> {
        match params.format {
            OutputFormat::Webp => encode_webp(image, params),
            OutputFormat::Jpeg => encode_jpeg(image, params),
        }
    }

    fn read_exif_info(&self, raw: &[u8]) -> ExifInfo {
        exif_info::read_exif_info(raw)
    }
}
