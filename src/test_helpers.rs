//! Shared test utilities: synthetic rasters and encoded fixtures.
//!
//! Everything is generated in memory so tests never depend on files on disk.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let raw = jpeg_with_orientation(&gradient_rgb(40, 20), 6);
//! let store = MemoryStore::new();
//! store.put("public/a.jpg", raw, "image/jpeg").unwrap();
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

// =========================================================================
// Rasters
// =========================================================================

/// Smooth two-axis gradient. Compresses well.
pub fn gradient_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

/// Deterministic pseudo-random noise. Compresses badly, so lossy encodes
/// shrink visibly as quality drops.
pub fn noise_rgb(width: u32, height: u32) -> RgbImage {
    let mut state: u32 = 0x2545_f491;
    RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 24) as u8
        };
        Rgb([next(), next(), next()])
    })
}

// =========================================================================
// Encoded fixtures
// =========================================================================

pub fn jpeg_bytes(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(img)
        .unwrap();
    buf
}

pub fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// JPEG carrying only an EXIF orientation tag.
pub fn jpeg_with_orientation(img: &RgbImage, orientation: u16) -> Vec<u8> {
    with_exif(&jpeg_bytes(img, 90), &[(0x0112, orientation)], &[])
}

/// JPEG with camera settings in the EXIF sub-IFD: ISO 400, flash off.
pub fn jpeg_with_camera_exif(img: &RgbImage) -> Vec<u8> {
    with_exif(&jpeg_bytes(img, 90), &[], &[(0x8827, 400), (0x9209, 0)])
}

/// Splice an APP1 EXIF segment right after SOI. Entries are `(tag, SHORT)`
/// pairs; `exif_entries` land in a sub-IFD referenced from IFD0.
fn with_exif(jpeg: &[u8], ifd0_entries: &[(u16, u16)], exif_entries: &[(u16, u16)]) -> Vec<u8> {
    const EXIF_IFD_POINTER: u16 = 0x8769;
    const SHORT: u16 = 3;
    const LONG: u16 = 4;

    fn entry(tiff: &mut Vec<u8>, tag: u16, kind: u16, value: [u8; 4]) {
        tiff.extend_from_slice(&tag.to_be_bytes());
        tiff.extend_from_slice(&kind.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&value);
    }
    fn short(v: u16) -> [u8; 4] {
        let [a, b] = v.to_be_bytes();
        [a, b, 0, 0]
    }

    let has_sub_ifd = !exif_entries.is_empty();
    let ifd0_count = ifd0_entries.len() + usize::from(has_sub_ifd);
    let sub_ifd_offset = (8 + 2 + 12 * ifd0_count + 4) as u32;

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\x00\x2a");
    tiff.extend_from_slice(&8u32.to_be_bytes());

    tiff.extend_from_slice(&(ifd0_count as u16).to_be_bytes());
    for &(tag, value) in ifd0_entries {
        entry(&mut tiff, tag, SHORT, short(value));
    }
    if has_sub_ifd {
        entry(&mut tiff, EXIF_IFD_POINTER, LONG, sub_ifd_offset.to_be_bytes());
    }
    tiff.extend_from_slice(&0u32.to_be_bytes());

    if has_sub_ifd {
        tiff.extend_from_slice(&(exif_entries.len() as u16).to_be_bytes());
        for &(tag, value) in exif_entries {
            entry(&mut tiff, tag, SHORT, short(value));
        }
        tiff.extend_from_slice(&0u32.to_be_bytes());
    }

    let payload_len = (2 + 6 + tiff.len()) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + payload_len as usize + 2);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&payload_len.to_be_bytes());
    out.extend_from_slice(b"Exif\x00\x00");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

#[test]
fn camera_exif_fixture_is_readable() {
    let raw = jpeg_with_camera_exif(&gradient_rgb(8, 8));
    let info = crate::imaging::exif_info::read_exif_info(&raw);
    assert_eq!(info.get("ISO Speed"), Some("400"));
    assert_eq!(info.get("Flash"), Some("No Flash"));
}

#[test]
fn orientation_fixture_is_readable() {
    let raw = jpeg_with_orientation(&gradient_rgb(8, 8), 6);
    assert_eq!(crate::imaging::exif_info::read_orientation(&raw), 6);
}
