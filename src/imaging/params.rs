//! Parameter types for image operations.
//!
//! These structs describe *what* to encode, not *how*. They are the interface
//! between the [`compress`](super::compress) ladder (which decides quality and
//! resolution) and the [`backend`](super::backend) (which does the pixel work).
//! Keeping them backend-agnostic is what lets the ladder run against a mock.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 86). Clamped on construction.
//! - [`OutputFormat`]: Derivative codec: WebP (default) or JPEG.
//! - [`EncodeParams`]: One encode call: quality, lossless flag, codec.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
///
/// Only constructed through [`Quality::new`] or the ladder steps, so the value
/// is always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// One rung down the ladder, never below `floor`.
    pub fn step_down(self, step: u32, floor: Quality) -> Self {
        Self(self.0.saturating_sub(step).max(floor.0))
    }

    /// One rung up the ladder, never above `ceiling`.
    pub fn step_up(self, step: u32, ceiling: Quality) -> Self {
        Self(self.0.saturating_add(step).min(ceiling.0))
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(86)
    }
}

/// Codec used for derivatives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Webp,
    Jpeg,
}

impl OutputFormat {
    /// File extension (without the dot) used for derivative keys.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    /// Longest edge the codec can store. WebP keeps dimensions in 14 bits,
    /// JPEG in 16.
    pub fn max_dimension(self) -> u32 {
        match self {
            OutputFormat::Webp => 16_383,
            OutputFormat::Jpeg => 65_535,
        }
    }
}

/// Parameters for a single encode call.
///
/// `quality` is still passed when `lossless` is set: libwebp reads it as the
/// compression effort in lossless mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParams {
    pub quality: Quality,
    pub lossless: bool,
    pub format: OutputFormat,
}

impl EncodeParams {
    pub fn lossy(quality: Quality, format: OutputFormat) -> Self {
        Self {
            quality,
            lossless: false,
            format,
        }
    }

    pub fn lossless(quality: Quality, format: OutputFormat) -> Self {
        Self {
            quality,
            lossless: true,
            format,
        }
    }
}
