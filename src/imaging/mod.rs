//! Image processing: decode, downscale, and encode under a byte budget.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader`, first frame, EXIF orientation applied |
//! | **Resize** | Lanczos3, longer edge bounded by `max_dimension` |
//! | **Encode → WebP** | libwebp via `webp`, lossy or lossless |
//! | **Encode → JPEG** | `image::codecs::jpeg` |
//! | **EXIF summary** | `kamadak-exif` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension and byte math (unit testable)
//! - **Parameters**: Data structures describing encode calls
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend
//! - **Compress**: the adaptive quality/resolution search

pub mod backend;
mod calculations;
pub mod compress;
pub mod exif_info;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{fit_within, kib, mib, recovery_floor};
pub use compress::{CompressError, CompressionConfig, CompressionResult, InvalidConfig, compress};
pub use exif_info::ExifInfo;
pub use operations::ensure_max_dimension;
pub use params::{EncodeParams, OutputFormat, Quality};
pub use rust_backend::RustBackend;
