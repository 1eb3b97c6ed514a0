//! High-level image operations.
//!
//! These functions combine calculations with backend execution.

use super::backend::ImageBackend;
use super::calculations::fit_within;
use image::DynamicImage;

/// Bound the longer edge to `max_dimension`.
///
/// Returns `None` when the image already fits, so callers can tell "resize
/// changed nothing" apart from "resize produced a new raster". Never upscales.
pub fn ensure_max_dimension(
    backend: &impl ImageBackend,
    image: &DynamicImage,
    max_dimension: u32,
) -> Option<DynamicImage> {
    let (width, height) = fit_within((image.width(), image.height()), max_dimension)?;
    tracing::debug!(
        from_width = image.width(),
        from_height = image.height(),
        width,
        height,
        "downscaling to max dimension"
    );
    Some(backend.resize(image, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp, linear_model};

    #[test]
    fn larger_image_is_resized() {
        let backend = MockBackend::new(600, 400, linear_model(1, 1));
        let img = DynamicImage::new_rgb8(600, 400);

        let resized = ensure_max_dimension(&backend, &img, 300).unwrap();
        assert_eq!((resized.width(), resized.height()), (300, 200));

        let ops = backend.get_operations();
        assert_eq!(ops, vec![RecordedOp::Resize { width: 300, height: 200 }]);
    }

    #[test]
    fn fitting_image_is_untouched() {
        let backend = MockBackend::new(300, 200, linear_model(1, 1));
        let img = DynamicImage::new_rgb8(300, 200);

        assert!(ensure_max_dimension(&backend, &img, 300).is_none());
        assert!(backend.get_operations().is_empty());
    }
}
