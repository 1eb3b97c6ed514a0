//! Pure calculation functions for image dimensions and byte budgets.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the dimensions that bound the longer edge to `max_dimension`.
///
/// Returns `None` when the image already fits (the resize is a no-op);
/// images are never upscaled. Otherwise the longer edge becomes exactly
/// `max_dimension` and the shorter edge is scaled by the same factor,
/// rounded down and kept at least 1px.
///
/// # Examples
/// ```
/// # use gallery_derive::imaging::fit_within;
/// assert_eq!(fit_within((6000, 4000), 3000), Some((3000, 2000)));
/// assert_eq!(fit_within((1000, 800), 3000), None);
/// ```
pub fn fit_within(dimensions: (u32, u32), max_dimension: u32) -> Option<(u32, u32)> {
    let (width, height) = dimensions;
    let longer_edge = width.max(height);
    if longer_edge <= max_dimension {
        return None;
    }

    let scale = |edge: u32| -> u32 {
        ((edge as u64 * max_dimension as u64) / longer_edge as u64).max(1) as u32
    };

    if width >= height {
        // Landscape or square
        Some((max_dimension, scale(height)))
    } else {
        // Portrait
        Some((scale(width), max_dimension))
    }
}

/// Kibibytes to bytes. `None` when the result does not fit in `usize`.
pub fn kib(kb: u64) -> Option<usize> {
    kb.checked_mul(1024).and_then(|bytes| usize::try_from(bytes).ok())
}

/// Mebibytes (fractional) to bytes, rounded down.
pub fn mib(mb: f64) -> usize {
    (mb * 1024.0 * 1024.0) as usize
}

/// Lower size bound for the quality-recovery pass: `target × ratio`, rounded down.
pub fn recovery_floor(target_bytes: usize, min_target_ratio: f64) -> usize {
    (target_bytes as f64 * min_target_ratio) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // fit_within tests
    // =========================================================================

    #[test]
    fn fit_landscape_longer_edge_is_max() {
        assert_eq!(fit_within((6000, 4000), 3000), Some((3000, 2000)));
    }

    #[test]
    fn fit_portrait_longer_edge_is_max() {
        assert_eq!(fit_within((4000, 6000), 3000), Some((2000, 3000)));
    }

    #[test]
    fn fit_square() {
        assert_eq!(fit_within((5000, 5000), 3000), Some((3000, 3000)));
    }

    #[test]
    fn fit_rounds_short_edge_down() {
        // 1000 * 3000 / 4001 = 749.81 → 749
        assert_eq!(fit_within((4001, 1000), 3000), Some((3000, 749)));
    }

    #[test]
    fn fit_exactly_at_max_is_noop() {
        assert_eq!(fit_within((3000, 1200), 3000), None);
    }

    #[test]
    fn fit_smaller_is_noop() {
        assert_eq!(fit_within((800, 600), 3000), None);
    }

    #[test]
    fn fit_extreme_aspect_keeps_one_pixel() {
        assert_eq!(fit_within((10000, 1), 100), Some((100, 1)));
    }

    // =========================================================================
    // byte budget tests
    // =========================================================================

    #[test]
    fn kib_and_mib() {
        assert_eq!(kib(1024), Some(1024 * 1024));
        assert_eq!(mib(25.0), 25 * 1024 * 1024);
        assert_eq!(mib(0.5), 512 * 1024);
    }

    #[test]
    fn kib_overflow_is_none() {
        assert_eq!(kib(u64::MAX / 1024 + 1), None);
        assert_eq!(kib(u64::MAX), None);
    }

    #[test]
    fn recovery_floor_rounds_down() {
        assert_eq!(recovery_floor(1000, 0.6), 600);
        assert_eq!(recovery_floor(1_048_576, 0.6), 629_145);
        assert_eq!(recovery_floor(1000, 1.0), 1000);
    }
}
