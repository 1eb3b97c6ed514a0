//! Object key conventions.
//!
//! Originals live under a source prefix; each derivative mirrors the original's
//! path under the destination prefix with the codec's extension:
//!
//! ```text
//! public/trips/2024/IMG_0042.JPG       (original)
//! public_middle/trips/2024/IMG_0042.webp (derivative)
//! public_middle/trips/2024/IMG_0042_info.json (EXIF summary, JPEG sources)
//! ```
//!
//! Keys are `/`-separated strings, never filesystem paths. A key ending in `/`
//! names a folder.

use crate::imaging::OutputFormat;

/// Extensions (lowercase, no dot) recognized as source images.
pub const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff", "webp"];

/// Extension of the last path segment, without the dot. A leading dot
/// (`.hidden`) is part of the name, not an extension.
fn extension(key: &str) -> Option<&str> {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rfind('.') {
        Some(pos) if pos > 0 => Some(&name[pos + 1..]),
        _ => None,
    }
}

/// Everything except the extension of the last segment.
fn strip_extension(key: &str) -> &str {
    match extension(key) {
        Some(ext) => &key[..key.len() - ext.len() - 1],
        None => key,
    }
}

pub fn is_folder_key(key: &str) -> bool {
    key.ends_with('/')
}

pub fn is_image_key(key: &str) -> bool {
    !is_folder_key(key)
        && extension(key).is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// JPEG sources get an `_info.json` companion.
pub fn is_jpeg_key(key: &str) -> bool {
    extension(key).is_some_and(|ext| {
        ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
    })
}

/// True when `key` lies strictly below `prefix/`.
pub fn is_under_prefix(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/') && rest.len() > 1)
}

/// Re-root `key` from `src_prefix` onto `dst_prefix`, keeping the rest of the
/// path (including a trailing `/` for folders).
pub fn mirror_key(key: &str, src_prefix: &str, dst_prefix: &str) -> Option<String> {
    if !is_under_prefix(key, src_prefix) {
        return None;
    }
    Some(format!("{dst_prefix}{}", &key[src_prefix.len()..]))
}

/// Derivative key for an original.
///
/// ```
/// # use gallery_derive::keys::destination_key;
/// # use gallery_derive::imaging::OutputFormat;
/// assert_eq!(
///     destination_key("public/a/b.JPG", "public", "public_middle", OutputFormat::Webp).as_deref(),
///     Some("public_middle/a/b.webp")
/// );
/// assert_eq!(destination_key("private/b.jpg", "public", "public_middle", OutputFormat::Webp), None);
/// ```
pub fn destination_key(
    source: &str,
    src_prefix: &str,
    dst_prefix: &str,
    format: OutputFormat,
) -> Option<String> {
    let mirrored = mirror_key(source, src_prefix, dst_prefix)?;
    Some(format!("{}.{}", strip_extension(&mirrored), format.extension()))
}

/// `<stem>_info.json` next to a derivative.
pub fn info_key(destination: &str) -> String {
    format!("{}_info.json", strip_extension(destination))
}

/// Public URL base for an S3 bucket with virtual-hosted addressing.
pub fn default_public_base(bucket: &str) -> String {
    format!("https://{bucket}.s3.amazonaws.com/")
}

pub fn public_url(base: &str, key: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{key}")
    } else {
        format!("{base}/{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions_case_insensitive() {
        assert!(is_image_key("public/a.jpg"));
        assert!(is_image_key("public/a.JPEG"));
        assert!(is_image_key("public/a.Tiff"));
        assert!(is_image_key("public/a.webp"));
        assert!(!is_image_key("public/a.txt"));
        assert!(!is_image_key("public/notes"));
        assert!(!is_image_key("public/.jpg"));
    }

    #[test]
    fn folder_is_not_an_image() {
        assert!(is_folder_key("public/trip.jpg/"));
        assert!(!is_image_key("public/trip.jpg/"));
    }

    #[test]
    fn jpeg_detection() {
        assert!(is_jpeg_key("x/IMG.JPG"));
        assert!(is_jpeg_key("x/img.jpeg"));
        assert!(!is_jpeg_key("x/img.png"));
    }

    #[test]
    fn dot_in_folder_is_not_an_extension() {
        assert_eq!(extension("public/v1.2/photo"), None);
        assert_eq!(
            destination_key("public/v1.2/photo", "public", "out", OutputFormat::Webp).as_deref(),
            Some("out/v1.2/photo.webp")
        );
    }

    #[test]
    fn prefix_must_be_a_whole_segment() {
        assert!(is_under_prefix("public/a.jpg", "public"));
        assert!(!is_under_prefix("public_middle/a.webp", "public"));
        assert!(!is_under_prefix("public", "public"));
        assert!(!is_under_prefix("public/", "public"));
        assert!(!is_under_prefix("other/public/a.jpg", "public"));
    }

    #[test]
    fn destination_replaces_extension() {
        assert_eq!(
            destination_key("public/2024/trip/IMG_1.JPG", "public", "public_middle", OutputFormat::Webp)
                .as_deref(),
            Some("public_middle/2024/trip/IMG_1.webp")
        );
        assert_eq!(
            destination_key("public/a.png", "public", "public_small", OutputFormat::Jpeg).as_deref(),
            Some("public_small/a.jpg")
        );
    }

    #[test]
    fn destination_keeps_inner_dots() {
        assert_eq!(
            destination_key("public/my.photo.tif", "public", "d", OutputFormat::Webp).as_deref(),
            Some("d/my.photo.webp")
        );
    }

    #[test]
    fn mirror_keeps_folder_slash() {
        assert_eq!(
            mirror_key("public/trip/", "public", "public_middle").as_deref(),
            Some("public_middle/trip/")
        );
    }

    #[test]
    fn info_key_sits_next_to_derivative() {
        assert_eq!(info_key("public_middle/a/b.webp"), "public_middle/a/b_info.json");
        assert_eq!(info_key("public_middle/a/b"), "public_middle/a/b_info.json");
    }

    #[test]
    fn url_joins_with_single_slash() {
        let base = default_public_base("photos");
        assert_eq!(base, "https://photos.s3.amazonaws.com/");
        assert_eq!(
            public_url(&base, "public_middle/a.webp"),
            "https://photos.s3.amazonaws.com/public_middle/a.webp"
        );
        assert_eq!(
            public_url("https://cdn.example.com", "k.webp"),
            "https://cdn.example.com/k.webp"
        );
    }
}
