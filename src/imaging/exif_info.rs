//! Human-readable EXIF summary for `<name>_info.json` companion files.
//!
//! Only five shooting parameters are surfaced, each formatted for display:
//!
//! | Key | EXIF tag | Example |
//! |---|---|---|
//! | `Exposure Time` | `ExposureTime` | `1/200 sec`, `2 sec` |
//! | `F Number` | `FNumber` | `F/2.8` |
//! | `ISO Speed` | `PhotographicSensitivity` | `400` |
//! | `Focal Length` | `FocalLength` | `35.0 mm` |
//! | `Flash` | `Flash` | `No Flash`, `Fired` |
//!
//! Missing tags are omitted; unreadable EXIF yields an empty summary.

use exif::{Exif, In, Reader, Rational, Tag, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Cursor;

/// Display-ready EXIF fields keyed by their human-readable name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ExifInfo(pub BTreeMap<String, String>);

impl ExifInfo {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    fn insert(&mut self, key: &str, value: String) {
        self.0.insert(key.to_string(), value);
    }
}

/// Parse EXIF from any container `kamadak-exif` understands (JPEG, TIFF, PNG, WebP).
pub fn read_exif_info(raw: &[u8]) -> ExifInfo {
    match Reader::new().read_from_container(&mut Cursor::new(raw)) {
        Ok(exif) => summarize(&exif),
        Err(e) => {
            tracing::debug!(error = %e, "no readable EXIF");
            ExifInfo::default()
        }
    }
}

/// Read the EXIF orientation tag (1–8). Returns 1 (upright) when absent.
pub fn read_orientation(raw: &[u8]) -> u32 {
    Reader::new()
        .read_from_container(&mut Cursor::new(raw))
        .ok()
        .and_then(|exif| {
            exif.get_field(Tag::Orientation, In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
        })
        .unwrap_or(1)
}

fn summarize(exif: &Exif) -> ExifInfo {
    let mut info = ExifInfo::default();

    if let Some(r) = first_rational(exif, Tag::ExposureTime) {
        info.insert("Exposure Time", format_exposure(r));
    }
    if let Some(r) = first_rational(exif, Tag::FNumber) {
        info.insert("F Number", format_f_number(r));
    }
    if let Some(iso) = first_uint(exif, Tag::PhotographicSensitivity) {
        info.insert("ISO Speed", iso.to_string());
    }
    if let Some(r) = first_rational(exif, Tag::FocalLength) {
        info.insert("Focal Length", format_focal_length(r));
    }
    if let Some(flash) = first_uint(exif, Tag::Flash) {
        info.insert("Flash", format_flash(flash).to_string());
    }

    info
}

fn first_rational(exif: &Exif, tag: Tag) -> Option<Rational> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(values) => values.first().copied(),
        _ => None,
    }
}

fn first_uint(exif: &Exif, tag: Tag) -> Option<u32> {
    exif.get_field(tag, In::PRIMARY)?.value.get_uint(0)
}

/// `1/200 sec`, or `2 sec` when the denominator is 1.
fn format_exposure(r: Rational) -> String {
    if r.denom == 1 {
        format!("{} sec", r.num)
    } else {
        format!("{}/{} sec", r.num, r.denom)
    }
}

fn format_f_number(r: Rational) -> String {
    format!("F/{:.1}", ratio(r))
}

/// Keeps at least one decimal: `50.0 mm`, `4.25 mm`.
fn format_focal_length(r: Rational) -> String {
    format!("{:?} mm", ratio(r))
}

fn format_flash(value: u32) -> &'static str {
    match value {
        0 => "No Flash",
        1 => "Fired",
        5 => "Fired, Return not detected",
        7 => "Fired, Return detected",
        _ => "Unknown Flash status",
    }
}

fn ratio(r: Rational) -> f64 {
    if r.denom == 0 {
        0.0
    } else {
        r.num as f64 / r.denom as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(num: u32, denom: u32) -> Rational {
        Rational { num, denom }
    }

    #[test]
    fn exposure_fraction() {
        assert_eq!(format_exposure(r(1, 200)), "1/200 sec");
    }

    #[test]
    fn exposure_whole_seconds() {
        assert_eq!(format_exposure(r(2, 1)), "2 sec");
    }

    #[test]
    fn f_number_one_decimal() {
        assert_eq!(format_f_number(r(28, 10)), "F/2.8");
        assert_eq!(format_f_number(r(8, 1)), "F/8.0");
    }

    #[test]
    fn focal_length_keeps_decimal() {
        assert_eq!(format_focal_length(r(50, 1)), "50.0 mm");
        assert_eq!(format_focal_length(r(425, 100)), "4.25 mm");
    }

    #[test]
    fn zero_denominator_does_not_panic() {
        assert_eq!(format_f_number(r(5, 0)), "F/0.0");
    }

    #[test]
    fn flash_states() {
        assert_eq!(format_flash(0), "No Flash");
        assert_eq!(format_flash(1), "Fired");
        assert_eq!(format_flash(5), "Fired, Return not detected");
        assert_eq!(format_flash(7), "Fired, Return detected");
        assert_eq!(format_flash(16), "Unknown Flash status");
    }

    #[test]
    fn garbage_yields_empty_info() {
        assert!(read_exif_info(b"not an image").is_empty());
    }

    #[test]
    fn missing_orientation_is_upright() {
        assert_eq!(read_orientation(b"not an image"), 1);
    }

    #[test]
    fn info_serializes_as_flat_object() {
        let mut info = ExifInfo::default();
        info.insert("F Number", "F/2.8".into());
        info.insert("Flash", "No Flash".into());
        let json = serde_json::to_string(&info).unwrap();
        assert_eq!(json, r#"{"F Number":"F/2.8","Flash":"No Flash"}"#);
    }
}
