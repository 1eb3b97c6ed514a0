//! CLI output formatting.
//!
//! Every line names the object first, with sizes and settings as indented
//! context underneath, so the output reads as a log of what changed in the
//! bucket.
//!
//! # Output Format
//!
//! ## Handle / Backfill
//!
//! ```text
//! public/trips/IMG_0042.JPG → public_middle/trips/IMG_0042.webp
//!     5.8 MB → 884.2 KB, q78, 3000x2000 (resized)
//!     Info: public_middle/trips/IMG_0042_info.json
//! public/trips/notes.txt: skipped (not an image)
//! Deleted public_middle/trips/IMG_0041.webp
//! public/broken.jpg: FAILED
//!     Compression failed: cannot decode image: ...
//! Index public_middle/photo_list_tracker.json: +1
//!
//! Derived 1, deleted 1, skipped 1, failed 1
//! ```
//!
//! ## Compress
//!
//! ```text
//! IMG_0042.JPG → IMG_0042.webp
//!     5.8 MB → 884.2 KB, q78, 3000x2000 (resized)
//!     6 encodes
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::imaging::CompressionResult;
use crate::index::IndexChange;
use crate::process::{DerivedImage, ProcessEvent, ProcessSummary, SkipReason};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Binary units with one decimal, matching how target sizes are configured.
fn human_bytes(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KIB * KIB {
        format!("{:.1} MB", b / (KIB * KIB))
    } else if b >= KIB {
        format!("{:.1} KB", b / KIB)
    } else {
        format!("{bytes} B")
    }
}

/// `5.8 MB → 884.2 KB, q78, 3000x2000 (resized)`
fn size_line(
    source_bytes: usize,
    bytes: usize,
    quality: u32,
    lossless: bool,
    (width, height): (u32, u32),
    resized: bool,
) -> String {
    let setting = if lossless {
        "lossless".to_string()
    } else {
        format!("q{quality}")
    };
    let mut line = format!(
        "{}{} → {}, {setting}, {width}x{height}",
        indent(1),
        human_bytes(source_bytes),
        human_bytes(bytes),
    );
    if resized {
        line.push_str(" (resized)");
    }
    line
}

fn skip_reason(reason: &SkipReason) -> String {
    match reason {
        SkipReason::OutsidePrefix => "outside source prefix".to_string(),
        SkipReason::NotAnImage => "not an image".to_string(),
        SkipReason::UnhandledEvent(name) => format!("unhandled event {name}"),
    }
}

// ============================================================================
// Processing
// ============================================================================

fn format_derived(d: &DerivedImage) -> Vec<String> {
    let mut lines = vec![
        format!("{} → {}", d.source, d.destination),
        size_line(
            d.source_bytes,
            d.bytes,
            d.quality,
            d.lossless,
            (d.width, d.height),
            d.resized,
        ),
    ];
    if !d.met_target {
        lines.push(format!("{}Over target size", indent(1)));
    }
    if let Some(info) = &d.info {
        lines.push(format!("{}Info: {info}", indent(1)));
    }
    lines
}

/// Format a single processing event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Derived(derived) => format_derived(derived),
        ProcessEvent::Skipped { key, reason } => {
            vec![format!("{key}: skipped ({})", skip_reason(reason))]
        }
        ProcessEvent::Deleted { key } => vec![format!("Deleted {key}")],
        ProcessEvent::Failed { key, error } => {
            vec![format!("{key}: FAILED"), format!("{}{error}", indent(1))]
        }
        ProcessEvent::IndexUpdated {
            key,
            change,
            changed,
        } => {
            let sign = match change {
                IndexChange::Add => '+',
                IndexChange::Remove => '-',
            };
            vec![format!("Index {key}: {sign}{changed}")]
        }
        ProcessEvent::IndexRebuilt { key, entries } => {
            vec![format!("Index {key}: rebuilt, {entries} entries")]
        }
    }
}

pub fn format_summary(summary: &ProcessSummary) -> Vec<String> {
    vec![format!(
        "Derived {}, deleted {}, skipped {}, failed {}",
        summary.derived, summary.deleted, summary.skipped, summary.failed
    )]
}

pub fn print_summary(summary: &ProcessSummary) {
    println!();
    for line in format_summary(summary) {
        println!("{line}");
    }
}

// ============================================================================
// Compress
// ============================================================================

pub fn format_compress_output(
    input: &Path,
    output: &Path,
    source_bytes: usize,
    result: &CompressionResult,
    target_bytes: usize,
) -> Vec<String> {
    let name = |p: &Path| {
        p.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| p.display().to_string())
    };
    let dims = result.dimensions;
    let mut lines = vec![
        format!("{} → {}", name(input), name(output)),
        size_line(
            source_bytes,
            result.len(),
            result.quality.value(),
            result.lossless,
            (dims.width, dims.height),
            result.resized(),
        ),
        format!("{}{} encodes", indent(1), result.encodes),
    ];
    if result.len() > target_bytes {
        lines.push(format!(
            "{}Over target size ({})",
            indent(1),
            human_bytes(target_bytes)
        ));
    }
    lines
}

pub fn print_compress_output(
    input: &Path,
    output: &Path,
    source_bytes: usize,
    result: &CompressionResult,
    target_bytes: usize,
) {
    for line in format_compress_output(input, output, source_bytes, result, target_bytes) {
        println!("{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{Dimensions, OutputFormat, Quality};

    fn derived() -> DerivedImage {
        DerivedImage {
            source: "public/a.JPG".into(),
            destination: "public_middle/a.webp".into(),
            source_bytes: 6 * 1024 * 1024,
            bytes: 900 * 1024,
            quality: 78,
            lossless: false,
            width: 3000,
            height: 2000,
            resized: true,
            met_target: true,
            encodes: 6,
            info: Some("public_middle/a_info.json".into()),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[test]
    fn indent_levels() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.5 KB");
        assert_eq!(human_bytes(25 * 1024 * 1024), "25.0 MB");
    }

    // =========================================================================
    // Process events
    // =========================================================================

    #[test]
    fn derived_event() {
        let lines = format_process_event(&ProcessEvent::Derived(derived()));
        assert_eq!(
            lines,
            vec![
                "public/a.JPG → public_middle/a.webp",
                "    6.0 MB → 900.0 KB, q78, 3000x2000 (resized)",
                "    Info: public_middle/a_info.json",
            ]
        );
    }

    #[test]
    fn derived_lossless_over_target() {
        let event = ProcessEvent::Derived(DerivedImage {
            lossless: true,
            resized: false,
            met_target: false,
            info: None,
            ..derived()
        });
        let lines = format_process_event(&event);
        assert_eq!(lines[1], "    6.0 MB → 900.0 KB, lossless, 3000x2000");
        assert_eq!(lines[2], "    Over target size");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn skipped_deleted_failed() {
        let skipped = ProcessEvent::Skipped {
            key: "public/x.txt".into(),
            reason: SkipReason::NotAnImage,
        };
        assert_eq!(
            format_process_event(&skipped),
            vec!["public/x.txt: skipped (not an image)"]
        );

        let deleted = ProcessEvent::Deleted {
            key: "public_middle/a.webp".into(),
        };
        assert_eq!(
            format_process_event(&deleted),
            vec!["Deleted public_middle/a.webp"]
        );

        let failed = ProcessEvent::Failed {
            key: "public/b.jpg".into(),
            error: "boom".into(),
        };
        assert_eq!(
            format_process_event(&failed),
            vec!["public/b.jpg: FAILED", "    boom"]
        );
    }

    #[test]
    fn unhandled_event_names_event() {
        let event = ProcessEvent::Skipped {
            key: "public/a.jpg".into(),
            reason: SkipReason::UnhandledEvent("ObjectRestore:Completed".into()),
        };
        assert_eq!(
            format_process_event(&event),
            vec!["public/a.jpg: skipped (unhandled event ObjectRestore:Completed)"]
        );
    }

    #[test]
    fn index_events() {
        let updated = ProcessEvent::IndexUpdated {
            key: "idx.json".into(),
            change: IndexChange::Remove,
            changed: 2,
        };
        assert_eq!(format_process_event(&updated), vec!["Index idx.json: -2"]);

        let rebuilt = ProcessEvent::IndexRebuilt {
            key: "idx.json".into(),
            entries: 40,
        };
        assert_eq!(
            format_process_event(&rebuilt),
            vec!["Index idx.json: rebuilt, 40 entries"]
        );
    }

    #[test]
    fn summary_line() {
        let summary = ProcessSummary {
            derived: 3,
            skipped: 1,
            deleted: 2,
            failed: 0,
        };
        assert_eq!(
            format_summary(&summary),
            vec!["Derived 3, deleted 2, skipped 1, failed 0"]
        );
    }

    // =========================================================================
    // Compress
    // =========================================================================

    #[test]
    fn compress_output_reports_encodes_and_overshoot() {
        let result = CompressionResult {
            bytes: vec![0; 2048],
            quality: Quality::new(40),
            lossless: false,
            dimensions: Dimensions {
                width: 800,
                height: 600,
            },
            source_dimensions: Dimensions {
                width: 800,
                height: 600,
            },
            format: OutputFormat::Webp,
            encodes: 7,
        };
        let lines = format_compress_output(
            Path::new("/tmp/in/photo.png"),
            Path::new("out/photo.webp"),
            4096,
            &result,
            1024,
        );
        assert_eq!(
            lines,
            vec![
                "photo.png → photo.webp",
                "    4.0 KB → 2.0 KB, q40, 800x600",
                "    7 encodes",
                "    Over target size (1.0 KB)",
            ]
        );
    }
}
