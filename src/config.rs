//! Configuration loading, validation, and merging.
//!
//! Three layers, later ones winning:
//!
//! ```text
//! stock defaults  →  config file (--config, TOML)  →  environment variables
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [bucket]
//! name = "photo-gallery"
//! source_prefix = "public"            # originals live under public/
//! destination_prefix = "public_middle" # derivatives mirror them here
//! # public_base_url = "https://cdn.example.com/"  # default: https://<name>.s3.amazonaws.com/
//!
//! [compression]
//! target_size_kb = 1024
//! quality = 86
//! min_quality = 60
//! fallback_min_quality = 40
//! max_dimension = 3000
//! min_target_ratio = 0.6
//! large_image_mb = 25.0
//! quality_step = 8
//! max_quality_steps = 6
//! max_pixels = 100000000
//! format = "webp"                     # or "jpeg"
//!
//! [index]
//! enabled = true
//! key = "public_middle/photo_list_tracker.json"
//!
//! [info]
//! enabled = true                      # write <name>_info.json for JPEG sources
//!
//! [processing]
//! max_processes = 4                   # omit for auto = CPU cores
//! ```
//!
//! ## Environment
//!
//! Deployments configured through the environment keep working; each variable
//! overrides one key:
//!
//! | Variable | Key |
//! |---|---|
//! | `BUCKET_NAME` | `bucket.name` |
//! | `SOURCE_PREFIX` | `bucket.source_prefix` |
//! | `DEST_PREFIX` | `bucket.destination_prefix` |
//! | `TARGET_SIZE_KB` | `compression.target_size_kb` |
//! | `WEBP_QUALITY` | `compression.quality` |
//! | `MIN_QUALITY` | `compression.min_quality` |
//! | `MAX_DIM` | `compression.max_dimension` |
//! | `MIN_TARGET_RATIO` | `compression.min_target_ratio` |
//! | `FALLBACK_MIN_QUALITY` | `compression.fallback_min_quality` |
//! | `LARGE_IMAGE_MB` | `compression.large_image_mb` |
//! | `QUALITY_STEP` | `compression.quality_step` |
//! | `MAX_QUALITY_STEPS` | `compression.max_quality_steps` |
//!
//! Unknown keys in the file are rejected to catch typos early.

use crate::imaging::{CompressionConfig, OutputFormat, Quality, kib, mib};
use crate::keys;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid value {value:?} for environment variable {var}")]
    Env { var: &'static str, value: String },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full configuration. Every field has a default; files and the environment
/// only need the values they override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    /// Where originals and derivatives live.
    pub bucket: BucketConfig,
    /// Byte budget and quality ladder.
    pub compression: CompressionSettings,
    /// Public URL index of derivatives.
    pub index: IndexConfig,
    /// EXIF companion files.
    pub info: InfoConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl GalleryConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bucket.validate()?;
        if kib(self.compression.target_size_kb).is_none() {
            return Err(ConfigError::Validation(
                "compression.target_size_kb is too large".into(),
            ));
        }
        self.compression
            .to_compression_config()
            .validate()
            .map_err(|e| ConfigError::Validation(e.0))?;
        let c = &self.compression;
        for (name, value) in [
            ("quality", c.quality),
            ("min_quality", c.min_quality),
            ("fallback_min_quality", c.fallback_min_quality),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "compression.{name} must be 1-100"
                )));
            }
        }
        if !(c.large_image_mb > 0.0) {
            return Err(ConfigError::Validation(
                "compression.large_image_mb must be positive".into(),
            ));
        }
        if self.index.enabled && self.index.key.is_empty() {
            return Err(ConfigError::Validation(
                "index.key must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BucketConfig {
    pub name: String,
    /// Originals live under `<source_prefix>/`.
    pub source_prefix: String,
    pub destination_prefix: String,
    /// Base for index URLs. Defaults to the bucket's S3 endpoint.
    pub public_base_url: Option<String>,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            name: "photo-gallery".to_string(),
            source_prefix: "public".to_string(),
            destination_prefix: "public_middle".to_string(),
            public_base_url: None,
        }
    }
}

impl BucketConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, prefix) in [
            ("source_prefix", &self.source_prefix),
            ("destination_prefix", &self.destination_prefix),
        ] {
            if prefix.is_empty() || prefix.starts_with('/') || prefix.ends_with('/') {
                return Err(ConfigError::Validation(format!(
                    "bucket.{name} must be non-empty without leading or trailing '/'"
                )));
            }
        }
        let inside = |inner: &str, outer: &str| keys::is_under_prefix(&format!("{inner}/x"), outer);
        if self.source_prefix == self.destination_prefix
            || inside(&self.destination_prefix, &self.source_prefix)
            || inside(&self.source_prefix, &self.destination_prefix)
        {
            return Err(ConfigError::Validation(
                "bucket.source_prefix and bucket.destination_prefix must not nest".into(),
            ));
        }
        Ok(())
    }

    pub fn public_base(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| keys::default_public_base(&self.name))
    }

    pub fn public_url(&self, key: &str) -> String {
        keys::public_url(&self.public_base(), key)
    }

    /// `<source_prefix>/`, the listing prefix for originals.
    pub fn source_listing_prefix(&self) -> String {
        format!("{}/", self.source_prefix)
    }

    /// `<destination_prefix>/`, the listing prefix for derivatives.
    pub fn destination_listing_prefix(&self) -> String {
        format!("{}/", self.destination_prefix)
    }
}

/// Compression settings in deployment units (KB, MB, plain integers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionSettings {
    pub target_size_kb: u64,
    /// Starting (and maximum) lossy quality.
    pub quality: u32,
    pub min_quality: u32,
    pub fallback_min_quality: u32,
    pub max_dimension: u32,
    pub min_target_ratio: f64,
    /// Inputs above this size are downscaled before the first encode.
    pub large_image_mb: f64,
    pub quality_step: u32,
    pub max_quality_steps: u32,
    pub max_pixels: u64,
    pub format: OutputFormat,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        let c = CompressionConfig::default();
        Self {
            target_size_kb: (c.target_bytes / 1024) as u64,
            quality: c.start_quality.value(),
            min_quality: c.min_quality.value(),
            fallback_min_quality: c.fallback_min_quality.value(),
            max_dimension: c.max_dimension,
            min_target_ratio: c.min_target_ratio,
            large_image_mb: c.large_input_bytes as f64 / (1024.0 * 1024.0),
            quality_step: c.quality_step,
            max_quality_steps: c.max_steps_per_ladder,
            max_pixels: c.max_pixels,
            format: c.format,
        }
    }
}

impl CompressionSettings {
    pub fn to_compression_config(&self) -> CompressionConfig {
        CompressionConfig {
            target_bytes: kib(self.target_size_kb).unwrap_or(usize::MAX),
            start_quality: Quality::new(self.quality),
            min_quality: Quality::new(self.min_quality),
            fallback_min_quality: Quality::new(self.fallback_min_quality),
            max_dimension: self.max_dimension,
            min_target_ratio: self.min_target_ratio,
            large_input_bytes: mib(self.large_image_mb),
            quality_step: self.quality_step,
            max_steps_per_ladder: self.max_quality_steps,
            max_pixels: self.max_pixels,
            format: self.format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    pub enabled: bool,
    /// Object key of the JSON URL list.
    pub key: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key: "public_middle/photo_list_tracker.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InfoConfig {
    /// Write `<name>_info.json` next to derivatives of JPEG sources.
    pub enabled: bool,
}

impl Default for InfoConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(GalleryConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

#[derive(Clone, Copy)]
enum EnvKind {
    Str,
    Int,
    Float,
}

/// `(variable, section, key, kind)`
const ENV_VARS: [(&str, &str, &str, EnvKind); 12] = [
    ("BUCKET_NAME", "bucket", "name", EnvKind::Str),
    ("SOURCE_PREFIX", "bucket", "source_prefix", EnvKind::Str),
    ("DEST_PREFIX", "bucket", "destination_prefix", EnvKind::Str),
    ("TARGET_SIZE_KB", "compression", "target_size_kb", EnvKind::Int),
    ("WEBP_QUALITY", "compression", "quality", EnvKind::Int),
    ("MIN_QUALITY", "compression", "min_quality", EnvKind::Int),
    ("MAX_DIM", "compression", "max_dimension", EnvKind::Int),
    ("MIN_TARGET_RATIO", "compression", "min_target_ratio", EnvKind::Float),
    ("FALLBACK_MIN_QUALITY", "compression", "fallback_min_quality", EnvKind::Int),
    ("LARGE_IMAGE_MB", "compression", "large_image_mb", EnvKind::Float),
    ("QUALITY_STEP", "compression", "quality_step", EnvKind::Int),
    ("MAX_QUALITY_STEPS", "compression", "max_quality_steps", EnvKind::Int),
];

/// Build a TOML overlay from environment variables.
///
/// `lookup` abstracts `std::env::var` so tests never touch the process
/// environment. Returns `Ok(None)` when no variable is set.
pub fn env_overlay(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<toml::Value>, ConfigError> {
    let mut root = toml::Table::new();
    for (var, section, key, kind) in ENV_VARS {
        let Some(raw) = lookup(var) else {
            continue;
        };
        let trimmed = raw.trim();
        let invalid = || ConfigError::Env {
            var,
            value: raw.clone(),
        };
        let value = match kind {
            EnvKind::Str => toml::Value::String(trimmed.to_string()),
            EnvKind::Int => toml::Value::Integer(trimmed.parse().map_err(|_| invalid())?),
            EnvKind::Float => toml::Value::Float(trimmed.parse().map_err(|_| invalid())?),
        };
        let table = root
            .entry(section)
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if let toml::Value::Table(t) = table {
            t.insert(key.to_string(), value);
        }
    }
    Ok((!root.is_empty()).then_some(toml::Value::Table(root)))
}

/// Merge optional overlays onto a base value in order, then deserialize and
/// validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = Option<toml::Value>>,
) -> Result<GalleryConfig, ConfigError> {
    let merged = overlays.into_iter().flatten().fold(base, merge_toml);
    let config: GalleryConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config: stock defaults, then `path` (if given and present), then the
/// process environment.
pub fn load_config(path: Option<&Path>) -> Result<GalleryConfig, ConfigError> {
    let file = match path {
        Some(p) => load_raw_config(p)?,
        None => None,
    };
    let env = env_overlay(|var| std::env::var(var).ok())?;
    resolve_config(stock_defaults_value(), [file, env])
}

/// Returns a fully-commented stock config file with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# gallery-derive Configuration
# ============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Environment variables (BUCKET_NAME, TARGET_SIZE_KB, WEBP_QUALITY, ...)
# override values from this file.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Bucket layout
# ---------------------------------------------------------------------------
[bucket]
name = "photo-gallery"

# Originals are read from <source_prefix>/...
source_prefix = "public"

# Derivatives are written to <destination_prefix>/... with the same relative path.
destination_prefix = "public_middle"

# Base URL for index entries. Default: https://<name>.s3.amazonaws.com/
# public_base_url = "https://cdn.example.com/"

# ---------------------------------------------------------------------------
# Compression
# ---------------------------------------------------------------------------
[compression]
# Byte budget per derivative, in KiB.
target_size_kb = 1024

# Lossy quality to start from; also the ceiling when quality is recovered
# after a downscale.
quality = 86

# Floor for the quality ladder.
min_quality = 60

# Lower floor, used only when the image is already within max_dimension.
fallback_min_quality = 40

# Longer edge limit when downscaling, in pixels.
max_dimension = 3000

# After a downscale, raise quality again while output < target * ratio.
min_target_ratio = 0.6

# Inputs larger than this (MiB) are downscaled before the first encode.
large_image_mb = 25.0

# Quality decrement per ladder rung, and rungs per ladder.
quality_step = 8
max_quality_steps = 6

# Decoded images above this pixel count are rejected.
max_pixels = 100000000

# Derivative codec: "webp" or "jpeg".
format = "webp"

# ---------------------------------------------------------------------------
# URL index
# ---------------------------------------------------------------------------
[index]
enabled = true
key = "public_middle/photo_list_tracker.json"

# ---------------------------------------------------------------------------
# EXIF info files
# ---------------------------------------------------------------------------
[info]
# Write <name>_info.json next to derivatives of JPEG sources.
enabled = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for folder events and backfill.
# Omit for auto-detection (number of CPU cores).
# max_processes = 4
"##
}
