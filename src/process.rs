//! Event handling and backfill.
//!
//! A [`Processor`] turns bucket events into derivative writes and deletes:
//!
//! | Event | Action |
//! |---|---|
//! | created `public/a.jpg` | compress → `public_middle/a.webp` (+ `a_info.json` for JPEG), index add |
//! | created `public/trip/` | the above for every image under the folder, in parallel |
//! | removed `public/a.jpg` | delete `public_middle/a.webp` and `a_info.json`, index remove |
//! | removed `public/trip/` | delete everything under `public_middle/trip/`, index remove |
//!
//! Per-object failures never abort a batch: they are logged, reported as
//! [`ProcessEvent::Failed`], and counted in the [`ProcessSummary`]. The index
//! is updated once per record, after the record's objects are done.
//!
//! Progress is reported through an optional `mpsc` channel so the CLI can
//! print from a single thread while work runs on the rayon pool.

use crate::config::GalleryConfig;
use crate::event::{self, EventError, EventKind, ObjectEvent};
use crate::imaging::{CompressError, CompressionConfig, ImageBackend, compress};
use crate::index::{self, IndexChange, IndexError, PhotoIndex};
use crate::keys;
use crate::storage::{ObjectStore, StorageError};
use rayon::prelude::*;
use std::sync::mpsc::Sender;
use thiserror::Error;

const INFO_CONTENT_TYPE: &str = "application/json";

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Compression failed: {0}")]
    Compress(#[from] CompressError),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
    #[error("Notification error: {0}")]
    Event(#[from] EventError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    OutsidePrefix,
    NotAnImage,
    UnhandledEvent(String),
}

/// A derivative that was written.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedImage {
    pub source: String,
    pub destination: String,
    pub source_bytes: usize,
    pub bytes: usize,
    pub quality: u32,
    pub lossless: bool,
    pub width: u32,
    pub height: u32,
    pub resized: bool,
    pub met_target: bool,
    pub encodes: u32,
    /// Key of the `_info.json` companion, when one was written.
    pub info: Option<String>,
}

/// Progress events emitted during processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Derived(DerivedImage),
    Skipped { key: String, reason: SkipReason },
    Deleted { key: String },
    Failed { key: String, error: String },
    IndexUpdated {
        key: String,
        change: IndexChange,
        changed: usize,
    },
    IndexRebuilt { key: String, entries: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub derived: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
}

impl ProcessSummary {
    pub fn merge(self, other: Self) -> Self {
        Self {
            derived: self.derived + other.derived,
            skipped: self.skipped + other.skipped,
            deleted: self.deleted + other.deleted,
            failed: self.failed + other.failed,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// What happened to one object.
enum Outcome {
    /// Destination key of the written derivative.
    Derived(String),
    /// Destination keys of deleted derivatives.
    Deleted(Vec<String>),
    Skipped,
    Failed,
}

impl Outcome {
    fn tally(&self) -> ProcessSummary {
        let mut summary = ProcessSummary::default();
        match self {
            Outcome::Derived(_) => summary.derived = 1,
            Outcome::Deleted(keys) => summary.deleted = keys.len(),
            Outcome::Skipped => summary.skipped = 1,
            Outcome::Failed => summary.failed = 1,
        }
        summary
    }
}

pub struct Processor<'a, B: ImageBackend> {
    store: &'a dyn ObjectStore,
    backend: &'a B,
    config: &'a GalleryConfig,
    compression: CompressionConfig,
    events: Option<Sender<ProcessEvent>>,
}

impl<'a, B: ImageBackend> Processor<'a, B> {
    pub fn new(store: &'a dyn ObjectStore, backend: &'a B, config: &'a GalleryConfig) -> Self {
        Self {
            store,
            backend,
            config,
            compression: config.compression.to_compression_config(),
            events: None,
        }
    }

    /// Report progress on `tx`. The channel closes when the processor drops.
    pub fn with_events(mut self, tx: Sender<ProcessEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }

    /// Parse a notification document and handle every record in it.
    pub fn handle_notification(&self, json: &str) -> Result<ProcessSummary, ProcessError> {
        let events = event::parse_notification(json)?;
        tracing::info!(records = events.len(), "handling notification");
        Ok(events
            .iter()
            .map(|e| self.handle_event(e))
            .fold(ProcessSummary::default(), ProcessSummary::merge))
    }

    pub fn handle_event(&self, event: &ObjectEvent) -> ProcessSummary {
        let key = event.key.as_str();
        match (&event.kind, event.is_folder()) {
            (EventKind::Created, false) => {
                let outcome = self.derive_reporting(key);
                let mut summary = outcome.tally();
                if let Outcome::Derived(dest) = outcome {
                    summary = summary.merge(self.update_index(vec![dest], IndexChange::Add));
                }
                summary
            }
            (EventKind::Created, true) => self.derive_folder(key),
            (EventKind::Removed, false) => self.remove_reporting(key),
            (EventKind::Removed, true) => self.remove_folder(key),
            (EventKind::Other(name), _) => {
                tracing::debug!(key, event = %name, "ignoring event");
                self.skip(key, SkipReason::UnhandledEvent(name.clone()));
                Outcome::Skipped.tally()
            }
        }
    }

    /// Derive every image under the source prefix, then rebuild the index
    /// from the derivatives that now exist.
    pub fn backfill(&self) -> Result<ProcessSummary, ProcessError> {
        let objects = self.store.list(&self.config.bucket.source_listing_prefix())?;
        tracing::info!(objects = objects.len(), "backfilling");
        let summary = self.derive_all(&objects);
        if self.config.index.enabled {
            self.rebuild_index()?;
        }
        Ok(summary)
    }

    pub fn rebuild_index(&self) -> Result<PhotoIndex, ProcessError> {
        let index = index::rebuild(self.store, self.config)?;
        self.emit(ProcessEvent::IndexRebuilt {
            key: self.config.index.key.clone(),
            entries: index.len(),
        });
        Ok(index)
    }

    // =========================================================================
    // Created
    // =========================================================================

    fn derive_folder(&self, folder: &str) -> ProcessSummary {
        let objects = match self.store.list(folder) {
            Ok(objects) => objects,
            Err(e) => return self.fail(folder, &e.into()).tally(),
        };
        tracing::info!(folder, objects = objects.len(), "deriving folder");
        self.derive_all(&objects)
    }

    /// Derive `objects` in parallel, then add the results to the index in one
    /// read-modify-write.
    fn derive_all(&self, objects: &[String]) -> ProcessSummary {
        let outcomes: Vec<Outcome> = objects.par_iter().map(|k| self.derive_reporting(k)).collect();
        let summary = outcomes
            .iter()
            .map(Outcome::tally)
            .fold(ProcessSummary::default(), ProcessSummary::merge);
        let derived: Vec<String> = outcomes
            .into_iter()
            .filter_map(|o| match o {
                Outcome::Derived(dest) => Some(dest),
                _ => None,
            })
            .collect();
        summary.merge(self.update_index(derived, IndexChange::Add))
    }

    fn derive_reporting(&self, key: &str) -> Outcome {
        if let Some(reason) = self.skip_reason(key) {
            self.skip(key, reason);
            return Outcome::Skipped;
        }
        match self.derive(key) {
            Ok(derived) => {
                tracing::info!(
                    source = %derived.source,
                    destination = %derived.destination,
                    bytes = derived.bytes,
                    quality = derived.quality,
                    met_target = derived.met_target,
                    "derived"
                );
                let dest = derived.destination.clone();
                self.emit(ProcessEvent::Derived(derived));
                Outcome::Derived(dest)
            }
            Err(e) => self.fail(key, &e),
        }
    }

    /// Read, compress, write. `key` must already be an image under the
    /// source prefix.
    fn derive(&self, key: &str) -> Result<DerivedImage, ProcessError> {
        let bucket = &self.config.bucket;
        let format = self.compression.format;
        let destination =
            keys::destination_key(key, &bucket.source_prefix, &bucket.destination_prefix, format)
                .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;

        let raw = self.store.get(key)?;
        let result = compress(self.backend, &raw, &self.compression)?;

        let derived = DerivedImage {
            source: key.to_string(),
            destination: destination.clone(),
            source_bytes: raw.len(),
            bytes: result.len(),
            quality: result.quality.value(),
            lossless: result.lossless,
            width: result.dimensions.width,
            height: result.dimensions.height,
            resized: result.resized(),
            met_target: result.met_target(&self.compression),
            encodes: result.encodes,
            info: None,
        };
        if !derived.met_target {
            tracing::warn!(
                key,
                bytes = derived.bytes,
                target = self.compression.target_bytes,
                "derivative exceeds target size"
            );
        }
        // Info first: a derivative on storage always has its companion.
        let info = if self.config.info.enabled && keys::is_jpeg_key(key) {
            let info_key = keys::info_key(&destination);
            let exif = self.backend.read_exif_info(&raw);
            self.store.put(
                &info_key,
                serde_json::to_vec_pretty(&exif)?,
                INFO_CONTENT_TYPE,
            )?;
            Some(info_key)
        } else {
            None
        };

        self.store
            .put(&destination, result.bytes, result.format.content_type())?;

        Ok(DerivedImage { info, ..derived })
    }

    // =========================================================================
    // Removed
    // =========================================================================

    fn remove_reporting(&self, key: &str) -> ProcessSummary {
        if let Some(reason) = self.skip_reason(key) {
            self.skip(key, reason);
            return Outcome::Skipped.tally();
        }
        let outcome = match self.remove(key) {
            Ok(dest) => Outcome::Deleted(vec![dest]),
            Err(e) => self.fail(key, &e),
        };
        let summary = outcome.tally();
        match outcome {
            Outcome::Deleted(dests) => summary.merge(self.update_index(dests, IndexChange::Remove)),
            _ => summary,
        }
    }

    /// Delete the derivative and its info file. Missing objects are fine.
    fn remove(&self, key: &str) -> Result<String, ProcessError> {
        let bucket = &self.config.bucket;
        let destination = keys::destination_key(
            key,
            &bucket.source_prefix,
            &bucket.destination_prefix,
            self.compression.format,
        )
        .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        self.store.delete(&destination)?;
        self.store.delete(&keys::info_key(&destination))?;
        tracing::info!(source = key, destination = %destination, "deleted derivative");
        self.emit(ProcessEvent::Deleted {
            key: destination.clone(),
        });
        Ok(destination)
    }

    /// Delete everything under the mirrored destination folder.
    fn remove_folder(&self, folder: &str) -> ProcessSummary {
        let bucket = &self.config.bucket;
        let Some(mirror) = keys::mirror_key(folder, &bucket.source_prefix, &bucket.destination_prefix)
        else {
            self.skip(folder, SkipReason::OutsidePrefix);
            return Outcome::Skipped.tally();
        };
        let objects = match self.store.list(&mirror) {
            Ok(objects) => objects,
            Err(e) => return self.fail(folder, &e.into()).tally(),
        };

        let mut summary = ProcessSummary::default();
        let mut removed = Vec::new();
        for key in objects {
            match self.store.delete(&key) {
                Ok(()) if keys::is_image_key(&key) => {
                    self.emit(ProcessEvent::Deleted { key: key.clone() });
                    removed.push(key);
                }
                Ok(()) => {}
                Err(e) => summary = summary.merge(self.fail(&key, &e.into()).tally()),
            }
        }
        tracing::info!(folder = %mirror, deleted = removed.len(), "deleted derivative folder");
        summary.deleted += removed.len();
        summary.merge(self.update_index(removed, IndexChange::Remove))
    }

    // =========================================================================
    // Shared
    // =========================================================================

    fn skip_reason(&self, key: &str) -> Option<SkipReason> {
        if !keys::is_under_prefix(key, &self.config.bucket.source_prefix) {
            Some(SkipReason::OutsidePrefix)
        } else if !keys::is_image_key(key) {
            Some(SkipReason::NotAnImage)
        } else {
            None
        }
    }

    fn skip(&self, key: &str, reason: SkipReason) {
        tracing::debug!(key, ?reason, "skipped");
        self.emit(ProcessEvent::Skipped {
            key: key.to_string(),
            reason,
        });
    }

    fn fail(&self, key: &str, error: &ProcessError) -> Outcome {
        tracing::warn!(key, error = %error, "processing failed");
        self.emit(ProcessEvent::Failed {
            key: key.to_string(),
            error: error.to_string(),
        });
        Outcome::Failed
    }

    /// Apply derivative keys to the index. Index failures count as one failure.
    fn update_index(&self, destinations: Vec<String>, change: IndexChange) -> ProcessSummary {
        if !self.config.index.enabled || destinations.is_empty() {
            return ProcessSummary::default();
        }
        let key = &self.config.index.key;
        let urls = destinations
            .iter()
            .map(|d| self.config.bucket.public_url(d))
            .collect();
        match index::update(self.store, key, urls, change) {
            Ok(changed) => {
                self.emit(ProcessEvent::IndexUpdated {
                    key: key.clone(),
                    change,
                    changed,
                });
                ProcessSummary::default()
            }
            Err(e) => self.fail(key, &e.into()).tally(),
        }
    }
}
