//! Public URL index of derivatives.
//!
//! A single JSON object holding a sorted array of absolute URLs, one per
//! derivative. Every create/remove does a read-modify-write; [`rebuild`]
//! regenerates it from a listing of the derivatives.
//!
//! A missing or malformed index loads as empty, so a corrupted file heals on
//! the next write instead of blocking processing.

use crate::config::GalleryConfig;
use crate::keys;
use crate::storage::{ObjectStore, StorageError};
use std::collections::BTreeSet;
use thiserror::Error;

const CONTENT_TYPE: &str = "application/json";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("index serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexChange {
    Add,
    Remove,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoIndex {
    urls: BTreeSet<String>,
}

impl PhotoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_urls(urls: impl IntoIterator<Item = String>) -> Self {
        Self {
            urls: urls.into_iter().collect(),
        }
    }

    /// Load from `key`. Returns an empty index if the object doesn't exist or
    /// isn't a JSON array of strings. Other storage failures are errors.
    pub fn load(store: &dyn ObjectStore, key: &str) -> Result<Self, IndexError> {
        let body = match store.get(key) {
            Ok(body) => body,
            Err(StorageError::NotFound(_)) => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<Vec<String>>(&body) {
            Ok(urls) => Ok(Self::from_urls(urls)),
            Err(e) => {
                tracing::warn!(key, error = %e, "index is not a JSON string array, starting empty");
                Ok(Self::new())
            }
        }
    }

    /// Apply a change. Returns how many URLs were actually added or removed.
    pub fn apply<I, S>(&mut self, urls: I, change: IndexChange) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut changed = 0;
        for url in urls {
            let url: String = url.into();
            let hit = match change {
                IndexChange::Add => self.urls.insert(url),
                IndexChange::Remove => self.urls.remove(&url),
            };
            changed += usize::from(hit);
        }
        changed
    }

    pub fn save(&self, store: &dyn ObjectStore, key: &str) -> Result<(), IndexError> {
        let body = serde_json::to_vec(&self.urls)?;
        store.put(key, body, CONTENT_TYPE)?;
        tracing::debug!(key, entries = self.urls.len(), "saved index");
        Ok(())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.urls.iter().map(String::as_str)
    }
}

/// Load, apply, save. Skips the write when nothing changed.
pub fn update(
    store: &dyn ObjectStore,
    key: &str,
    urls: Vec<String>,
    change: IndexChange,
) -> Result<usize, IndexError> {
    let mut index = PhotoIndex::load(store, key)?;
    let changed = index.apply(urls, change);
    if changed > 0 {
        index.save(store, key)?;
    }
    Ok(changed)
}

/// Regenerate the index from the derivatives present under the destination
/// prefix. Originals whose derivation failed have no derivative and are left
/// out.
pub fn rebuild(store: &dyn ObjectStore, config: &GalleryConfig) -> Result<PhotoIndex, IndexError> {
    let bucket = &config.bucket;
    let urls = store
        .list(&bucket.destination_listing_prefix())?
        .into_iter()
        .filter(|key| keys::is_image_key(key))
        .map(|dest| bucket.public_url(&dest));
    let index = PhotoIndex::from_urls(urls);
    index.save(store, &config.index.key)?;
    tracing::info!(key = %config.index.key, entries = index.len(), "rebuilt index");
    Ok(index)
}
