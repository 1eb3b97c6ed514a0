//! # gallery-derive
//!
//! Keeps a web-sized copy of every photo in a gallery bucket. Originals are
//! uploaded under a source prefix; for each one, a WebP rendition no larger
//! than a byte target is written to the mirrored key under a destination
//! prefix, and a JSON index of public rendition URLs is kept in step.
//!
//! # Architecture: Event → Derivative
//!
//! ```text
//! notification JSON  →  ObjectEvent*  →  Processor  →  ObjectStore
//!                        (event)          (process)     (storage)
//!                                            │
//!                                            ├─ compress   (imaging)
//!                                            └─ index      (index)
//! ```
//!
//! The same [`process::Processor`] serves the three entry points: a single
//! notification, a full backfill, and an index rebuild.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`event`] | Parses S3 / SNS-wrapped notifications into create/remove events with decoded keys |
//! | [`process`] | Routes events: derive, delete, folder fan-out on rayon, index updates, progress events |
//! | [`imaging`] | Decode, resize, encode, and the size-bounded quality/resolution search |
//! | [`keys`] | Key conventions: prefixes, mirrored destinations, info keys, public URLs |
//! | [`index`] | The public URL index: load, apply, save, rebuild |
//! | [`storage`] | The [`storage::ObjectStore`] seam with directory-tree and in-memory backends |
//! | [`config`] | Layered configuration: stock defaults, TOML file, environment |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Quality Before Resolution
//!
//! A rendition first tries to fit the target at full resolution by lowering
//! quality in fixed steps. Only when the quality floor is reached does it
//! shrink to the maximum dimension, and then it climbs quality back up while
//! the result sits well below the target, so downscaled images do not carry
//! more compression than they need.
//!
//! ## Bounded Work Per Image
//!
//! Every ladder is capped at a fixed number of steps, so one image costs at
//! most `3 * max_quality_steps + 3` encodes regardless of content. An image
//! that cannot reach the target is still written, at the smallest setting
//! tried, and reported.
//!
//! ## Storage Behind a Trait
//!
//! Processing never touches the filesystem directly. The CLI binds a bucket
//! to a directory tree; tests bind it to memory. Keys stay `/`-separated
//! strings throughout and are only turned into paths inside
//! [`storage::LocalStore`], which rejects keys that would escape its root.

pub mod config;
pub mod event;
pub mod imaging;
pub mod index;
pub mod keys;
pub mod output;
pub mod process;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_helpers;
