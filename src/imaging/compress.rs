//! Adaptive compression: fit an arbitrary source image under a byte budget.
//!
//! # Stages
//!
//! ```text
//! decode → orient → first frame → RGB/RGBA ─┬─ raw > large_input_bytes? downscale first
//!                                           ├─ edge > codec limit? downscale first
//!                                           │
//! A. raw ≤ target?  lossless @ start ───────┼─ fits → done
//! B. lossy ladder @ full resolution ────────┼─ fits → done
//! C. downscale to max_dimension (capped at the codec limit)
//!    ├─ changed:   ladder down to min_quality, then recover quality up to start
//!    └─ unchanged: ladder down to fallback_min_quality
//! ```
//!
//! Every ladder is bounded by `max_steps_per_ladder` encodes, and at most three
//! ladders run per call, so the worst case is `3 × max_steps + 3` encodes.
//!
//! The result is the last buffer produced. Missing the budget is not an
//! error: callers get the best effort and can check
//! [`CompressionResult::met_target`].

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::calculations::{mib, recovery_floor};
use super::operations::ensure_max_dimension;
use super::params::{EncodeParams, OutputFormat, Quality};
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("cannot decode source image: {0}")]
    Decode(#[source] BackendError),
    #[error("encoder failed: {0}")]
    Encode(#[source] BackendError),
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid compression config: {0}")]
pub struct InvalidConfig(pub String);

/// Tuning knobs for [`compress`]. All sizes are in bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionConfig {
    pub target_bytes: usize,
    pub start_quality: Quality,
    pub min_quality: Quality,
    /// Floor used only when downscaling cannot help (image already fits).
    pub fallback_min_quality: Quality,
    pub max_dimension: u32,
    /// Recovery pass raises quality while output is below `target × ratio`.
    pub min_target_ratio: f64,
    /// Inputs larger than this are downscaled before the first encode.
    pub large_input_bytes: usize,
    pub quality_step: u32,
    pub max_steps_per_ladder: u32,
    /// Decoded rasters above this pixel count are rejected.
    pub max_pixels: u64,
    pub format: OutputFormat,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            target_bytes: 1024 * 1024,
            start_quality: Quality::new(86),
            min_quality: Quality::new(60),
            fallback_min_quality: Quality::new(40),
            max_dimension: 3000,
            min_target_ratio: 0.6,
            large_input_bytes: mib(25.0),
            quality_step: 8,
            max_steps_per_ladder: 6,
            max_pixels: 100_000_000,
            format: OutputFormat::Webp,
        }
    }
}

impl CompressionConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let fail = |msg: &str| Err(InvalidConfig(msg.to_string()));
        if self.target_bytes == 0 {
            return fail("target size must be positive");
        }
        if !(self.fallback_min_quality <= self.min_quality
            && self.min_quality <= self.start_quality)
        {
            return fail("qualities must satisfy fallback_min <= min <= start");
        }
        if self.max_dimension == 0 {
            return fail("max dimension must be positive");
        }
        if !(self.min_target_ratio > 0.0 && self.min_target_ratio <= 1.0) {
            return fail("min target ratio must be in (0, 1]");
        }
        if self.quality_step == 0 {
            return fail("quality step must be positive");
        }
        if self.max_steps_per_ladder == 0 {
            return fail("max quality steps must be at least 1");
        }
        if self.max_pixels == 0 {
            return fail("max pixels must be positive");
        }
        Ok(())
    }

    /// Upper bound on encode calls for one [`compress`] invocation.
    pub fn max_encodes(&self) -> u32 {
        3 * self.max_steps_per_ladder + 3
    }
}

/// Final output of [`compress`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub bytes: Vec<u8>,
    pub quality: Quality,
    pub lossless: bool,
    /// Dimensions of the encoded raster.
    pub dimensions: Dimensions,
    /// Dimensions of the decoded, upright source.
    pub source_dimensions: Dimensions,
    pub format: OutputFormat,
    /// Number of encoder calls spent.
    pub encodes: u32,
}

impl CompressionResult {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn resized(&self) -> bool {
        self.dimensions != self.source_dimensions
    }

    pub fn met_target(&self, config: &CompressionConfig) -> bool {
        self.bytes.len() <= config.target_bytes
    }

    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// One encode: the buffer and the quality that produced it.
#[derive(Debug)]
struct Attempt {
    bytes: Vec<u8>,
    quality: Quality,
    lossless: bool,
}

/// Ladder states. `Exhausted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LadderState {
    /// Stepping quality down while the buffer is over budget.
    Searching { floor: Quality },
    /// Stepping quality up while the buffer leaves too much budget unused.
    Recovering { ceiling: Quality, min_bytes: usize },
    Exhausted,
}

/// Transition for one rung: stay in the current state while its condition
/// holds and the step budget lasts, otherwise become `Exhausted`.
fn next_state(
    state: LadderState,
    attempt_len: usize,
    quality: Quality,
    steps: u32,
    config: &CompressionConfig,
) -> LadderState {
    if steps >= config.max_steps_per_ladder {
        return LadderState::Exhausted;
    }
    match state {
        LadderState::Searching { floor }
            if attempt_len > config.target_bytes && quality > floor =>
        {
            state
        }
        LadderState::Recovering { ceiling, min_bytes }
            if attempt_len < min_bytes && quality < ceiling =>
        {
            state
        }
        _ => LadderState::Exhausted,
    }
}

/// Per-invocation encode bookkeeping.
struct Session<'a, B: ImageBackend> {
    backend: &'a B,
    config: &'a CompressionConfig,
    encodes: u32,
}

impl<'a, B: ImageBackend> Session<'a, B> {
    fn encode(
        &mut self,
        image: &DynamicImage,
        quality: Quality,
        lossless: bool,
    ) -> Result<Attempt, CompressError> {
        let params = if lossless {
            EncodeParams::lossless(quality, self.config.format)
        } else {
            EncodeParams::lossy(quality, self.config.format)
        };
        let bytes = self
            .backend
            .encode(image, &params)
            .map_err(CompressError::Encode)?;
        self.encodes += 1;
        tracing::debug!(
            quality = quality.value(),
            lossless,
            width = image.width(),
            height = image.height(),
            size = bytes.len(),
            target = self.config.target_bytes,
            "encoded attempt"
        );
        Ok(Attempt {
            bytes,
            quality,
            lossless,
        })
    }

    fn fits(&self, attempt: &Attempt) -> bool {
        attempt.bytes.len() <= self.config.target_bytes
    }

    /// Drive one ladder from `attempt` until its state is exhausted.
    fn run_ladder(
        &mut self,
        image: &DynamicImage,
        mut attempt: Attempt,
        mut state: LadderState,
    ) -> Result<Attempt, CompressError> {
        let step = self.config.quality_step;
        let mut steps = 0;
        loop {
            state = next_state(state, attempt.bytes.len(), attempt.quality, steps, self.config);
            let quality = match state {
                LadderState::Exhausted => return Ok(attempt),
                LadderState::Searching { floor } => attempt.quality.step_down(step, floor),
                LadderState::Recovering { ceiling, .. } => attempt.quality.step_up(step, ceiling),
            };
            attempt = self.encode(image, quality, false)?;
            steps += 1;
        }
    }

    fn finish(
        self,
        attempt: Attempt,
        image: &DynamicImage,
        source_dimensions: Dimensions,
    ) -> CompressionResult {
        CompressionResult {
            bytes: attempt.bytes,
            quality: attempt.quality,
            lossless: attempt.lossless,
            dimensions: Dimensions::of(image),
            source_dimensions,
            format: self.config.format,
            encodes: self.encodes,
        }
    }
}

/// Compress `raw` so the encoded output is at most `config.target_bytes`,
/// giving up as little quality and resolution as the budget allows.
///
/// Fails only when the input cannot be decoded (or the encoder itself breaks);
/// an unreachable target yields the best-effort buffer instead.
pub fn compress(
    backend: &impl ImageBackend,
    raw: &[u8],
    config: &CompressionConfig,
) -> Result<CompressionResult, CompressError> {
    let decoded = backend
        .decode(raw, config.max_pixels)
        .map_err(CompressError::Decode)?;
    let source_dimensions = Dimensions::of(&decoded);

    let codec_limit = config.format.max_dimension();
    let max_dimension = config.max_dimension.min(codec_limit);
    let image = if raw.len() > config.large_input_bytes {
        tracing::debug!(
            input = raw.len(),
            threshold = config.large_input_bytes,
            "large input, downscaling before first encode"
        );
        ensure_max_dimension(backend, &decoded, max_dimension).unwrap_or(decoded)
    } else if source_dimensions.longer_edge() > codec_limit {
        tracing::debug!(
            width = source_dimensions.width,
            height = source_dimensions.height,
            limit = codec_limit,
            "larger than the codec allows, downscaling before first encode"
        );
        ensure_max_dimension(backend, &decoded, max_dimension).unwrap_or(decoded)
    } else {
        decoded
    };

    let mut session = Session {
        backend,
        config,
        encodes: 0,
    };

    // A: lossless short-circuit
    if raw.len() <= config.target_bytes {
        let lossless = session.encode(&image, config.start_quality, true)?;
        if session.fits(&lossless) {
            return Ok(session.finish(lossless, &image, source_dimensions));
        }
    }

    // B: lossy ladder at current resolution
    let first = session.encode(&image, config.start_quality, false)?;
    let searching = LadderState::Searching {
        floor: config.min_quality,
    };
    let attempt = session.run_ladder(&image, first, searching)?;
    if session.fits(&attempt) {
        return Ok(session.finish(attempt, &image, source_dimensions));
    }

    // C: resolution is the next lever, if there is any left
    match ensure_max_dimension(backend, &image, max_dimension) {
        Some(resized) => {
            let quality = attempt.quality.max(config.min_quality);
            let first = session.encode(&resized, quality, false)?;
            let attempt = session.run_ladder(&resized, first, searching)?;
            let recovering = LadderState::Recovering {
                ceiling: config.start_quality,
                min_bytes: recovery_floor(config.target_bytes, config.min_target_ratio),
            };
            let attempt = session.run_ladder(&resized, attempt, recovering)?;
            Ok(session.finish(attempt, &resized, source_dimensions))
        }
        None => {
            tracing::debug!(
                quality = attempt.quality.value(),
                floor = config.fallback_min_quality.value(),
                "already within max dimension, continuing to fallback quality"
            );
            let fallback = LadderState::Searching {
                floor: config.fallback_min_quality,
            };
            let attempt = session.run_ladder(&image, attempt, fallback)?;
            Ok(session.finish(attempt, &image, source_dimensions))
        }
    }
}
