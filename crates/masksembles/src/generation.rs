//! Mask generation.
//!
//! The mask store only depends on the [`MaskGenerator`] contract: given
//! `(channels, n, scale)` and a [`SizePolicy`], return an `[n, size]` binary
//! matrix where `size == channels` for fixed sizing and
//! `size == expected_size(channels, n, scale)` for dynamic sizing.
//!
//! [`OverlapMaskGenerator`] is the default implementation. Each mask switches
//! on `m` positions drawn without replacement from `floor(m * scale)`
//! candidates; positions nobody picked are dropped. Larger scales spread the
//! masks over more candidates and therefore lower their overlap. Fixed sizing
//! bisects an effective scale until the surviving width equals `channels`.

use rand::{rngs::StdRng, seq::index, SeedableRng};

use crate::{
    config::{expected_size, SizePolicy},
    errors::{MasksemblesError, Result},
    matrix::MaskMatrix,
};

/// Smallest channel count the fixed-size search is defined for.
pub const MIN_FIXED_CHANNELS: usize = 10;

/// Largest scale the fixed-size search is defined for.
pub const MAX_FIXED_SCALE: f64 = 6.0;

const MAX_SEARCH_ROUNDS: usize = 1000;
const MAX_RESAMPLE_ATTEMPTS: usize = 10_000;

/// Source of raw binary masks consumed by the mask store.
pub trait MaskGenerator {
    /// Produces an `[n, size]` binary matrix for the requested sizing policy.
    fn generate(
        &mut self,
        channels: usize,
        n: usize,
        scale: f64,
        sizing: SizePolicy,
    ) -> Result<MaskMatrix>;
}

/// Overlap-controlled sampler following the Masksembles construction.
#[derive(Debug, Clone)]
pub struct OverlapMaskGenerator {
    rng: StdRng,
}

impl OverlapMaskGenerator {
    /// Creates a reproducible generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a generator seeded from the thread RNG.
    pub fn from_entropy() -> Self {
        Self::seeded(rand::random())
    }

    /// Creates a generator from an optional seed.
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map(Self::seeded).unwrap_or_else(Self::from_entropy)
    }

    /// Draws `n` masks with `active` positions each over `floor(active * scale)`
    /// candidates and removes columns that no mask uses.
    pub fn sample_once(&mut self, active: usize, n: usize, scale: f64) -> MaskMatrix {
        let total = ((active as f64 * scale) as usize).max(active);
        let mut raw = MaskMatrix::zeros(n, total);
        for row in 0..n {
            for position in index::sample(&mut self.rng, total, active) {
                raw.set(row, position, true);
            }
        }
        raw.retain_columns(|column| column.iter().any(|&bit| bit))
    }

    /// Resamples until the surviving width equals the closed-form expectation.
    pub fn sample_expected(&mut self, active: usize, n: usize, scale: f64) -> Result<MaskMatrix> {
        if !scale.is_finite() || scale < 1.0 {
            return Err(MasksemblesError::config(format!(
                "masks can only be sampled for a finite scale of at least 1 (scale={scale})"
            )));
        }
        let expected = expected_size(active, n, scale);
        for attempt in 0..MAX_RESAMPLE_ATTEMPTS {
            let masks = self.sample_once(active, n, scale);
            if masks.cols() == expected {
                log::trace!(
                    "masksembles: width {expected} reached after {} samples (active={active}, n={n}, scale={scale:.4})",
                    attempt + 1
                );
                return Ok(masks);
            }
        }
        Err(MasksemblesError::config(format!(
            "could not sample {n} masks of width {expected} (active={active}, scale={scale}) \
             within {MAX_RESAMPLE_ATTEMPTS} attempts"
        )))
    }

    /// Searches for masks exactly `channels` wide.
    pub fn sample_fixed(&mut self, channels: usize, n: usize, scale: f64) -> Result<MaskMatrix> {
        if channels < MIN_FIXED_CHANNELS {
            return Err(MasksemblesError::config(format!(
                "masks cannot be generated for fewer than {MIN_FIXED_CHANNELS} channels \
                 (channels={channels}); widen the layer or drop this Masksembles instance"
            )));
        }
        if !(1.0..=MAX_FIXED_SCALE).contains(&scale) {
            return Err(MasksemblesError::config(format!(
                "masks can only be generated for scale in [1, {MAX_FIXED_SCALE}] (scale={scale})"
            )));
        }

        let exponent = i32::try_from(n).unwrap_or(i32::MAX);
        let coverage = scale * (1.0 - (1.0 - 1.0 / scale).powi(exponent));
        if !coverage.is_finite() || coverage <= 0.0 {
            return Err(MasksemblesError::config(format!(
                "scale {scale} gives degenerate coverage {coverage} for {n} masks"
            )));
        }
        // coverage is at least 1 up to rounding, so active never exceeds channels.
        let active = ((channels as f64 / coverage) as usize).min(channels);
        if active == 0 {
            return Err(MasksemblesError::config(format!(
                "scale {scale} leaves no active features for {channels} channels"
            )));
        }

        let mut low = (scale * 0.8).max(1.0);
        let mut high = scale * 1.2;
        let mut last_width = 0;
        for round in 0..MAX_SEARCH_ROUNDS {
            let mid = (low + high) / 2.0;
            let masks = self.sample_expected(active, n, mid)?;
            last_width = masks.cols();
            if last_width == channels {
                log::debug!(
                    "masksembles: generated {n}x{channels} masks with {active} active features \
                     (scale={scale}, effective={mid:.4}, rounds={})",
                    round + 1
                );
                return Ok(masks);
            }
            if last_width > channels {
                high = mid;
            } else {
                low = mid;
            }
        }
        Err(MasksemblesError::config(format!(
            "failed to generate masks with {channels} features (closest width {last_width}); \
             try a different scale than {scale}"
        )))
    }
}

impl Default for OverlapMaskGenerator {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl MaskGenerator for OverlapMaskGenerator {
    fn generate(
        &mut self,
        channels: usize,
        n: usize,
        scale: f64,
        sizing: SizePolicy,
    ) -> Result<MaskMatrix> {
        match sizing {
            SizePolicy::Fixed => self.sample_fixed(channels, n, scale),
            SizePolicy::Dynamic => self.sample_expected(channels, n, scale),
        }
    }
}
