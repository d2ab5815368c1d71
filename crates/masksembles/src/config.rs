//! Construction parameters shared by every Masksembles variant.
//!
//! A [`MasksemblesConfig`] carries the user-facing knobs. The [`Variant`]
//! pairs an input rank with a [`SizePolicy`] and decides how wide the masks
//! are and whether the unit-scale shortcut applies.

use serde::{Deserialize, Serialize};

use crate::errors::{MasksemblesError, Result};

/// Configuration describing one mask ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasksemblesConfig {
    /// Number of input channels the masks gate.
    pub channels: usize,
    /// Number of masks (ensemble members).
    pub n: usize,
    /// Overlap parameter forwarded to the mask generator.
    pub scale: f64,
    /// Whether masks are sampled at construction time. When `false` the store
    /// is allocated as zeros and expected to be loaded later.
    #[serde(default = "default_generate_masks")]
    pub generate_masks: bool,
    /// Whether mask `i` is widened to include every channel of mask `i - 1`.
    #[serde(default)]
    pub nested_masks: bool,
    /// Seed for the default generator; `None` draws a fresh one.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_generate_masks() -> bool {
    true
}

impl MasksemblesConfig {
    /// Creates a configuration with generated, non-nested masks.
    pub fn new(channels: usize, n: usize, scale: f64) -> Self {
        Self {
            channels,
            n,
            scale,
            generate_masks: true,
            nested_masks: false,
            seed: None,
        }
    }

    /// Returns a copy with a fixed generator seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns a copy with nesting toggled.
    pub fn with_nested(mut self, nested: bool) -> Self {
        self.nested_masks = nested;
        self
    }

    /// Returns a copy that skips generation and allocates zeros instead.
    pub fn without_generation(mut self) -> Self {
        self.generate_masks = false;
        self
    }

    /// Checks the parameters against the sizing policy and returns the mask width.
    pub fn validate(&self, sizing: SizePolicy) -> Result<usize> {
        if self.n == 0 {
            return Err(MasksemblesError::config("number of masks must be positive"));
        }
        if self.channels == 0 {
            return Err(MasksemblesError::config("channels must be positive"));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(MasksemblesError::config(format!(
                "scale must be a finite positive number, got {}",
                self.scale
            )));
        }
        match sizing {
            SizePolicy::Fixed => Ok(self.channels),
            SizePolicy::Dynamic => {
                if self.scale <= 1.0 {
                    return Err(MasksemblesError::config(format!(
                        "dynamically sized masks require scale > 1, got {}",
                        self.scale
                    )));
                }
                Ok(expected_size(self.channels, self.n, self.scale))
            }
        }
    }
}

/// Expected number of distinct active positions when `n` masks each activate
/// `channels` positions out of `channels * scale`.
///
/// Computes `floor(channels * scale * (1 - (1 - 1 / scale)^n))`.
pub fn expected_size(channels: usize, n: usize, scale: f64) -> usize {
    let exponent = i32::try_from(n).unwrap_or(i32::MAX);
    let coverage = 1.0 - (1.0 - 1.0 / scale).powi(exponent);
    (channels as f64 * scale * coverage) as usize
}

/// How the mask width is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizePolicy {
    /// Masks are exactly `channels` wide.
    Fixed,
    /// Masks are [`expected_size`] wide.
    Dynamic,
}

/// Input layout a layer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerRank {
    /// `(batch, channels)` inputs.
    Flat,
    /// `(batch, channels, height, width)` inputs.
    Spatial,
}

impl LayerRank {
    /// Number of tensor dimensions expected by the forward pass.
    pub fn tensor_rank(&self) -> usize {
        match self {
            LayerRank::Flat => 2,
            LayerRank::Spatial => 4,
        }
    }
}

/// One of the four Masksembles layer flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub rank: LayerRank,
    pub sizing: SizePolicy,
}

impl Variant {
    pub const FIXED_1D: Variant = Variant::new(LayerRank::Flat, SizePolicy::Fixed);
    pub const FIXED_2D: Variant = Variant::new(LayerRank::Spatial, SizePolicy::Fixed);
    pub const DYNAMIC_1D: Variant = Variant::new(LayerRank::Flat, SizePolicy::Dynamic);
    pub const DYNAMIC_2D: Variant = Variant::new(LayerRank::Spatial, SizePolicy::Dynamic);

    pub const fn new(rank: LayerRank, sizing: SizePolicy) -> Self {
        Self { rank, sizing }
    }

    /// Only the fixed-size flat variant replaces generation with all-ones
    /// masks when `scale == 1`.
    pub fn bypasses_unit_scale(&self) -> bool {
        matches!(
            (self.rank, self.sizing),
            (LayerRank::Flat, SizePolicy::Fixed)
        )
    }
}
