//! Immutable store for the `[n, size]` mask matrix of one layer.
//!
//! A [`MaskSet`] is built exactly once, either from a [`MaskGenerator`] or as
//! zeros awaiting [`MaskSet::load`]. The stored tensor uses
//! [`MASK_DTYPE`](crate::dtypes::MASK_DTYPE) and is never updated by training.

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

use crate::{
    checks,
    config::{MasksemblesConfig, SizePolicy, Variant},
    errors::{MasksemblesError, Result},
    generation::MaskGenerator,
    matrix::MaskMatrix,
};

/// Name of the mask tensor inside a [`VarBuilder`] scope.
pub const MASKS_TENSOR_NAME: &str = "masks";

/// Constant binary masks plus the parameters that produced them.
#[derive(Debug, Clone)]
pub struct MaskSet {
    channels: usize,
    n: usize,
    scale: f64,
    size: usize,
    nested: bool,
    masks: Tensor,
}

impl MaskSet {
    /// Builds the mask store for `variant` from `config`.
    ///
    /// The generator is consulted at most once. The fixed-size flat variant
    /// skips it for `scale == 1` and uses all-ones masks.
    pub fn construct(
        config: &MasksemblesConfig,
        variant: Variant,
        generator: &mut dyn MaskGenerator,
        device: &Device,
    ) -> Result<Self> {
        let size = config.validate(variant.sizing)?;
        let (n, channels, scale) = (config.n, config.channels, config.scale);

        if !config.generate_masks {
            log::debug!("masksembles: allocated zero masks {n}x{size} ({variant:?})");
            return Self::from_matrix(config, &MaskMatrix::zeros(n, size), false, device);
        }

        let raw = if variant.bypasses_unit_scale() && scale == 1.0 {
            MaskMatrix::ones(n, channels)
        } else {
            generator.generate(channels, n, scale, variant.sizing)?
        };
        if raw.shape() != (n, size) {
            return Err(MasksemblesError::config(format!(
                "generator returned masks shaped {:?}, expected {:?}",
                raw.shape(),
                (n, size)
            )));
        }

        let masks = if config.nested_masks {
            raw.nested()
        } else {
            raw
        };
        log::debug!(
            "masksembles: built {n}x{size} masks ({variant:?}, scale={scale}, nested={})",
            config.nested_masks
        );
        Self::from_matrix(config, &masks, config.nested_masks, device)
    }

    /// Reads masks stored under `"masks"` in a [`VarBuilder`], e.g. one backed
    /// by a safetensors checkpoint. No generation takes place.
    pub fn from_var_builder(
        config: &MasksemblesConfig,
        variant: Variant,
        vb: &VarBuilder,
    ) -> Result<Self> {
        let size = config.validate(variant.sizing)?;
        let tensor = vb.get((config.n, size), MASKS_TENSOR_NAME)?;
        let matrix = MaskMatrix::from_tensor(&tensor)?;
        Self::from_matrix(config, &matrix, matrix.is_nested(), vb.device())
    }

    /// Rebuilds a mask set verbatim from a snapshot.
    ///
    /// The recorded `nested` flag is informational; the rebuilt store reports
    /// what the mask values satisfy.
    pub fn from_snapshot(
        snapshot: &MaskSnapshot,
        sizing: SizePolicy,
        device: &Device,
    ) -> Result<Self> {
        let config = MasksemblesConfig::new(snapshot.channels, snapshot.n, snapshot.scale);
        let size = config.validate(sizing)?;
        if size != snapshot.size {
            return Err(MasksemblesError::config(format!(
                "snapshot declares width {} but the sizing policy gives {size}",
                snapshot.size
            )));
        }
        let matrix = MaskMatrix::from_rows(&snapshot.masks)?;
        if matrix.shape() != (snapshot.n, size) {
            return Err(MasksemblesError::config(format!(
                "snapshot masks shaped {:?}, expected {:?}",
                matrix.shape(),
                (snapshot.n, size)
            )));
        }
        Self::from_matrix(&config, &matrix, matrix.is_nested(), device)
    }

    fn from_matrix(
        config: &MasksemblesConfig,
        matrix: &MaskMatrix,
        nested: bool,
        device: &Device,
    ) -> Result<Self> {
        Ok(Self {
            channels: config.channels,
            n: config.n,
            scale: config.scale,
            size: matrix.cols(),
            nested,
            masks: matrix.to_tensor(device)?,
        })
    }

    /// Returns a mask set holding `matrix` instead of the current masks.
    ///
    /// Used to fill a store created without generation. The matrix must be
    /// exactly `[n, size]`.
    pub fn load(self, matrix: &MaskMatrix) -> Result<Self> {
        if matrix.shape() != (self.n, self.size) {
            return Err(MasksemblesError::config(format!(
                "cannot load masks shaped {:?} into a store of shape {:?}",
                matrix.shape(),
                (self.n, self.size)
            )));
        }
        let masks = matrix.to_tensor(self.masks.device())?;
        Ok(Self {
            nested: matrix.is_nested(),
            masks,
            ..self
        })
    }

    /// Like [`MaskSet::load`] but reads the values from a tensor.
    pub fn load_tensor(self, tensor: &Tensor) -> Result<Self> {
        checks::expect_shape("masks", tensor, &[self.n, self.size])?;
        let matrix = MaskMatrix::from_tensor(tensor)?;
        self.load(&matrix)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Mask width; the channel count the forward pass expects.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether mask `i` contains every channel of mask `i - 1`.
    ///
    /// Generated stores report the `nested_masks` flag; loaded and restored
    /// masks report what their values satisfy. Zero stores report `false`.
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    /// The `[n, size]` mask tensor in `f64`.
    pub fn masks(&self) -> &Tensor {
        &self.masks
    }

    /// Copies the masks back to the host.
    pub fn to_matrix(&self) -> Result<MaskMatrix> {
        MaskMatrix::from_tensor(&self.masks)
    }

    /// Captures everything needed to rebuild this store without generation.
    pub fn snapshot(&self) -> Result<MaskSnapshot> {
        Ok(MaskSnapshot {
            channels: self.channels,
            n: self.n,
            scale: self.scale,
            size: self.size,
            nested: self.nested,
            masks: self.to_matrix()?.to_rows(),
        })
    }
}

/// Serializable copy of a [`MaskSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskSnapshot {
    pub channels: usize,
    pub n: usize,
    pub scale: f64,
    pub size: usize,
    pub nested: bool,
    /// One `0/1` row per mask.
    pub masks: Vec<Vec<u8>>,
}
