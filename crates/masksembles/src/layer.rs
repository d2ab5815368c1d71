//! Masksembles layers: drop-in replacements for dropout that apply a fixed
//! ensemble of binary channel masks.
//!
//! Four layers share one implementation and differ only in input rank and in
//! how the mask width is chosen:
//!
//! | Layer | Input | Mask width |
//! |---|---|---|
//! | [`Masksembles1D`] | `(N, C)` | `channels` |
//! | [`Masksembles2D`] | `(N, C, H, W)` | `channels` |
//! | [`Masksembles1DDynamicSize`] | `(N, C)` | [`expected_size`](crate::config::expected_size) |
//! | [`Masksembles2DDynamicSize`] | `(N, C, H, W)` | [`expected_size`](crate::config::expected_size) |
//!
//! The batch size must be a multiple of `n`. Outputs keep the input's shape
//! and dtype.

use candle_core::{Device, Module, Tensor};
use candle_nn::VarBuilder;

use crate::{
    apply,
    config::{MasksemblesConfig, Variant},
    errors::{MasksemblesError, Result},
    generation::{MaskGenerator, OverlapMaskGenerator},
    mask_set::MaskSet,
    matrix::MaskMatrix,
};

/// Shared interface for every Masksembles layer.
pub trait MasksemblesLayer: Send + Sync {
    /// Which rank/sizing combination the layer implements.
    fn variant(&self) -> Variant;

    /// The constant masks applied by [`MasksemblesLayer::forward`].
    fn mask_set(&self) -> &MaskSet;

    /// Applies mask `i` to the `i`-th contiguous slice of the batch.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;
}

#[derive(Debug, Clone)]
struct MasksemblesImpl {
    variant: Variant,
    masks: MaskSet,
}

impl MasksemblesImpl {
    fn new(
        config: &MasksemblesConfig,
        variant: Variant,
        generator: &mut dyn MaskGenerator,
        device: &Device,
    ) -> Result<Self> {
        let masks = MaskSet::construct(config, variant, generator, device)?;
        Ok(Self { variant, masks })
    }

    fn from_seeded(config: &MasksemblesConfig, variant: Variant, device: &Device) -> Result<Self> {
        let mut generator = OverlapMaskGenerator::from_seed_option(config.seed);
        Self::new(config, variant, &mut generator, device)
    }

    fn load(config: &MasksemblesConfig, variant: Variant, vb: &VarBuilder) -> Result<Self> {
        let masks = MaskSet::from_var_builder(config, variant, vb)?;
        Ok(Self { variant, masks })
    }

    fn from_mask_set(variant: Variant, masks: MaskSet) -> Result<Self> {
        let config = MasksemblesConfig::new(masks.channels(), masks.n(), masks.scale());
        let size = config.validate(variant.sizing)?;
        if masks.size() != size {
            return Err(MasksemblesError::config(format!(
                "mask set is {} wide but {variant:?} expects {size}",
                masks.size()
            )));
        }
        Ok(Self { variant, masks })
    }

    fn with_masks(self, matrix: &MaskMatrix) -> Result<Self> {
        Ok(Self {
            masks: self.masks.load(matrix)?,
            ..self
        })
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        apply::apply(&self.masks, input, self.variant.rank)
    }
}

macro_rules! masksembles_layer {
    ($(#[$doc:meta])* $name:ident, $variant:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            inner: MasksemblesImpl,
        }

        impl $name {
            /// Builds the layer, sampling masks with the default generator
            /// seeded from `config.seed`.
            pub fn new(config: &MasksemblesConfig, device: &Device) -> Result<Self> {
                Ok(Self {
                    inner: MasksemblesImpl::from_seeded(config, $variant, device)?,
                })
            }

            /// Builds the layer with a caller-supplied mask generator.
            pub fn with_generator(
                config: &MasksemblesConfig,
                generator: &mut dyn MaskGenerator,
                device: &Device,
            ) -> Result<Self> {
                Ok(Self {
                    inner: MasksemblesImpl::new(config, $variant, generator, device)?,
                })
            }

            /// Loads previously saved masks from a [`VarBuilder`] scope.
            pub fn load(config: &MasksemblesConfig, vb: &VarBuilder) -> Result<Self> {
                Ok(Self {
                    inner: MasksemblesImpl::load(config, $variant, vb)?,
                })
            }

            /// Wraps an existing mask store, rejecting one whose width does
            /// not match this variant's sizing.
            pub fn from_mask_set(masks: MaskSet) -> Result<Self> {
                Ok(Self {
                    inner: MasksemblesImpl::from_mask_set($variant, masks)?,
                })
            }

            /// Replaces the masks with `matrix`, typically after building with
            /// `generate_masks = false`.
            pub fn with_masks(self, matrix: &MaskMatrix) -> Result<Self> {
                Ok(Self {
                    inner: self.inner.with_masks(matrix)?,
                })
            }
        }

        impl MasksemblesLayer for $name {
            fn variant(&self) -> Variant {
                self.inner.variant
            }

            fn mask_set(&self) -> &MaskSet {
                &self.inner.masks
            }

            fn forward(&self, input: &Tensor) -> Result<Tensor> {
                self.inner.forward(input)
            }
        }

        impl Module for $name {
            fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
                self.inner.forward(xs).map_err(candle_core::Error::wrap)
            }
        }
    };
}

masksembles_layer!(
    /// Masksembles for `(N, C)` inputs, the counterpart of `Dropout`.
    ///
    /// With `scale == 1` the masks are all ones and the layer is the identity.
    Masksembles1D,
    Variant::FIXED_1D
);

masksembles_layer!(
    /// Masksembles for `(N, C, H, W)` inputs, the counterpart of `Dropout2d`.
    Masksembles2D,
    Variant::FIXED_2D
);

masksembles_layer!(
    /// Flat Masksembles whose masks are `expected_size` wide; `channels` is
    /// the number of active features per mask. Requires `scale > 1`.
    Masksembles1DDynamicSize,
    Variant::DYNAMIC_1D
);

masksembles_layer!(
    /// Spatial Masksembles whose masks are `expected_size` wide. Requires
    /// `scale > 1`.
    Masksembles2DDynamicSize,
    Variant::DYNAMIC_2D
);
