//! Masksembles layers built on Candle tensors.
//!
//! Masksembles replaces the random masks of dropout with a small, fixed set of
//! `n` binary channel masks. During the forward pass the batch is split into
//! `n` contiguous groups and group `i` is multiplied by mask `i`, so a single
//! model hosts `n` correlated sub-networks whose overlap is tuned by `scale`.
//!
//! * [`mask_set`] owns the immutable `[n, size]` mask matrix.
//! * [`apply`] implements the partition/multiply/reassemble transform for
//!   `(N, C)` and `(N, C, H, W)` inputs.
//! * [`generation`] holds the [`MaskGenerator`] seam and the default
//!   overlap-controlled sampler.
//! * [`layer`] exposes the four layer variants.
//!
//! ```no_run
//! use candle_core::{DType, Device, Tensor};
//! use masksembles::{Masksembles2D, MasksemblesConfig, MasksemblesLayer};
//!
//! # fn main() -> masksembles::Result<()> {
//! let device = Device::Cpu;
//! let layer = Masksembles2D::new(&MasksemblesConfig::new(16, 4, 2.0).with_seed(0), &device)?;
//! let input = Tensor::ones((4, 16, 28, 28), DType::F32, &device)?;
//! let output = layer.forward(&input)?;
//! assert_eq!(output.dims(), input.dims());
//! # Ok(())
//! # }
//! ```

pub mod apply;
pub mod checks;
pub mod config;
pub mod dtypes;
pub mod errors;
pub mod generation;
pub mod layer;
pub mod mask_set;
pub mod matrix;

pub use config::{expected_size, LayerRank, MasksemblesConfig, SizePolicy, Variant};
pub use errors::{MasksemblesError, Result};
pub use generation::{MaskGenerator, OverlapMaskGenerator};
pub use layer::{
    Masksembles1D, Masksembles1DDynamicSize, Masksembles2D, Masksembles2DDynamicSize,
    MasksemblesLayer,
};
pub use mask_set::{MaskSet, MaskSnapshot};
pub use matrix::MaskMatrix;
