//! Batch-partition-apply: the Masksembles forward transform.
//!
//! A batch of `N` examples is viewed as `n` contiguous groups of `N / n`
//! examples. Group `i` is multiplied by mask `i`, broadcast over the group
//! and, for spatial inputs, over `(height, width)`. Groups are laid back out
//! in their original order, so the output has the input's shape and dtype.
//!
//! The partition is a reshape `(N, C, ..) -> (n, N / n, C, ..)` and the masks
//! are reshaped to `(n, 1, C, 1, ..)`, which lets a single broadcast multiply
//! cover every group at once.

use candle_core::Tensor;

use crate::{
    checks,
    config::LayerRank,
    dtypes::MaskPrecision,
    errors::Result,
    mask_set::MaskSet,
};

/// Applies `masks` to a `(batch, channels)` tensor.
pub fn apply_flat(masks: &MaskSet, input: &Tensor) -> Result<Tensor> {
    apply(masks, input, LayerRank::Flat)
}

/// Applies `masks` to a `(batch, channels, height, width)` tensor.
pub fn apply_spatial(masks: &MaskSet, input: &Tensor) -> Result<Tensor> {
    apply(masks, input, LayerRank::Spatial)
}

/// Validates `input` for `rank` and runs the partitioned multiply.
pub fn apply(masks: &MaskSet, input: &Tensor, rank: LayerRank) -> Result<Tensor> {
    checks::expect_rank("masksembles.input", input, rank.tensor_rank())?;
    checks::expect_channels("masksembles.input", input, masks.size())?;
    checks::expect_batch_divisible("masksembles.input", input, masks.n())?;

    let dims = input.dims().to_vec();
    let groups = masks.n();
    let group_size = dims[0] / groups;
    let trailing = &dims[1..];

    let mut grouped_shape = Vec::with_capacity(dims.len() + 1);
    grouped_shape.extend_from_slice(&[groups, group_size]);
    grouped_shape.extend_from_slice(trailing);

    // (n, 1, C, 1, ..): one mask per group, broadcast over members and space.
    let mut mask_shape = Vec::with_capacity(dims.len() + 1);
    mask_shape.extend_from_slice(&[groups, 1, masks.size()]);
    mask_shape.extend(std::iter::repeat(1).take(trailing.len() - 1));

    let policy = MaskPrecision::for_input(input.dtype());
    let grouped = policy.promote(input)?.reshape(grouped_shape)?;
    let mask = policy
        .promote(&masks.masks().to_device(input.device())?)?
        .reshape(mask_shape)?;

    let masked = grouped.broadcast_mul(&mask)?.reshape(dims)?;
    Ok(policy.restore(&masked)?)
}
