//! Lightweight validation helpers shared across the mask store and the
//! forward pass.
//!
//! Each helper takes a `context` label that ends up in the error so failures
//! point at the tensor that broke the contract.

use candle_core::Tensor;

use crate::errors::{MasksemblesError, Result};

/// Ensures a tensor has exactly `rank` dimensions.
pub fn expect_rank(context: &'static str, tensor: &Tensor, rank: usize) -> Result<()> {
    let dims = tensor.dims();
    if dims.len() == rank {
        Ok(())
    } else {
        Err(MasksemblesError::shape(
            context,
            format!("expected rank {rank}, got shape {dims:?}"),
        ))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(context: &'static str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(MasksemblesError::shape(
            context,
            format!("expected shape {expected:?}, got {actual:?}"),
        ))
    }
}

/// Validates that the leading (batch) dimension splits evenly into `groups`.
pub fn expect_batch_divisible(context: &'static str, tensor: &Tensor, groups: usize) -> Result<()> {
    let batch = tensor.dims().first().copied().unwrap_or(0);
    if groups != 0 && batch % groups == 0 {
        Ok(())
    } else {
        Err(MasksemblesError::shape(
            context,
            format!("batch size {batch} is not divisible by the number of masks {groups}"),
        ))
    }
}

/// Validates the channel axis (dimension 1) against the mask width.
pub fn expect_channels(context: &'static str, tensor: &Tensor, channels: usize) -> Result<()> {
    match tensor.dims().get(1) {
        Some(&actual) if actual == channels => Ok(()),
        Some(&actual) => Err(MasksemblesError::shape(
            context,
            format!("expected {channels} channels to match the mask width, got {actual}"),
        )),
        None => Err(MasksemblesError::shape(context, "input has no channel axis")),
    }
}

/// Checks every value is exactly `0.0` or `1.0`.
pub fn expect_binary(context: &'static str, values: &[f64]) -> Result<()> {
    match values.iter().position(|&v| v != 0.0 && v != 1.0) {
        None => Ok(()),
        Some(idx) => Err(MasksemblesError::config(format!(
            "{context}: value {} at flat index {idx} is not binary",
            values[idx]
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn divisibility_reports_batch_and_groups() -> Result<()> {
        let tensor = Tensor::zeros((6, 4), DType::F32, &Device::Cpu)?;
        assert!(expect_batch_divisible("input", &tensor, 3).is_ok());
        let err = expect_batch_divisible("input", &tensor, 4).unwrap_err();
        assert!(err.is_shape());
        assert!(err.to_string().contains("batch size 6"));
        Ok(())
    }

    #[test]
    fn channel_check_requires_second_axis() -> Result<()> {
        let flat = Tensor::zeros(8, DType::F32, &Device::Cpu)?;
        assert!(expect_channels("input", &flat, 8).is_err());
        let matrix = Tensor::zeros((2, 8), DType::F32, &Device::Cpu)?;
        assert!(expect_channels("input", &matrix, 8).is_ok());
        assert!(expect_channels("input", &matrix, 7).is_err());
        Ok(())
    }

    #[test]
    fn binary_check_rejects_fractional_values() {
        assert!(expect_binary("masks", &[0.0, 1.0, 1.0]).is_ok());
        let err = expect_binary("masks", &[0.0, 0.5]).unwrap_err();
        assert!(err.is_configuration());
    }
}
