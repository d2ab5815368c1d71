//! Precision policy for mask storage and the masked multiply.
//!
//! Masks are stored as `f64`, which represents 0 and 1 exactly. Floating-point
//! inputs are promoted to [`MASK_DTYPE`], multiplied, then cast back to their
//! own dtype so the caller never observes the wider type. Integer inputs are
//! multiplied in their own dtype with the mask cast down to it, since an `i64`
//! does not survive a trip through `f64`.

use candle_core::{DType, Result, Tensor};

/// Dtype used to store mask matrices and to evaluate the masked multiply.
pub const MASK_DTYPE: DType = DType::F64;

/// Describes how a single forward call casts its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskPrecision {
    storage: DType,
    compute: DType,
}

impl MaskPrecision {
    /// Builds the policy for an input of the given dtype.
    pub fn for_input(storage: DType) -> Self {
        let compute = if storage.is_int() { storage } else { MASK_DTYPE };
        Self { storage, compute }
    }

    /// Returns the dtype handed back to the caller.
    pub fn storage(&self) -> DType {
        self.storage
    }

    /// Returns the dtype the multiply runs in.
    pub fn compute(&self) -> DType {
        self.compute
    }

    /// Indicates whether the input needs a round trip through a wider dtype.
    pub fn is_promoting(&self) -> bool {
        self.storage != self.compute
    }

    /// Casts a tensor (input or mask) to the compute dtype.
    pub fn promote(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor(tensor, self.compute)
    }

    /// Casts a result back to the input dtype.
    pub fn restore(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor(tensor, self.storage)
    }
}

fn cast_tensor(tensor: &Tensor, dtype: DType) -> Result<Tensor> {
    if tensor.dtype() == dtype {
        Ok(tensor.clone())
    } else {
        tensor.to_dtype(dtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn half_precision_inputs_promote_to_mask_dtype() {
        let policy = MaskPrecision::for_input(DType::F16);
        assert_eq!(policy.storage(), DType::F16);
        assert_eq!(policy.compute(), MASK_DTYPE);
        assert!(policy.is_promoting());
        assert!(!MaskPrecision::for_input(DType::F64).is_promoting());
    }

    #[test]
    fn integer_inputs_compute_in_their_own_dtype() -> Result<()> {
        for dtype in [DType::U8, DType::U32, DType::I64] {
            let policy = MaskPrecision::for_input(dtype);
            assert_eq!(policy.compute(), dtype);
            assert!(!policy.is_promoting());
        }

        let mask = Tensor::from_vec(vec![1.0f64, 0.0], (2,), &Device::Cpu)?;
        let cast = MaskPrecision::for_input(DType::I64).promote(&mask)?;
        assert_eq!(cast.to_vec1::<i64>()?, vec![1, 0]);
        Ok(())
    }

    #[test]
    fn restore_returns_to_storage_dtype() -> Result<()> {
        let device = Device::Cpu;
        let policy = MaskPrecision::for_input(DType::BF16);
        let input = Tensor::from_vec(vec![0.5f32, -2.0, 8.0], (3,), &device)?
            .to_dtype(DType::BF16)?;

        let promoted = policy.promote(&input)?;
        assert_eq!(promoted.dtype(), DType::F64);

        let restored = policy.restore(&promoted)?;
        assert_eq!(restored.dtype(), DType::BF16);
        assert_eq!(
            restored.to_dtype(DType::F32)?.to_vec1::<f32>()?,
            vec![0.5, -2.0, 8.0]
        );
        Ok(())
    }
}
