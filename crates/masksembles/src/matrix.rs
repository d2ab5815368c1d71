//! Host-side binary mask matrices.
//!
//! [`MaskMatrix`] keeps `rows` masks of `cols` entries in one row-major arena.
//! Generators produce it, the nesting fold transforms it, and the mask store
//! converts it into an `f64` tensor once construction is complete.

use candle_core::{Device, Tensor};

use crate::{
    checks,
    dtypes::MASK_DTYPE,
    errors::{MasksemblesError, Result},
};

/// Row-major binary matrix of shape `[rows, cols]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskMatrix {
    rows: usize,
    cols: usize,
    bits: Vec<bool>,
}

impl MaskMatrix {
    /// All-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, false)
    }

    /// All-one matrix.
    pub fn ones(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, true)
    }

    fn filled(rows: usize, cols: usize, value: bool) -> Self {
        Self {
            rows,
            cols,
            bits: vec![value; rows * cols],
        }
    }

    /// Builds a matrix from a flat row-major buffer.
    pub fn from_flat(rows: usize, cols: usize, bits: Vec<bool>) -> Result<Self> {
        if bits.len() != rows * cols {
            return Err(MasksemblesError::config(format!(
                "mask buffer holds {} entries, expected {rows}x{cols}",
                bits.len()
            )));
        }
        Ok(Self { rows, cols, bits })
    }

    /// Builds a matrix from equally sized rows of 0/1 values.
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map(|row| row.as_ref().len()).unwrap_or(0);
        let mut bits = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(MasksemblesError::config(format!(
                    "mask row {idx} has {} entries, expected {cols}",
                    row.len()
                )));
            }
            for &value in row {
                match value {
                    0 => bits.push(false),
                    1 => bits.push(true),
                    other => {
                        return Err(MasksemblesError::config(format!(
                            "mask row {idx} contains non-binary value {other}"
                        )))
                    }
                }
            }
        }
        Self::from_flat(rows.len(), cols, bits)
    }

    /// Reads a rank-2 tensor, rejecting anything that is not exactly 0 or 1.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        checks::expect_rank("masks", tensor, 2)?;
        let (rows, cols) = tensor.dims2()?;
        let values = tensor.to_dtype(MASK_DTYPE)?.flatten_all()?.to_vec1::<f64>()?;
        checks::expect_binary("masks", &values)?;
        let bits = values.into_iter().map(|v| v == 1.0).collect();
        Self::from_flat(rows, cols, bits)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Borrows mask `idx`.
    pub fn row(&self, idx: usize) -> &[bool] {
        &self.bits[idx * self.cols..(idx + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[bool]> + '_ {
        // Zero-width matrices still yield `rows` empty rows.
        (0..self.rows).map(move |idx| self.row(idx))
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: bool) {
        self.bits[row * self.cols + col] = value;
    }

    /// Number of set entries in mask `idx`.
    pub fn active_count(&self, idx: usize) -> usize {
        self.row(idx).iter().filter(|&&bit| bit).count()
    }

    /// Returns the cumulative-OR of the rows: row `i` of the result is the
    /// union of rows `0..=i` of `self`.
    pub fn nested(&self) -> Self {
        let mut bits = Vec::with_capacity(self.bits.len());
        let mut running = vec![false; self.cols];
        for row in self.iter_rows() {
            for (acc, &bit) in running.iter_mut().zip(row) {
                *acc |= bit;
            }
            bits.extend_from_slice(&running);
        }
        Self {
            rows: self.rows,
            cols: self.cols,
            bits,
        }
    }

    /// Whether every row is a superset of the one before it.
    pub fn is_nested(&self) -> bool {
        (1..self.rows).all(|idx| {
            self.row(idx - 1)
                .iter()
                .zip(self.row(idx))
                .all(|(&prev, &cur)| !prev || cur)
        })
    }

    /// Keeps only the columns for which `keep` returns `true`.
    pub(crate) fn retain_columns<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&[bool]) -> bool,
    {
        let kept: Vec<usize> = (0..self.cols)
            .filter(|&col| {
                let column: Vec<bool> = (0..self.rows)
                    .map(|row| self.bits[row * self.cols + col])
                    .collect();
                keep(&column)
            })
            .collect();
        let mut bits = Vec::with_capacity(self.rows * kept.len());
        for row in self.iter_rows() {
            bits.extend(kept.iter().map(|&col| row[col]));
        }
        Self {
            rows: self.rows,
            cols: kept.len(),
            bits,
        }
    }

    /// Rows as `0/1` bytes, the layout used by snapshots.
    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.iter_rows()
            .map(|row| row.iter().map(|&bit| u8::from(bit)).collect())
            .collect()
    }

    /// Materialises the matrix as an `f64` tensor of shape `[rows, cols]`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        let data: Vec<f64> = self
            .bits
            .iter()
            .map(|&bit| if bit { 1.0 } else { 0.0 })
            .collect();
        Ok(Tensor::from_vec(data, (self.rows, self.cols), device)?)
    }
}
