//! Block-tridiagonal storage on top of Faer.
//!
//! This module provides the `BlockTridiagonal` type, which stores only the
//! main block-diagonal and the two adjacent block-diagonals of a matrix,
//! together with conversions from and to a dense `faer::Mat<T>`.

use faer::Mat;
use log::warn;

use crate::core::block::{Block, sub_block, write_block, zeros};
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};

/// A block-tridiagonal matrix.
///
/// `upper[i]` is the block at block position `(i, i + 1)` and `lower[i]`
/// the block at `(i + 1, i)`.
#[derive(Debug, Clone)]
pub struct BlockTridiagonal<T> {
    pub(crate) blocksize: usize,
    pub diag: Vec<Block<T>>,
    pub upper: Vec<Block<T>>,
    pub lower: Vec<Block<T>>,
}

impl<T: Scalar> BlockTridiagonal<T> {
    /// Assemble from block lists, checking every shape.
    pub fn new(diag: Vec<Block<T>>, upper: Vec<Block<T>>, lower: Vec<Block<T>>) -> Result<Self> {
        let Some(first) = diag.first() else {
            return Err(PdivError::DimensionMismatch("no diagonal blocks".into()));
        };
        let blocksize = first.nrows();
        if blocksize == 0 {
            return Err(PdivError::Config("blocksize must be positive".into()));
        }
        let nblocks = diag.len();
        if upper.len() != nblocks - 1 || lower.len() != nblocks - 1 {
            return Err(PdivError::DimensionMismatch(format!(
                "{nblocks} diagonal blocks need {} upper and lower blocks, got {} and {}",
                nblocks - 1,
                upper.len(),
                lower.len()
            )));
        }
        for (name, blocks) in [("diagonal", &diag), ("upper", &upper), ("lower", &lower)] {
            if let Some((i, b)) = blocks
                .iter()
                .enumerate()
                .find(|(_, b)| b.nrows() != blocksize || b.ncols() != blocksize)
            {
                return Err(PdivError::DimensionMismatch(format!(
                    "{name} block {i} is {}x{}, expected {blocksize}x{blocksize}",
                    b.nrows(),
                    b.ncols()
                )));
            }
        }
        Ok(Self { blocksize, diag, upper, lower })
    }

    /// Split a dense matrix into blocks, keeping only the tridiagonal band.
    ///
    /// Non-zero entries outside the band are dropped with a warning.
    pub fn from_dense(a: &Mat<T>, blocksize: usize) -> Result<Self> {
        if blocksize == 0 {
            return Err(PdivError::Config("blocksize must be positive".into()));
        }
        if a.nrows() != a.ncols() {
            return Err(PdivError::Config(format!(
                "matrix must be square, got {}x{}",
                a.nrows(),
                a.ncols()
            )));
        }
        if a.nrows() == 0 || a.nrows() % blocksize != 0 {
            return Err(PdivError::Config(format!(
                "blocksize {blocksize} does not divide the matrix size {}",
                a.nrows()
            )));
        }
        let nblocks = a.nrows() / blocksize;
        let at = |i: usize, j: usize| sub_block(a, i * blocksize, j * blocksize, blocksize, blocksize);

        let mut dropped = 0.0f64;
        for j in 0..a.ncols() {
            for i in 0..a.nrows() {
                if (i / blocksize).abs_diff(j / blocksize) > 1 {
                    dropped = dropped.max(a[(i, j)].modulus());
                }
            }
        }
        if dropped > 0.0 {
            warn!("dropping entries outside the block-tridiagonal band (max |a_ij| = {dropped:e})");
        }

        Ok(Self {
            blocksize,
            diag: (0..nblocks).map(|i| at(i, i)).collect(),
            upper: (0..nblocks - 1).map(|i| at(i, i + 1)).collect(),
            lower: (0..nblocks - 1).map(|i| at(i + 1, i)).collect(),
        })
    }

    pub fn to_dense(&self) -> Mat<T> {
        let b = self.blocksize;
        let mut a = zeros(self.dim(), self.dim());
        for (i, d) in self.diag.iter().enumerate() {
            write_block(&mut a, i * b, i * b, d);
        }
        for (i, (u, l)) in self.upper.iter().zip(&self.lower).enumerate() {
            write_block(&mut a, i * b, (i + 1) * b, u);
            write_block(&mut a, (i + 1) * b, i * b, l);
        }
        a
    }

    /// Dense copy of the block rows/columns `start..start + len`.
    pub fn dense_range(&self, start: usize, len: usize) -> Mat<T> {
        let b = self.blocksize;
        let mut a = zeros(len * b, len * b);
        for k in 0..len {
            write_block(&mut a, k * b, k * b, &self.diag[start + k]);
            if k + 1 < len {
                write_block(&mut a, k * b, (k + 1) * b, &self.upper[start + k]);
                write_block(&mut a, (k + 1) * b, k * b, &self.lower[start + k]);
            }
        }
        a
    }

    pub fn blocksize(&self) -> usize {
        self.blocksize
    }

    pub fn nblocks(&self) -> usize {
        self.diag.len()
    }

    /// Number of scalar rows.
    pub fn dim(&self) -> usize {
        self.nblocks() * self.blocksize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::max_abs_diff;

    fn banded(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| if i.abs_diff(j) <= 1 { (1 + i + 2 * j) as f64 } else { 0.0 })
    }

    #[test]
    fn dense_round_trip() {
        let a = banded(6);
        let bt = BlockTridiagonal::from_dense(&a, 2).unwrap();
        assert_eq!(bt.nblocks(), 3);
        assert_eq!(bt.upper.len(), 2);
        assert_eq!(bt.upper[0][(1, 0)], a[(1, 2)]);
        assert_eq!(bt.lower[1][(0, 1)], a[(4, 3)]);
        assert_eq!(max_abs_diff(&bt.to_dense(), &a), 0.0);
    }

    #[test]
    fn out_of_band_entries_are_dropped() {
        let mut a = banded(6);
        a[(0, 5)] = 9.0;
        let bt = BlockTridiagonal::from_dense(&a, 2).unwrap();
        assert_eq!(bt.to_dense()[(0, 5)], 0.0);
    }

    #[test]
    fn dense_range_matches_slice() {
        let a = banded(8);
        let bt = BlockTridiagonal::from_dense(&a, 2).unwrap();
        let part = bt.dense_range(1, 2);
        assert_eq!(max_abs_diff(&part, &sub_block(&a, 2, 2, 4, 4)), 0.0);
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(matches!(
            BlockTridiagonal::from_dense(&banded(5), 2),
            Err(PdivError::Config(_))
        ));
        let rect = Mat::<f64>::zeros(4, 6);
        assert!(matches!(BlockTridiagonal::from_dense(&rect, 2), Err(PdivError::Config(_))));
        let diag = vec![Mat::<f64>::identity(2, 2); 2];
        let err = BlockTridiagonal::new(diag, vec![], vec![]).unwrap_err();
        assert!(matches!(err, PdivError::DimensionMismatch(_)));
    }
}
