//! Element-wise comparison of computed inverses against a reference.

use faer::Mat;

use crate::core::block::{max_abs, max_abs_diff, sub_block};
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};
use crate::matrix::BlockTridiagonal;

/// `|a - b| <= atol + rtol·|b|`, entry by entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { rtol: 1e-9, atol: 1e-12 }
    }
}

/// True if `a` and `b` have the same shape and every entry is within
/// tolerance. Any NaN fails.
pub fn all_close<T: Scalar>(a: &Mat<T>, b: &Mat<T>, tol: Tolerance) -> bool {
    if a.nrows() != b.nrows() || a.ncols() != b.ncols() {
        return false;
    }
    (0..a.ncols()).all(|j| {
        (0..a.nrows()).all(|i| (a[(i, j)] - b[(i, j)]).modulus() <= tol.atol + tol.rtol * b[(i, j)].modulus())
    })
}

#[derive(Clone, Debug)]
pub struct ComparisonReport {
    pub max_abs_error: f64,
    /// Largest block error relative to the largest entry of the reference block.
    pub max_rel_error: f64,
    pub blocks_compared: usize,
    /// Block positions `(i, j)` that are not within tolerance.
    pub mismatched: Vec<(usize, usize)>,
}

impl ComparisonReport {
    pub fn passed(&self) -> bool {
        self.mismatched.is_empty()
    }
}

/// Compares the tridiagonal band of `computed` with the same blocks of the
/// dense `reference`.
pub fn compare_block_tridiagonal<T: Scalar>(
    computed: &BlockTridiagonal<T>,
    reference: &Mat<T>,
    tol: Tolerance,
) -> Result<ComparisonReport> {
    if reference.nrows() != computed.dim() || reference.ncols() != computed.dim() {
        return Err(PdivError::DimensionMismatch(format!(
            "reference is {}x{}, computed inverse has dimension {}",
            reference.nrows(),
            reference.ncols(),
            computed.dim()
        )));
    }
    let b = computed.blocksize();
    let n = computed.nblocks();
    let positions = (0..n)
        .map(|i| ((i, i), &computed.diag[i]))
        .chain((0..n - 1).map(|i| ((i, i + 1), &computed.upper[i])))
        .chain((0..n - 1).map(|i| ((i + 1, i), &computed.lower[i])));

    let mut report = ComparisonReport {
        max_abs_error: 0.0,
        max_rel_error: 0.0,
        blocks_compared: 0,
        mismatched: Vec::new(),
    };
    for ((i, j), block) in positions {
        let expected = sub_block(reference, i * b, j * b, b, b);
        let err = max_abs_diff(block, &expected);
        let scale = max_abs(&expected);
        report.max_abs_error = report.max_abs_error.max(err);
        if scale > 0.0 {
            report.max_rel_error = report.max_rel_error.max(err / scale);
        }
        report.blocks_compared += 1;
        if !all_close(block, &expected, tol) {
            report.mismatched.push((i, j));
        }
    }
    Ok(report)
}
