//! Direct dense inversion using Faer's partial-pivoting LU.
//!
//! Every inversion the algorithm performs goes through here: the
//! partition-local inversion (one per worker, the only expensive one),
//! the `2b × 2b` J factor of every merge, and the reference inverse.
//!
//! LU itself never reports failure, so the computed inverse `X` is
//! checked afterwards. With `κ = ‖A‖∞·‖X‖∞` it is accepted only if
//!
//! - every entry is finite,
//! - `1/κ ≥ tolerance`, the caller's bound on the reciprocal condition number,
//! - `max |A·X − I| ≤ RESIDUAL_BOUND · κ`.
//!
//! An exactly singular matrix produces a zero pivot and a non-finite `X`.
//! A matrix that is singular to working precision produces a huge `X` and
//! fails the condition bound. Ill-conditioned but regular matrices pass,
//! because the residual is measured relative to `κ`.
//!
//! # References
//! - Faer documentation: https://github.com/sarah-ek/faer-rs
//! - Golub & Van Loan, Matrix Computations

use faer::linalg::solvers::{PartialPivLu, SolveCore};
use faer::{Conj, Mat};
use log::debug;

use crate::core::block::{identity, max_abs_diff, norm_inf};
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};

/// Largest accepted `max |A·X − I| / (‖A‖∞·‖X‖∞)`. A backward-stable LU
/// stays near `n·ε`; this leaves room for large partitions.
pub const RESIDUAL_BOUND: f64 = 1e-8;

/// Inverse of `a`, or `None` if its reciprocal condition number is below
/// `tolerance` or the inverse fails the scaled residual check.
pub fn invert<T: Scalar>(a: &Mat<T>, tolerance: f64) -> Option<Mat<T>> {
    assert_eq!(a.nrows(), a.ncols(), "invert: matrix must be square");
    let n = a.nrows();
    if n == 0 {
        return Some(Mat::zeros(0, 0));
    }
    let factor = PartialPivLu::new(a.as_ref());
    let mut x = identity::<T>(n);
    factor.solve_in_place_with_conj(Conj::No, x.as_mut());

    let kappa = norm_inf(a) * norm_inf(&x);
    let residual = max_abs_diff(&(a * &x), &identity(n));
    // Written so that NaN or infinite values fail every comparison.
    let regular = kappa.is_finite() && 1.0 / kappa >= tolerance;
    if regular && residual <= RESIDUAL_BOUND * kappa {
        Some(x)
    } else {
        debug!("rejecting inverse of {n}x{n} matrix, condition {kappa:e}, residual {residual:e}");
        None
    }
}

/// Local inversion of one worker's partition.
pub fn invert_partition<T: Scalar>(partition: &Mat<T>, tolerance: f64, rank: usize) -> Result<Mat<T>> {
    invert(partition, tolerance).ok_or(PdivError::Singular {
        what: "partition",
        rank,
        step: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::DEFAULT_SINGULAR_TOLERANCE;
    use crate::matrix::random_banded;
    use approx::assert_abs_diff_eq;
    use faer::Mat;
    use num_complex::Complex64;

    #[test]
    fn inverts_dense_system() {
        // [[2,1,1],[1,3,2],[1,0,0]]: det = -1
        let a = Mat::from_fn(3, 3, |i, j| match (i, j) {
            (0, 0) => 2.0, (0, 1) => 1.0, (0, 2) => 1.0,
            (1, 0) => 1.0, (1, 1) => 3.0, (1, 2) => 2.0,
            (2, 0) => 1.0,
            _ => 0.0,
        });
        let x = invert(&a, 1e-10).unwrap();
        let expected = [[0.0, 0.0, 1.0], [-2.0, 1.0, 3.0], [3.0, -1.0, -5.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(x[(i, j)], expected[i][j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let a = Mat::from_fn(3, 3, |i, j| (i + j) as f64);
        assert!(invert(&a, 1e-8).is_none());
        assert!(invert(&Mat::<f64>::zeros(2, 2), 1e-8).is_none());
    }

    #[test]
    fn nearly_singular_matrix_is_rejected() {
        // condition number about 4e15
        let a = Mat::from_fn(2, 2, |i, j| if (i, j) == (1, 1) { 1.0 + 1e-15 } else { 1.0 });
        assert!(invert(&a, DEFAULT_SINGULAR_TOLERANCE).is_none());
    }

    #[test]
    fn ill_conditioned_matrix_is_accepted() {
        // Hilbert matrices: condition numbers about 3e10 (n = 8) and 1e12 (n = 9).
        // The absolute residual grows with κ, the scaled one does not.
        for n in [8, 9] {
            let h = Mat::from_fn(n, n, |i, j| 1.0 / (i + j + 1) as f64);
            let x = invert(&h, DEFAULT_SINGULAR_TOLERANCE).unwrap();
            let kappa = norm_inf(&h) * norm_inf(&x);
            assert!(kappa > 1e9 && kappa < 1e14, "n = {n}: {kappa:e}");
        }
    }

    #[test]
    fn inverts_large_dense_system() {
        let a = random_banded::<f64>(64, 5, 4);
        let x = invert(&a, DEFAULT_SINGULAR_TOLERANCE).unwrap();
        assert!(max_abs_diff(&(&a * &x), &identity(64)) < 1e-12);

        let c = random_banded::<Complex64>(96, 96, 5);
        let y = invert(&c, DEFAULT_SINGULAR_TOLERANCE).unwrap();
        assert!(max_abs_diff(&(&y * &c), &identity(96)) < 1e-12);
    }

    #[test]
    fn singular_partition_names_rank() {
        let err = invert_partition(&Mat::<f64>::zeros(2, 2), 1e-8, 3).unwrap_err();
        assert!(matches!(err, PdivError::Singular { what: "partition", rank: 3, step: 0 }));
    }
}
