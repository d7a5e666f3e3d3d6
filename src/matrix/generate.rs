//! Seeded random test matrices.
//!
//! Entries are uniform on `[-1, 1]` (real and imaginary parts independently
//! for complex scalars). The diagonal is shifted so that every row is
//! strictly diagonally dominant, which keeps every partition and every
//! Schur complement the inverter meets non-singular.

use faer::Mat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::block::Block;
use crate::core::traits::Scalar;
use crate::matrix::BlockTridiagonal;

fn sample<T: Scalar>(rng: &mut StdRng) -> T {
    let re = rng.gen_range(-1.0..=1.0);
    let im = if T::IS_COMPLEX { rng.gen_range(-1.0..=1.0) } else { 0.0 };
    T::from_parts(re, im)
}

/// Shift that dominates `off_diagonal` entries of modulus at most √2.
fn dominance_shift(off_diagonal: usize) -> f64 {
    1.5 * off_diagonal as f64 + 1.0
}

/// Dense `size × size` matrix with non-zeros where `|i - j| <= bandwidth`.
pub fn random_banded<T: Scalar>(size: usize, bandwidth: usize, seed: u64) -> Mat<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    let shift = T::from_parts(dominance_shift(2 * bandwidth), 0.0);
    let mut a = Mat::zeros(size, size);
    for i in 0..size {
        for j in i.saturating_sub(bandwidth)..(i + bandwidth + 1).min(size) {
            a[(i, j)] = sample::<T>(&mut rng);
        }
        a[(i, i)] = a[(i, i)] + shift;
    }
    a
}

/// Block-tridiagonal matrix with fully dense blocks.
pub fn random_block_tridiagonal<T: Scalar>(nblocks: usize, blocksize: usize, seed: u64) -> BlockTridiagonal<T> {
    let mut rng = StdRng::seed_from_u64(seed);
    let shift = T::from_parts(dominance_shift((3 * blocksize).saturating_sub(1)), 0.0);
    let block = |rng: &mut StdRng| -> Block<T> {
        let values: Vec<T> = (0..blocksize * blocksize).map(|_| sample::<T>(rng)).collect();
        Mat::from_fn(blocksize, blocksize, |i, j| values[j * blocksize + i])
    };
    let diag = (0..nblocks)
        .map(|_| {
            let mut d = block(&mut rng);
            for i in 0..blocksize {
                d[(i, i)] = d[(i, i)] + shift;
            }
            d
        })
        .collect();
    let upper = (1..nblocks).map(|_| block(&mut rng)).collect();
    let lower = (1..nblocks).map(|_| block(&mut rng)).collect();
    BlockTridiagonal { blocksize, diag, upper, lower }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::max_abs_diff;
    use num_complex::Complex64;

    #[test]
    fn same_seed_same_matrix() {
        let a = random_banded::<Complex64>(10, 2, 63);
        let b = random_banded::<Complex64>(10, 2, 63);
        assert_eq!(max_abs_diff(&a, &b), 0.0);
        let c = random_banded::<Complex64>(10, 2, 64);
        assert!(max_abs_diff(&a, &c) > 0.0);
    }

    #[test]
    fn banded_structure() {
        let a = random_banded::<f64>(8, 1, 1);
        for i in 0..8usize {
            for j in 0..8usize {
                if i.abs_diff(j) > 1 {
                    assert_eq!(a[(i, j)], 0.0);
                }
            }
            let off: f64 = (0..8).filter(|&j| j != i).map(|j| a[(i, j)].abs()).sum();
            assert!(a[(i, i)].abs() > off);
        }
    }

    #[test]
    fn block_tridiagonal_shapes() {
        let a = random_block_tridiagonal::<f64>(5, 3, 7);
        assert_eq!(a.nblocks(), 5);
        assert_eq!(a.upper.len(), 4);
        assert_eq!(a.dim(), 15);
        assert!(a.diag.iter().all(|d| d.nrows() == 3 && d.ncols() == 3));
    }
}
