//! Block helpers over `faer::Mat`.
//!
//! The inverter moves and combines small dense blocks all the time:
//! slicing corner blocks out of a partition inverse, writing blocks
//! back into a dense matrix, chaining products such as `A·B·J·C`,
//! and measuring element-wise differences for singularity checks and
//! comparisons. These helpers keep that code short and uniform.
//!
//! # References
//! - [faer crate documentation](https://docs.rs/faer)

use faer::Mat;

use crate::core::traits::Scalar;

/// A dense square block. Blocks are plain faer matrices.
pub type Block<T> = Mat<T>;

/// `rows × cols` zero matrix.
pub fn zeros<T: Scalar>(rows: usize, cols: usize) -> Mat<T> {
    Mat::zeros(rows, cols)
}

/// `n × n` identity.
pub fn identity<T: Scalar>(n: usize) -> Mat<T> {
    Mat::identity(n, n)
}

/// Owned copy of `m[row..row + nrows, col..col + ncols]`.
pub fn sub_block<T: Scalar>(m: &Mat<T>, row: usize, col: usize, nrows: usize, ncols: usize) -> Mat<T> {
    assert!(row + nrows <= m.nrows() && col + ncols <= m.ncols(), "sub_block out of bounds");
    Mat::from_fn(nrows, ncols, |i, j| m[(row + i, col + j)])
}

/// Writes `src` into `dst` with its top-left corner at `(row, col)`.
pub fn write_block<T: Scalar>(dst: &mut Mat<T>, row: usize, col: usize, src: &Mat<T>) {
    assert!(
        row + src.nrows() <= dst.nrows() && col + src.ncols() <= dst.ncols(),
        "write_block out of bounds"
    );
    for j in 0..src.ncols() {
        for i in 0..src.nrows() {
            dst[(row + i, col + j)] = src[(i, j)];
        }
    }
}

/// Left-to-right product `first · rest[0] · rest[1] · …`.
pub fn product<T: Scalar>(first: &Mat<T>, rest: &[&Mat<T>]) -> Mat<T> {
    rest.iter().fold(first.clone(), |acc, m| &acc * *m)
}

/// `-m`
pub fn negated<T: Scalar>(m: &Mat<T>) -> Mat<T> {
    Mat::from_fn(m.nrows(), m.ncols(), |i, j| -m[(i, j)])
}

/// `[a b]`
pub fn hstack<T: Scalar>(a: &Mat<T>, b: &Mat<T>) -> Mat<T> {
    assert_eq!(a.nrows(), b.nrows(), "hstack: row counts differ");
    let split = a.ncols();
    Mat::from_fn(a.nrows(), split + b.ncols(), |i, j| {
        if j < split { a[(i, j)] } else { b[(i, j - split)] }
    })
}

/// `[a; b]`
pub fn vstack<T: Scalar>(a: &Mat<T>, b: &Mat<T>) -> Mat<T> {
    assert_eq!(a.ncols(), b.ncols(), "vstack: column counts differ");
    let split = a.nrows();
    Mat::from_fn(split + b.nrows(), a.ncols(), |i, j| {
        if i < split { a[(i, j)] } else { b[(i - split, j)] }
    })
}

/// `[[a11, a12], [a21, a22]]` from four equally sized blocks.
pub fn from_quadrants<T: Scalar>(a11: &Mat<T>, a12: &Mat<T>, a21: &Mat<T>, a22: &Mat<T>) -> Mat<T> {
    vstack(&hstack(a11, a12), &hstack(a21, a22))
}

/// Largest entry modulus; NaN if any entry is NaN.
pub fn max_abs<T: Scalar>(m: &Mat<T>) -> f64 {
    let mut max = 0.0f64;
    for j in 0..m.ncols() {
        for i in 0..m.nrows() {
            let v = m[(i, j)].modulus();
            if v.is_nan() {
                return f64::NAN;
            }
            max = max.max(v);
        }
    }
    max
}

/// Infinity norm, the largest row sum of entry moduli; NaN if any entry is NaN.
pub fn norm_inf<T: Scalar>(m: &Mat<T>) -> f64 {
    let mut max = 0.0f64;
    for i in 0..m.nrows() {
        let row: f64 = (0..m.ncols()).map(|j| m[(i, j)].modulus()).sum();
        if row.is_nan() {
            return f64::NAN;
        }
        max = max.max(row);
    }
    max
}

/// Largest entry modulus of `a - b`.
pub fn max_abs_diff<T: Scalar>(a: &Mat<T>, b: &Mat<T>) -> f64 {
    assert!(a.nrows() == b.nrows() && a.ncols() == b.ncols(), "max_abs_diff: shapes differ");
    let mut max = 0.0f64;
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            let v = (a[(i, j)] - b[(i, j)]).modulus();
            if v.is_nan() {
                return f64::NAN;
            }
            max = max.max(v);
        }
    }
    max
}

/// The four corner blocks of a matrix made of `blocksize` blocks.
///
/// `F` is the first block row/column, `L` the last. For a single-block
/// matrix all four corners are the same block.
#[derive(Debug, Clone)]
pub struct Corners<T> {
    pub ff: Block<T>,
    pub fl: Block<T>,
    pub lf: Block<T>,
    pub ll: Block<T>,
}

impl<T: Scalar> Corners<T> {
    pub fn extract(m: &Mat<T>, blocksize: usize) -> Self {
        let last = m.nrows() - blocksize;
        Self {
            ff: sub_block(m, 0, 0, blocksize, blocksize),
            fl: sub_block(m, 0, last, blocksize, blocksize),
            lf: sub_block(m, last, 0, blocksize, blocksize),
            ll: sub_block(m, last, last, blocksize, blocksize),
        }
    }
}
