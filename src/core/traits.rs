//! Core scalar trait for pdiv.

use std::fmt::Debug;
use std::ops::Neg;

use faer::traits::ComplexField;
use num_complex::Complex64;
use num_traits::NumOps;

/// Entry type of blocks: `f64` or `Complex64`.
///
/// Layered on faer's `ComplexField` so that `Mat<T>` gets products,
/// sums and LU factorizations, with the few extra operations the
/// inverter needs (modulus, conversion to and from a
/// real/imaginary pair for message buffers).
pub trait Scalar:
    ComplexField + NumOps + Neg<Output = Self> + Copy + PartialEq + Debug + Send + Sync + 'static
{
    const IS_COMPLEX: bool;

    /// |x|
    fn modulus(self) -> f64;

    /// Builds a value from its parts; the imaginary part is ignored for real types.
    fn from_parts(re: f64, im: f64) -> Self;

    /// (re, im)
    fn parts(self) -> (f64, f64);
}

impl Scalar for f64 {
    const IS_COMPLEX: bool = false;

    fn modulus(self) -> f64 {
        self.abs()
    }

    fn from_parts(re: f64, _im: f64) -> Self {
        re
    }

    fn parts(self) -> (f64, f64) {
        (self, 0.0)
    }
}

impl Scalar for Complex64 {
    const IS_COMPLEX: bool = true;

    fn modulus(self) -> f64 {
        self.norm()
    }

    fn from_parts(re: f64, im: f64) -> Self {
        Complex64::new(re, im)
    }

    fn parts(self) -> (f64, f64) {
        (self.re, self.im)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_round_trip() {
        let z = Complex64::from_parts(1.5, -2.0);
        assert_eq!(z.parts(), (1.5, -2.0));
        assert_eq!(f64::from_parts(3.0, 7.0), 3.0);
        assert_eq!(Complex64::from_parts(3.0, 4.0).modulus(), 5.0);
        assert_eq!((-2.5f64).modulus(), 2.5);
    }
}
