//! Full dense reference inverse, used to validate the distributed result.

use std::time::{Duration, Instant};

use faer::Mat;

use crate::config::options::DEFAULT_SINGULAR_TOLERANCE;
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};
use crate::solver::direct_lu::invert;

/// Ground-truth inverse and how long it took.
#[derive(Debug, Clone)]
pub struct ReferenceInverse<T> {
    pub inverse: Mat<T>,
    pub elapsed: Duration,
}

/// Inverts the whole matrix at once.
pub fn reference_inverse<T: Scalar>(a: &Mat<T>) -> Result<ReferenceInverse<T>> {
    let tic = Instant::now();
    let inverse = invert(a, DEFAULT_SINGULAR_TOLERANCE).ok_or(PdivError::Singular {
        what: "reference matrix",
        rank: 0,
        step: 0,
    })?;
    Ok(ReferenceInverse { inverse, elapsed: tic.elapsed() })
}
