//! Run options for the PDIV inverter.
//!
//! This module provides the `PdivOptions` struct, which is used to specify
//! the block size, the number of workers (partitions), the receive timeout
//! of the message runtime and the tolerance used to detect singular
//! partitions and coupling factors. Options are validated once by
//! [`PdivContext::new`](crate::context::PdivContext::new), before any
//! numerical work or communication starts.

use std::time::Duration;

use crate::error::{PdivError, Result};

/// Default receive timeout of the thread runtime.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(30);

/// Default lower bound on the reciprocal condition number `1 / (‖A‖∞·‖A⁻¹‖∞)`
/// below which an inversion is declared singular. Matrices with a
/// condition number up to about `1e14` are accepted.
pub const DEFAULT_SINGULAR_TOLERANCE: f64 = 1e-14;

/// Inverter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct PdivOptions {
    /// Edge length of a block.
    pub blocksize: usize,

    /// Number of workers, one partition each. Must be a power of two.
    pub n_workers: usize,

    /// How long a rank waits on a single receive. `None` waits forever.
    pub recv_timeout: Option<Duration>,

    /// Smallest accepted reciprocal condition number `1 / (‖A‖∞·‖X‖∞)` of
    /// the local and J-factor inversions, where `X` is the computed inverse.
    /// The residual `max |A·X − I|` is checked separately, relative to
    /// `‖A‖∞·‖X‖∞`, against [`RESIDUAL_BOUND`](crate::solver::direct_lu::RESIDUAL_BOUND).
    pub singular_tolerance: f64,
}

impl Default for PdivOptions {
    fn default() -> Self {
        Self {
            blocksize: 1,
            n_workers: 1,
            recv_timeout: Some(DEFAULT_RECV_TIMEOUT),
            singular_tolerance: DEFAULT_SINGULAR_TOLERANCE,
        }
    }
}

impl PdivOptions {
    pub fn new(blocksize: usize, n_workers: usize) -> Self {
        Self { blocksize, n_workers, ..Self::default() }
    }

    pub fn with_recv_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_singular_tolerance(mut self, tol: f64) -> Self {
        self.singular_tolerance = tol;
        self
    }

    /// Number of reduction steps, `log2(n_workers)`.
    pub fn n_reduction_steps(&self) -> usize {
        self.n_workers.trailing_zeros() as usize
    }

    /// Checks everything that can be checked without the matrix.
    pub fn validate(&self) -> Result<()> {
        if self.blocksize == 0 {
            return Err(PdivError::Config("blocksize must be positive".into()));
        }
        check_worker_count(self.n_workers)?;
        if !(self.singular_tolerance > 0.0 && self.singular_tolerance < 1.0) {
            return Err(PdivError::Config(format!(
                "singular tolerance must lie in (0, 1), got {}",
                self.singular_tolerance
            )));
        }
        if self.recv_timeout == Some(Duration::ZERO) {
            return Err(PdivError::Config("receive timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// The number of workers must be a power of two.
pub fn check_worker_count(n_workers: usize) -> Result<()> {
    if !n_workers.is_power_of_two() {
        return Err(PdivError::Config(format!(
            "the number of workers must be a power of two, got {n_workers}"
        )));
    }
    Ok(())
}
