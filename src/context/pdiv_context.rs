//! Entry point for inverting a block-tridiagonal matrix.
//!
//! `PdivContext` holds validated [`PdivOptions`] and runs the whole
//! pipeline: partitioning, one worker per partition on the thread runtime,
//! and collection of every rank's share of the inverse. Callers that bring
//! their own communicator (an MPI job, for instance) use
//! [`PdivContext::run_rank`] on every rank instead.
//!
//! # Usage
//!
//! ```rust
//! use pdiv::{PdivContext, PdivOptions, random_block_tridiagonal};
//!
//! let a = random_block_tridiagonal::<f64>(8, 2, 42);
//! let ctx = PdivContext::new(PdivOptions::new(2, 4)).unwrap();
//! let out = ctx.invert(&a).unwrap();
//! let g = out.to_block_tridiagonal().unwrap();
//! assert_eq!(g.nblocks(), 8);
//! ```

use std::sync::Mutex;
use std::time::{Duration, Instant};

use faer::Mat;
use log::info;

use crate::config::PdivOptions;
use crate::core::block::{Block, sub_block};
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};
use crate::matrix::BlockTridiagonal;
use crate::parallel::{Comm, ThreadComm, launch};
use crate::partition::{PartitionLayout, extract_partition, partition_subdomain};
use crate::pdiv::{WorkerInput, WorkerOutput, run_worker};

#[derive(Debug, Clone)]
pub struct PdivContext {
    options: PdivOptions,
}

/// Every rank's output, in rank order.
#[derive(Debug, Clone)]
pub struct PdivOutput<T> {
    pub workers: Vec<WorkerOutput<T>>,
    pub blocksize: usize,
    /// Wall time of the distributed part, partitioning included.
    pub elapsed: Duration,
}

impl PdivContext {
    pub fn new(options: PdivOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &PdivOptions {
        &self.options
    }

    fn check_blocksize<T: Scalar>(&self, a: &BlockTridiagonal<T>) -> Result<()> {
        if a.blocksize() != self.options.blocksize {
            return Err(PdivError::Config(format!(
                "matrix has blocksize {}, options say {}",
                a.blocksize(),
                self.options.blocksize
            )));
        }
        Ok(())
    }

    /// Inverts `a` with one thread per worker.
    pub fn invert<T: Scalar>(&self, a: &BlockTridiagonal<T>) -> Result<PdivOutput<T>> {
        self.check_blocksize(a)?;
        let n = self.options.n_workers;
        let tic = Instant::now();
        let (_, partitions, bridges) = partition_subdomain(a, n)?;
        info!(
            "inverting {} blocks of size {} on {n} workers in {} reduction steps",
            a.nblocks(),
            a.blocksize(),
            self.options.n_reduction_steps()
        );

        let mut bridges: Vec<_> = bridges.into_iter().map(Some).collect();
        bridges.push(None);
        let inputs: Vec<Mutex<Option<WorkerInput<T>>>> = partitions
            .into_iter()
            .zip(bridges)
            .map(|(partition, bridge)| Mutex::new(Some(WorkerInput { partition, bridge })))
            .collect();

        let comms = ThreadComm::group(n, self.options.recv_timeout);
        let results = launch(comms, |comm| {
            let input = inputs[comm.rank()]
                .lock()
                .ok()
                .and_then(|mut slot| slot.take())
                .ok_or_else(|| PdivError::Runtime(format!("no input for rank {}", comm.rank())))?;
            run_worker(&comm, input, &self.options)
        })?;

        let mut workers = Vec::with_capacity(n);
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(out) => workers.push(out),
                Err(e) => errors.push(e),
            }
        }
        if let Some(e) = root_cause(errors) {
            return Err(e);
        }
        let elapsed = tic.elapsed();
        info!("inversion finished in {elapsed:?}");
        Ok(PdivOutput { workers, blocksize: a.blocksize(), elapsed })
    }

    /// Converts a dense matrix with the configured blocksize, then inverts it.
    pub fn invert_dense<T: Scalar>(&self, a: &Mat<T>) -> Result<PdivOutput<T>> {
        let bt = BlockTridiagonal::from_dense(a, self.options.blocksize)?;
        self.invert(&bt)
    }

    /// Runs this rank of an SPMD job on `comm`. Every rank passes the same
    /// matrix and keeps only its own partition.
    pub fn run_rank<C: Comm>(&self, comm: &C, a: &BlockTridiagonal<C::Scalar>) -> Result<WorkerOutput<C::Scalar>> {
        self.check_blocksize(a)?;
        if comm.size() != self.options.n_workers {
            return Err(PdivError::Config(format!(
                "communicator has {} ranks, options say {} workers",
                comm.size(),
                self.options.n_workers
            )));
        }
        let layout = PartitionLayout::new(a.nblocks(), a.blocksize(), comm.size())?;
        let (partition, bridge) = extract_partition(a, &layout, comm.rank());
        if comm.rank() == 0 {
            info!("inverting {} blocks on {} ranks", a.nblocks(), comm.size());
        }
        run_worker(comm, WorkerInput { partition, bridge }, &self.options)
    }
}

/// The first failure that did not merely follow from another rank failing.
fn root_cause(errors: Vec<PdivError>) -> Option<PdivError> {
    let pos = errors.iter().position(|e| !e.is_secondary()).unwrap_or(0);
    errors.into_iter().nth(pos)
}

impl<T: Scalar> PdivOutput<T> {
    /// Diagonal blocks of the inverse, top to bottom.
    pub fn diagonal_blocks(&self) -> Vec<Block<T>> {
        let b = self.blocksize;
        self.workers
            .iter()
            .flat_map(|w| (0..w.nblocks).map(move |k| sub_block(&w.inverse, k * b, k * b, b, b)))
            .collect()
    }

    /// The block-tridiagonal part of the inverse.
    pub fn to_block_tridiagonal(&self) -> Result<BlockTridiagonal<T>> {
        let b = self.blocksize;
        let mut upper = Vec::new();
        let mut lower = Vec::new();
        for (p, w) in self.workers.iter().enumerate() {
            for k in 0..w.nblocks - 1 {
                upper.push(sub_block(&w.inverse, k * b, (k + 1) * b, b, b));
                lower.push(sub_block(&w.inverse, (k + 1) * b, k * b, b, b));
            }
            if p + 1 < self.workers.len() {
                match (&w.upper_bridge, &w.lower_bridge) {
                    (Some(u), Some(l)) => {
                        upper.push(u.clone());
                        lower.push(l.clone());
                    }
                    _ => return Err(PdivError::Runtime(format!("rank {p} returned no bridge blocks"))),
                }
            }
        }
        BlockTridiagonal::new(self.diagonal_blocks(), upper, lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::Tag;

    #[test]
    fn root_cause_skips_secondary_errors() {
        let errors = vec![
            PdivError::Aborted { rank: 0, peer: 2 },
            PdivError::Timeout { rank: 1, peer: 2, tag: Tag::Barrier, timeout: Duration::from_secs(1) },
            PdivError::Singular { what: "partition", rank: 2, step: 0 },
        ];
        assert!(matches!(root_cause(errors), Some(PdivError::Singular { rank: 2, .. })));

        let only_secondary = vec![PdivError::Aborted { rank: 1, peer: 0 }];
        assert!(matches!(root_cause(only_secondary), Some(PdivError::Aborted { rank: 1, .. })));
        assert!(root_cause(Vec::new()).is_none());
    }

    #[test]
    fn rejects_invalid_options() {
        assert!(matches!(PdivContext::new(PdivOptions::new(2, 3)), Err(PdivError::Config(_))));
        assert!(matches!(PdivContext::new(PdivOptions::new(0, 2)), Err(PdivError::Config(_))));
    }

    #[test]
    fn blocksize_must_match_options() {
        let a = crate::matrix::random_block_tridiagonal::<f64>(4, 3, 1);
        let ctx = PdivContext::new(PdivOptions::new(2, 2)).unwrap();
        assert!(matches!(ctx.invert(&a), Err(PdivError::Config(_))));
    }
}
