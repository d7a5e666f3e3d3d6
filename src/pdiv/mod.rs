//! The PDIV worker.
//!
//! One call to [`run_worker`] is one rank of an SPMD run. The rank inverts
//! its partition, walks the reduction tree merging with its neighbours
//! (one [`merge::merge_step`] and one barrier per step), then applies its
//! maps to obtain its share of the inverse:
//!
//! ```text
//! g = inv(A_p)            local inverse, never modified
//! maps = (M, C)           seeded, updated once per step
//! G_p = g + g[:,F∪L]·Φ·g[F∪L,:]
//! G(last(p), first(p+1)), G(first(p+1), last(p)) from C and rank p+1's corners
//! ```

pub mod apply;
pub mod maps;
pub mod merge;
pub mod reduction;

use faer::Mat;
use log::{debug, error, info};

use crate::config::PdivOptions;
use crate::core::block::{Block, Corners};
use crate::error::{PdivError, Result};
use crate::parallel::{Comm, Tag};
use crate::partition::{Bridge, Partition};
use crate::solver::direct_lu::invert_partition;

pub use apply::BridgeInverse;
pub use maps::{CrossMap, MapSet, MatrixMap};
pub use reduction::{MergeGroup, MergeRole, ReductionSchedule};

/// What a rank starts with.
#[derive(Debug, Clone)]
pub struct WorkerInput<T> {
    pub partition: Partition<T>,
    /// `None` on the last rank.
    pub bridge: Option<Bridge<T>>,
}

/// What a rank ends with.
#[derive(Debug, Clone)]
pub struct WorkerOutput<T> {
    pub rank: usize,
    pub start_block: usize,
    pub nblocks: usize,
    /// Inverse restricted to this partition's rows and columns.
    pub inverse: Mat<T>,
    /// `G(last(p), first(p + 1))`
    pub upper_bridge: Option<Block<T>>,
    /// `G(first(p + 1), last(p))`
    pub lower_bridge: Option<Block<T>>,
    pub maps: MapSet<T>,
}

/// Runs one rank. Any failure is broadcast to the other ranks before it
/// is returned.
pub fn run_worker<C: Comm>(
    comm: &C,
    input: WorkerInput<C::Scalar>,
    options: &PdivOptions,
) -> Result<WorkerOutput<C::Scalar>> {
    let result = drive(comm, input, options);
    if let Err(e) = &result {
        if e.is_secondary() {
            debug!("rank {}: {e}", comm.rank());
        } else {
            error!("rank {}: {e}", comm.rank());
        }
        comm.abort();
    }
    result
}

fn drive<C: Comm>(
    comm: &C,
    input: WorkerInput<C::Scalar>,
    options: &PdivOptions,
) -> Result<WorkerOutput<C::Scalar>> {
    let rank = comm.rank();
    let schedule = ReductionSchedule::new(comm.size())?;
    let WorkerInput { partition, bridge } = input;
    let blocksize = partition.blocksize;
    if partition.rank != rank {
        return Err(PdivError::Runtime(format!("rank {rank} was handed partition {}", partition.rank)));
    }

    debug!("rank {rank}: inverting {} blocks from block {}", partition.nblocks, partition.start_block);
    let g = invert_partition(&partition.matrix, options.singular_tolerance, rank)?;
    let corners = Corners::extract(&g, blocksize);
    let mut maps = maps::initialize_maps(blocksize);

    for step in schedule.steps() {
        if rank == 0 {
            info!("reduction step {step} of {}", schedule.n_steps());
        }
        let group = schedule.group_of(rank, step);
        merge::merge_step(
            comm,
            group,
            step,
            &corners,
            bridge.as_ref(),
            &mut maps,
            options.singular_tolerance,
        )?;
        comm.barrier()?;
    }

    let (inverse, bridge_inverse) = apply::apply_maps(comm, &g, &corners, &maps.matrix, &maps.cross, blocksize)?;
    let (upper_bridge, lower_bridge) = match bridge_inverse {
        Some(b) => (Some(b.upper), Some(b.lower)),
        None => (None, None),
    };
    Ok(WorkerOutput {
        rank,
        start_block: partition.start_block,
        nblocks: partition.nblocks,
        inverse,
        upper_bridge,
        lower_bridge,
        maps,
    })
}

/// Splits a message into exactly `N` blocks.
pub(crate) fn unpack<T, const N: usize>(blocks: Vec<Block<T>>, tag: Tag, rank: usize) -> Result<[Block<T>; N]> {
    <[Block<T>; N]>::try_from(blocks).map_err(|b| {
        PdivError::Runtime(format!("rank {rank}: {tag:?} carried {} blocks, expected {N}", b.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::max_abs_diff;
    use crate::core::traits::Scalar;
    use crate::matrix::random_block_tridiagonal;
    use crate::parallel::{ThreadComm, launch};
    use crate::partition::partition_subdomain;
    use crate::solver::reference_inverse;
    use num_complex::Complex64;
    use std::time::Duration;

    fn run<T: Scalar>(nblocks: usize, blocksize: usize, workers: usize, seed: u64) -> f64 {
        let a = random_block_tridiagonal::<T>(nblocks, blocksize, seed);
        let reference = reference_inverse(&a.to_dense()).unwrap().inverse;
        let (layout, parts, bridges) = partition_subdomain(&a, workers).unwrap();
        let mut bridges = bridges.into_iter().map(Some).collect::<Vec<_>>();
        bridges.push(None);
        let inputs: Vec<_> = parts
            .into_iter()
            .zip(bridges)
            .map(|(partition, bridge)| std::sync::Mutex::new(Some(WorkerInput { partition, bridge })))
            .collect();
        let options = PdivOptions::new(blocksize, workers);
        let comms = ThreadComm::group(workers, Some(Duration::from_secs(30)));
        let outputs = launch(comms, |comm| {
            let input = inputs[comm.rank()].lock().unwrap().take().unwrap();
            run_worker(&comm, input, &options)
        })
        .unwrap();

        let mut err = 0.0f64;
        for out in outputs.into_iter().map(|o| o.unwrap()) {
            let off = layout.row_offset(out.rank);
            let n = layout.partition_dim(out.rank);
            let expected = crate::core::block::sub_block(&reference, off, off, n, n);
            err = err.max(max_abs_diff(&out.inverse, &expected));
            if let (Some(up), Some(low)) = (&out.upper_bridge, &out.lower_bridge) {
                let last = off + n - blocksize;
                let next = off + n;
                let ref_up = crate::core::block::sub_block(&reference, last, next, blocksize, blocksize);
                let ref_low = crate::core::block::sub_block(&reference, next, last, blocksize, blocksize);
                err = err.max(max_abs_diff(up, &ref_up)).max(max_abs_diff(low, &ref_low));
            }
        }
        err
    }

    #[test]
    fn two_workers_real() {
        assert!(run::<f64>(4, 2, 2, 1) < 1e-10);
    }

    #[test]
    fn four_workers_complex() {
        assert!(run::<Complex64>(8, 3, 4, 2) < 1e-10);
    }

    #[test]
    fn single_block_partitions() {
        assert!(run::<f64>(8, 1, 8, 3) < 1e-10);
    }
}
