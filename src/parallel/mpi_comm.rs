//! MPI runtime: one rank per process.
//!
//! Blocks travel as flat `f64` buffers in the [`wire`](super::wire) layout,
//! with the [`Tag`] discriminant as the MPI tag. Receives poll with
//! `immediate_probe_with_tag` so that the configured timeout applies here
//! the same way it does for threads. A failing rank calls `MPI_Abort`,
//! which tears the whole job down.
//!
//! # References
//! - [MPI Standard](https://www.mpi-forum.org/)
//!
//! # Example
//! ```no_run
//! # #[cfg(feature = "mpi")] {
//! use pdiv::parallel::{Comm, MpiComm};
//! let universe = mpi::initialize().unwrap();
//! let comm = MpiComm::<f64>::new(universe.world(), None);
//! println!("rank {} / {}", comm.rank(), comm.size());
//! # }
//! ```
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use log::{error, trace};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use super::{Comm, Tag, wire};
use crate::core::block::Block;
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};

pub struct MpiComm<T> {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    timeout: Option<Duration>,
    _scalar: PhantomData<T>,
}

impl<T: Scalar> MpiComm<T> {
    pub fn new(world: SimpleCommunicator, timeout: Option<Duration>) -> Self {
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        MpiComm { world, rank, size, timeout, _scalar: PhantomData }
    }
}

impl<T: Scalar> Comm for MpiComm<T> {
    type Scalar = T;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, dest: usize, tag: Tag, blocks: Vec<Block<T>>) -> Result<()> {
        trace!("rank {} -> {dest}: {tag:?}", self.rank);
        let buf = wire::encode(&blocks);
        self.world.process_at_rank(dest as i32).send_with_tag(&buf[..], tag as i32);
        Ok(())
    }

    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<Block<T>>> {
        let process = self.world.process_at_rank(source as i32);
        if let Some(timeout) = self.timeout {
            let deadline = Instant::now() + timeout;
            while process.immediate_probe_with_tag(tag as i32).is_none() {
                if Instant::now() >= deadline {
                    return Err(PdivError::Timeout { rank: self.rank, peer: source, tag, timeout });
                }
                std::thread::yield_now();
            }
        }
        let (buf, _status) = process.receive_vec_with_tag::<f64>(tag as i32);
        trace!("rank {} <- {source}: {tag:?}", self.rank);
        wire::decode(&buf)
    }

    fn abort(&self) {
        error!("rank {} aborting the MPI job", self.rank);
        self.world.abort(1)
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }
}
