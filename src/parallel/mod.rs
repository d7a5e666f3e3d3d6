//! Point-to-point message passing between ranks.
//!
//! Every worker owns its partition, bridges and maps; the only thing that
//! crosses a rank boundary is a copied list of blocks, tagged with what it
//! carries. The [`Comm`] trait is the seam between the algorithm and the
//! runtime: [`ThreadComm`] runs every rank on its own thread with mailbox
//! channels, [`MpiComm`] (behind the `mpi` feature) runs one rank per MPI
//! process.

use crate::core::block::Block;
use crate::core::traits::Scalar;
use crate::error::Result;

/// What a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Tag {
    /// `UUR, ULL, ULR, Bu, Bl` from the middle rank of a merge group.
    UpperBoundary = 1,
    /// `DUL, DUR, DLL` from the rank after the middle.
    LowerBoundary = 2,
    /// Pre-update matrix map, sent to the preceding rank.
    MatrixMapSnapshot = 3,
    /// `g[F,F], g[F,L], g[L,F]` of a local inverse, sent to the preceding rank.
    Corners = 4,
    Barrier = 5,
    Release = 6,
    Abort = 7,
}

pub trait Comm {
    type Scalar: Scalar;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Queue `blocks` for `dest`.
    fn send(&self, dest: usize, tag: Tag, blocks: Vec<Block<Self::Scalar>>) -> Result<()>;

    /// Block until a message with `tag` from `source` arrives.
    fn recv(&self, source: usize, tag: Tag) -> Result<Vec<Block<Self::Scalar>>>;

    /// Tell every other rank that this one gave up.
    fn abort(&self);

    /// Send the same blocks to every rank in `ranks` except this one.
    fn send_to_all(
        &self,
        ranks: impl IntoIterator<Item = usize>,
        tag: Tag,
        blocks: &[Block<Self::Scalar>],
    ) -> Result<()> {
        for dest in ranks.into_iter().filter(|&r| r != self.rank()) {
            self.send(dest, tag, blocks.to_vec())?;
        }
        Ok(())
    }

    /// Gather to rank 0, then release from rank 0.
    fn barrier(&self) -> Result<()> {
        if self.rank() == 0 {
            for r in 1..self.size() {
                self.recv(r, Tag::Barrier)?;
            }
            for r in 1..self.size() {
                self.send(r, Tag::Release, Vec::new())?;
            }
        } else {
            self.send(0, Tag::Barrier, Vec::new())?;
            self.recv(0, Tag::Release)?;
        }
        Ok(())
    }
}

pub mod thread_comm;
pub use thread_comm::{ThreadComm, launch};

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

/// Flat `f64` encoding of a block list for byte-oriented transports.
///
/// Layout: `[n, rows_0, cols_0, …, rows_{n-1}, cols_{n-1}, re, im, re, im, …]`
/// with every block stored column-major.
#[cfg_attr(not(feature = "mpi"), allow(dead_code))]
pub(crate) mod wire {
    use faer::Mat;

    use crate::core::block::Block;
    use crate::core::traits::Scalar;
    use crate::error::{PdivError, Result};

    pub fn encode<T: Scalar>(blocks: &[Block<T>]) -> Vec<f64> {
        let data: usize = blocks.iter().map(|b| b.nrows() * b.ncols()).sum();
        let mut buf = Vec::with_capacity(1 + 2 * blocks.len() + 2 * data);
        buf.push(blocks.len() as f64);
        for b in blocks {
            buf.push(b.nrows() as f64);
            buf.push(b.ncols() as f64);
        }
        for b in blocks {
            for j in 0..b.ncols() {
                for i in 0..b.nrows() {
                    let (re, im) = b[(i, j)].parts();
                    buf.push(re);
                    buf.push(im);
                }
            }
        }
        buf
    }

    pub fn decode<T: Scalar>(buf: &[f64]) -> Result<Vec<Block<T>>> {
        let malformed = || PdivError::Runtime(format!("malformed message of {} values", buf.len()));
        let n = *buf.first().ok_or_else(malformed)? as usize;
        let header = buf.get(1..1 + 2 * n).ok_or_else(malformed)?;
        let mut data = &buf[1 + 2 * n..];
        let mut blocks = Vec::with_capacity(n);
        for shape in header.chunks_exact(2) {
            let (rows, cols) = (shape[0] as usize, shape[1] as usize);
            let (values, rest) = data.split_at_checked(2 * rows * cols).ok_or_else(malformed)?;
            blocks.push(Mat::from_fn(rows, cols, |i, j| {
                let k = 2 * (j * rows + i);
                T::from_parts(values[k], values[k + 1])
            }));
            data = rest;
        }
        if !data.is_empty() {
            return Err(malformed());
        }
        Ok(blocks)
    }

}
