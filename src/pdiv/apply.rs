//! Map applier: turns the final maps into inverse blocks.

use faer::Mat;

use crate::core::block::{Block, Corners, hstack, product, sub_block, vstack};
use crate::core::traits::Scalar;
use crate::error::Result;
use crate::parallel::{Comm, Tag};
use crate::pdiv::maps::{CrossMap, MatrixMap};
use crate::pdiv::unpack;

/// Inverse blocks at the bridge between partition `p` and `p + 1`.
#[derive(Debug, Clone)]
pub struct BridgeInverse<T> {
    /// `G(last(p), first(p + 1))`
    pub upper: Block<T>,
    /// `G(first(p + 1), last(p))`
    pub lower: Block<T>,
}

/// `g + [g[:,F] g[:,L]]·[[M8,M9],[M10,M11]]·[g[F,:]; g[L,:]]`
pub fn corrected_partition<T: Scalar>(g: &Mat<T>, matrix: &MatrixMap<T>, blocksize: usize) -> Mat<T> {
    let n = g.nrows();
    let last = n - blocksize;
    let left = hstack(&sub_block(g, 0, 0, n, blocksize), &sub_block(g, 0, last, n, blocksize));
    let right = vstack(&sub_block(g, 0, 0, blocksize, n), &sub_block(g, last, 0, blocksize, n));
    g + &product(&left, &[&matrix.correction(), &right])
}

/// Bridge inverse blocks from this rank's corners, the next rank's
/// `ff, fl, lf` corners and this rank's cross map.
pub fn bridge_inverse<T: Scalar>(
    own: &Corners<T>,
    next_ff: &Block<T>,
    next_fl: &Block<T>,
    next_lf: &Block<T>,
    cross: &CrossMap<T>,
) -> BridgeInverse<T> {
    BridgeInverse {
        upper: product(&hstack(&own.lf, &own.ll), &[&cross.upper(), &vstack(next_ff, next_lf)]),
        lower: product(&hstack(next_ff, next_fl), &[&cross.lower(), &vstack(&own.fl, &own.ll)]),
    }
}

/// Corrected partition inverse and, except on the last rank, the bridge
/// inverse blocks. Every rank but the first sends its corners back one rank.
pub fn apply_maps<C: Comm>(
    comm: &C,
    g: &Mat<C::Scalar>,
    corners: &Corners<C::Scalar>,
    matrix: &MatrixMap<C::Scalar>,
    cross: &CrossMap<C::Scalar>,
    blocksize: usize,
) -> Result<(Mat<C::Scalar>, Option<BridgeInverse<C::Scalar>>)> {
    let (rank, size) = (comm.rank(), comm.size());
    if size == 1 {
        return Ok((g.clone(), None));
    }
    if rank > 0 {
        let blocks = vec![corners.ff.clone(), corners.fl.clone(), corners.lf.clone()];
        comm.send(rank - 1, Tag::Corners, blocks)?;
    }
    let bridge = if rank + 1 < size {
        let [ff, fl, lf] = unpack(comm.recv(rank + 1, Tag::Corners)?, Tag::Corners, rank)?;
        Some(bridge_inverse(corners, &ff, &fl, &lf, cross))
    } else {
        None
    };
    Ok((corrected_partition(g, matrix, blocksize), bridge))
}
