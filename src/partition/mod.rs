//! Partitioner: splits a block-tridiagonal matrix into contiguous block-row
//! partitions, one per worker, and the bridges that connect them.
//!
//! Partition `p` covers block rows/columns `starts[p]..starts[p] + sizes[p]`.
//! Bridge `p` is the pair of off-diagonal blocks between the last block of
//! partition `p` and the first block of partition `p + 1`; it belongs to
//! rank `p`.

use faer::Mat;

use crate::config::check_worker_count;
use crate::core::block::Block;
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};
use crate::matrix::BlockTridiagonal;

/// Where each partition starts and how many blocks it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    pub blocksize: usize,
    pub nblocks: usize,
    pub starts: Vec<usize>,
    pub sizes: Vec<usize>,
}

impl PartitionLayout {
    /// As-equal-as-possible split of `nblocks` blocks over `n_partitions`
    /// partitions; the first `nblocks % n_partitions` partitions get one
    /// extra block.
    pub fn new(nblocks: usize, blocksize: usize, n_partitions: usize) -> Result<Self> {
        check_worker_count(n_partitions)?;
        if blocksize == 0 {
            return Err(PdivError::Config("blocksize must be positive".into()));
        }
        if n_partitions > nblocks {
            return Err(PdivError::Config(format!(
                "{n_partitions} workers for only {nblocks} blocks"
            )));
        }
        let base = nblocks / n_partitions;
        let rem = nblocks % n_partitions;
        let sizes: Vec<usize> = (0..n_partitions).map(|p| base + usize::from(p < rem)).collect();
        let starts = sizes
            .iter()
            .scan(0, |cursor, &size| {
                let start = *cursor;
                *cursor += size;
                Some(start)
            })
            .collect();
        Ok(Self { blocksize, nblocks, starts, sizes })
    }

    pub fn n_partitions(&self) -> usize {
        self.sizes.len()
    }

    /// First scalar row of partition `p`.
    pub fn row_offset(&self, p: usize) -> usize {
        self.starts[p] * self.blocksize
    }

    /// Scalar dimension of partition `p`.
    pub fn partition_dim(&self, p: usize) -> usize {
        self.sizes[p] * self.blocksize
    }
}

/// One worker's share of the matrix.
#[derive(Debug, Clone)]
pub struct Partition<T> {
    pub rank: usize,
    pub start_block: usize,
    pub nblocks: usize,
    pub blocksize: usize,
    /// Dense `nblocks·blocksize` square sub-matrix.
    pub matrix: Mat<T>,
}

/// Off-diagonal blocks linking partition `p` to partition `p + 1`.
#[derive(Debug, Clone)]
pub struct Bridge<T> {
    /// `A[last(p), first(p + 1)]`
    pub upper: Block<T>,
    /// `A[first(p + 1), last(p)]`
    pub lower: Block<T>,
}

/// Partition `p` and, unless it is the last partition, its bridge to `p + 1`.
pub fn extract_partition<T: Scalar>(
    a: &BlockTridiagonal<T>,
    layout: &PartitionLayout,
    p: usize,
) -> (Partition<T>, Option<Bridge<T>>) {
    let start = layout.starts[p];
    let len = layout.sizes[p];
    let partition = Partition {
        rank: p,
        start_block: start,
        nblocks: len,
        blocksize: layout.blocksize,
        matrix: a.dense_range(start, len),
    };
    let bridge = (p + 1 < layout.n_partitions()).then(|| {
        let last = start + len - 1;
        Bridge { upper: a.upper[last].clone(), lower: a.lower[last].clone() }
    });
    (partition, bridge)
}

/// All partitions and all `P - 1` bridges.
pub fn partition_subdomain<T: Scalar>(
    a: &BlockTridiagonal<T>,
    n_partitions: usize,
) -> Result<(PartitionLayout, Vec<Partition<T>>, Vec<Bridge<T>>)> {
    let layout = PartitionLayout::new(a.nblocks(), a.blocksize(), n_partitions)?;
    let mut partitions = Vec::with_capacity(n_partitions);
    let mut bridges = Vec::with_capacity(n_partitions - 1);
    for p in 0..n_partitions {
        let (partition, bridge) = extract_partition(a, &layout, p);
        partitions.push(partition);
        bridges.extend(bridge);
    }
    Ok((layout, partitions, bridges))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{max_abs_diff, sub_block};
    use crate::matrix::random_block_tridiagonal;

    #[test]
    fn even_and_uneven_layouts() {
        let even = PartitionLayout::new(8, 3, 4).unwrap();
        assert_eq!(even.sizes, vec![2, 2, 2, 2]);
        assert_eq!(even.starts, vec![0, 2, 4, 6]);
        assert_eq!(even.row_offset(2), 12);

        let uneven = PartitionLayout::new(7, 2, 4).unwrap();
        assert_eq!(uneven.sizes, vec![2, 2, 2, 1]);
        assert_eq!(uneven.starts, vec![0, 2, 4, 6]);
        assert_eq!(uneven.partition_dim(3), 2);
    }

    #[test]
    fn layout_validation() {
        assert!(matches!(PartitionLayout::new(8, 2, 3), Err(PdivError::Config(_))));
        assert!(matches!(PartitionLayout::new(2, 2, 4), Err(PdivError::Config(_))));
        assert!(matches!(PartitionLayout::new(8, 0, 2), Err(PdivError::Config(_))));
        assert!(PartitionLayout::new(1, 2, 1).is_ok());
    }

    #[test]
    fn partitions_and_bridges_match_dense_matrix() {
        let a = random_block_tridiagonal::<f64>(6, 2, 11);
        let dense = a.to_dense();
        let (layout, parts, bridges) = partition_subdomain(&a, 2).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(bridges.len(), 1);

        for part in &parts {
            let off = layout.row_offset(part.rank);
            let n = layout.partition_dim(part.rank);
            assert_eq!(max_abs_diff(&part.matrix, &sub_block(&dense, off, off, n, n)), 0.0);
        }
        // bridge between block 2 (last of rank 0) and block 3 (first of rank 1)
        assert_eq!(max_abs_diff(&bridges[0].upper, &sub_block(&dense, 4, 6, 2, 2)), 0.0);
        assert_eq!(max_abs_diff(&bridges[0].lower, &sub_block(&dense, 6, 4, 2, 2)), 0.0);
    }
}
