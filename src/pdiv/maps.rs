//! Matrix maps and cross maps.
//!
//! A worker never holds more than its own local inverse `g`. What it knows
//! about the rest of the merged segment is folded into two fixed-size
//! collections of `blocksize × blocksize` blocks:
//!
//! * the [`MatrixMap`] expresses the segment inverse restricted to the
//!   worker's rows and columns (and its first/last block row and column)
//!   as linear combinations of `g`'s first and last block rows/columns;
//! * the [`CrossMap`] does the same for the inverse block between this
//!   partition and the next one.
//!
//! Slot layout of a matrix map, `F`/`L` the first/last block of the
//! partition and `S` the current segment:
//!
//! | slots      | meaning                                                    |
//! |------------|------------------------------------------------------------|
//! | 0, 1       | `G_S(first(S), j) = M0·g[F,j] + M1·g[L,j]`                  |
//! | 2, 3       | `G_S(i, last(S))  = g[i,F]·M2 + g[i,L]·M3`                  |
//! | 4, 5       | `G_S(i, first(S)) = g[i,F]·M4 + g[i,L]·M5`                  |
//! | 6, 7       | `G_S(last(S), j)  = M6·g[F,j] + M7·g[L,j]`                  |
//! | 8 – 11     | `G_S(i,j) = g[i,j] + [g[i,F] g[i,L]]·[[M8,M9],[M10,M11]]·[g[F,j]; g[L,j]]` |
//!
//! Before any merge the segment is the partition itself, which gives the
//! identity at slots 0, 3, 4 and 7 and zero everywhere else.

use std::ops::{Index, IndexMut};

use crate::core::block::{Block, from_quadrants, identity, sub_block, zeros};
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};

pub const MAP_SLOTS: usize = 12;

const IDENTITY_SLOTS: [usize; 4] = [0, 3, 4, 7];

#[derive(Debug, Clone)]
pub struct MatrixMap<T> {
    slots: Vec<Block<T>>,
}

#[derive(Debug, Clone)]
pub struct CrossMap<T> {
    slots: Vec<Block<T>>,
}

impl<T: Scalar> MatrixMap<T> {
    pub fn new(blocksize: usize) -> Self {
        let slots = (0..MAP_SLOTS)
            .map(|k| if IDENTITY_SLOTS.contains(&k) { identity(blocksize) } else { zeros(blocksize, blocksize) })
            .collect();
        Self { slots }
    }

    /// Rebuilds a map from the 12 `blocksize × blocksize` blocks of a
    /// snapshot message.
    pub fn from_blocks(blocks: Vec<Block<T>>, blocksize: usize) -> Result<Self> {
        if blocks.len() != MAP_SLOTS {
            return Err(PdivError::Runtime(format!(
                "matrix map snapshot with {} blocks, expected {MAP_SLOTS}",
                blocks.len()
            )));
        }
        if let Some((k, b)) = blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.nrows() != blocksize || b.ncols() != blocksize)
        {
            return Err(PdivError::Runtime(format!(
                "matrix map snapshot slot {k} is {}x{}, expected {blocksize}x{blocksize}",
                b.nrows(),
                b.ncols()
            )));
        }
        Ok(Self { slots: blocks })
    }

    pub fn blocks(&self) -> &[Block<T>] {
        &self.slots
    }

    /// `[[M8, M9], [M10, M11]]`
    pub fn correction(&self) -> Block<T> {
        from_quadrants(&self.slots[8], &self.slots[9], &self.slots[10], &self.slots[11])
    }

    /// Adds a `2b × 2b` matrix onto `[[M8, M9], [M10, M11]]`.
    pub fn add_correction(&mut self, phi: &Block<T>) {
        add_quadrants(&mut self.slots[8..12], phi);
    }
}

impl<T: Scalar> CrossMap<T> {
    pub fn new(blocksize: usize) -> Self {
        Self { slots: (0..MAP_SLOTS).map(|_| zeros(blocksize, blocksize)).collect() }
    }

    pub fn blocks(&self) -> &[Block<T>] {
        &self.slots
    }

    /// `X = [[C0, C1], [C2, C3]]`: partition rows, next partition's columns.
    pub fn upper(&self) -> Block<T> {
        from_quadrants(&self.slots[0], &self.slots[1], &self.slots[2], &self.slots[3])
    }

    /// `Y = [[C4, C5], [C6, C7]]`: next partition's rows, partition columns.
    pub fn lower(&self) -> Block<T> {
        from_quadrants(&self.slots[4], &self.slots[5], &self.slots[6], &self.slots[7])
    }

    pub fn add_upper(&mut self, x: &Block<T>) {
        add_quadrants(&mut self.slots[0..4], x);
    }

    pub fn add_lower(&mut self, y: &Block<T>) {
        add_quadrants(&mut self.slots[4..8], y);
    }
}

fn add_quadrants<T: Scalar>(slots: &mut [Block<T>], m: &Block<T>) {
    let b = slots[0].nrows();
    let offsets = [(0, 0), (0, b), (b, 0), (b, b)];
    for (slot, (row, col)) in slots.iter_mut().zip(offsets) {
        *slot = &*slot + &sub_block(m, row, col, b, b);
    }
}

impl<T> Index<usize> for MatrixMap<T> {
    type Output = Block<T>;
    fn index(&self, k: usize) -> &Block<T> {
        &self.slots[k]
    }
}

impl<T> IndexMut<usize> for MatrixMap<T> {
    fn index_mut(&mut self, k: usize) -> &mut Block<T> {
        &mut self.slots[k]
    }
}

impl<T> Index<usize> for CrossMap<T> {
    type Output = Block<T>;
    fn index(&self, k: usize) -> &Block<T> {
        &self.slots[k]
    }
}

/// A worker's maps.
#[derive(Debug, Clone)]
pub struct MapSet<T> {
    pub matrix: MatrixMap<T>,
    pub cross: CrossMap<T>,
}

/// Seeded maps for a fresh worker.
pub fn initialize_maps<T: Scalar>(blocksize: usize) -> MapSet<T> {
    MapSet { matrix: MatrixMap::new(blocksize), cross: CrossMap::new(blocksize) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::{max_abs, max_abs_diff};
    use num_complex::Complex64;

    #[test]
    fn seeded_slots() {
        let maps = initialize_maps::<Complex64>(3);
        let eye = identity::<Complex64>(3);
        for k in 0..MAP_SLOTS {
            let expected = if IDENTITY_SLOTS.contains(&k) { 1.0 } else { 0.0 };
            assert_eq!(max_abs(&maps.matrix[k]), expected, "slot {k}");
            assert_eq!(maps.matrix[k].nrows(), 3);
            assert_eq!(max_abs(&maps.cross[k]), 0.0);
        }
        assert_eq!(max_abs_diff(&maps.matrix[3], &eye), 0.0);
    }

    #[test]
    fn initialization_is_deterministic() {
        let a = initialize_maps::<f64>(2);
        let b = initialize_maps::<f64>(2);
        for k in 0..MAP_SLOTS {
            assert_eq!(max_abs_diff(&a.matrix[k], &b.matrix[k]), 0.0);
            assert_eq!(max_abs_diff(&a.cross[k], &b.cross[k]), 0.0);
        }
    }

    #[test]
    fn quadrant_accumulation() {
        let mut maps = initialize_maps::<f64>(1);
        let phi = faer::Mat::from_fn(2, 2, |i, j| (2 * i + j + 1) as f64);
        maps.matrix.add_correction(&phi);
        maps.matrix.add_correction(&phi);
        assert_eq!(maps.matrix[8][(0, 0)], 2.0);
        assert_eq!(maps.matrix[9][(0, 0)], 4.0);
        assert_eq!(maps.matrix[10][(0, 0)], 6.0);
        assert_eq!(maps.matrix[11][(0, 0)], 8.0);
        assert_eq!(max_abs_diff(&maps.matrix.correction(), &(&phi + &phi)), 0.0);

        maps.cross.add_lower(&phi);
        assert_eq!(maps.cross[7][(0, 0)], 4.0);
        assert_eq!(max_abs(&maps.cross.upper()), 0.0);
        assert_eq!(max_abs(&maps.cross[8]), 0.0);
    }

    #[test]
    fn snapshot_needs_twelve_blocks() {
        let map = MatrixMap::<f64>::new(2);
        assert!(MatrixMap::from_blocks(map.blocks().to_vec(), 2).is_ok());
        let err = MatrixMap::<f64>::from_blocks(vec![identity(2)], 2).unwrap_err();
        assert!(matches!(err, PdivError::Runtime(_)));
    }

    #[test]
    fn snapshot_blocks_must_match_blocksize() {
        let map = MatrixMap::<f64>::new(3);
        let err = MatrixMap::from_blocks(map.blocks().to_vec(), 2).unwrap_err();
        assert!(matches!(err, PdivError::Runtime(_)), "{err}");

        let mut blocks = MatrixMap::<f64>::new(2).blocks().to_vec();
        blocks[9] = zeros(2, 3);
        let err = MatrixMap::from_blocks(blocks, 2).unwrap_err();
        assert!(err.to_string().contains("slot 9"), "{err}");
    }
}
