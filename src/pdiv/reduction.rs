//! Reduction tree: which ranks merge with which at every step.
//!
//! At step `k` (1-based) the ranks are cut into groups of `2^k`
//! consecutive ranks. The lower half of a group is the segment merged at
//! step `k - 1`, the upper half the segment after it, and the two are
//! joined across the bridge owned by the group's middle rank.

use bitflags::bitflags;

use crate::config::check_worker_count;
use crate::error::Result;

/// One merge group at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeGroup {
    pub start: usize,
    /// Last rank of the upper half; owns the joining bridge.
    pub middle: usize,
    pub end: usize,
}

impl MergeGroup {
    pub fn ranks(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn contains(&self, rank: usize) -> bool {
        self.ranks().contains(&rank)
    }

    pub fn role(&self, rank: usize) -> MergeRole {
        let mut role = MergeRole::empty();
        role.set(MergeRole::UPPER_HALF, rank <= self.middle);
        role.set(MergeRole::PRODUCES_UPPER, rank == self.middle);
        role.set(MergeRole::PRODUCES_LOWER, rank == self.middle + 1);
        role.set(MergeRole::HAS_SUCCESSOR, rank < self.end);
        role.set(MergeRole::HAS_PREDECESSOR, rank > self.start);
        role
    }
}

bitflags! {
    /// What a rank does inside its merge group.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MergeRole: u8 {
        const UPPER_HALF      = 1 << 0;
        /// Computes and sends `UUR, ULL, ULR` and the bridge.
        const PRODUCES_UPPER  = 1 << 1;
        /// Computes and sends `DUL, DUR, DLL`.
        const PRODUCES_LOWER  = 1 << 2;
        /// Updates its cross map with the next rank's snapshot.
        const HAS_SUCCESSOR   = 1 << 3;
        /// Sends its snapshot to the previous rank.
        const HAS_PREDECESSOR = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionSchedule {
    n_workers: usize,
}

impl ReductionSchedule {
    pub fn new(n_workers: usize) -> Result<Self> {
        check_worker_count(n_workers)?;
        Ok(Self { n_workers })
    }

    pub fn n_steps(&self) -> usize {
        self.n_workers.trailing_zeros() as usize
    }

    /// Steps `1..=n_steps`.
    pub fn steps(&self) -> std::ops::RangeInclusive<usize> {
        1..=self.n_steps()
    }

    /// All groups of `step`, in rank order.
    pub fn groups(&self, step: usize) -> impl Iterator<Item = MergeGroup> {
        let stride = 1usize << step;
        (0..self.n_workers).step_by(stride).map(move |start| group_at(start, stride))
    }

    /// The group `rank` belongs to at `step`.
    pub fn group_of(&self, rank: usize, step: usize) -> MergeGroup {
        let stride = 1usize << step;
        group_at(rank - rank % stride, stride)
    }
}

fn group_at(start: usize, stride: usize) -> MergeGroup {
    let end = start + stride - 1;
    // start - 1 + ceil((end - start) / 2)
    let middle = start + (end - start + 1) / 2 - 1;
    MergeGroup { start, middle, end }
}
