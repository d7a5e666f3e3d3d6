//! Dense direct inversion: the partition-local inverter and the full reference inverter.

pub mod direct_lu;
pub use direct_lu::{invert, invert_partition};

pub mod reference;
pub use reference::{ReferenceInverse, reference_inverse};
