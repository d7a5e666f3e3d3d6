//! Utilities for checking results.

pub mod compare;
pub use compare::{ComparisonReport, Tolerance, all_close, compare_block_tridiagonal};
