//! Scalar trait and dense block helpers.

pub mod block;
pub mod traits;

pub use block::{Block, Corners};
pub use traits::Scalar;
