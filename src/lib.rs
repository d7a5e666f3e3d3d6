//! pdiv: distributed divide-and-conquer inversion of block-tridiagonal matrices over Faer
//!
//! The matrix is cut into one contiguous partition per worker. Every worker
//! inverts its partition locally, then the workers merge pairwise up a
//! reduction tree, each one correcting its own partition through small
//! matrix and cross maps instead of ever forming the full inverse. Workers
//! run as threads of a rayon pool or, with the `mpi` feature, as MPI ranks.

pub mod parallel;

pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod matrix;
pub mod partition;
pub mod pdiv;
pub mod solver;
pub mod utils;

// Re-exports for convenience
pub use config::*;
pub use context::*;
pub use crate::core::*;
pub use error::*;
pub use matrix::*;
pub use pdiv::{WorkerInput, WorkerOutput, run_worker};
pub use solver::*;
pub use utils::*;
