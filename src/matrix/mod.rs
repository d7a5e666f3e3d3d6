//! Matrix module: block-tridiagonal storage, dense conversion and test matrices.

pub mod block_tridiag;
pub use block_tridiag::BlockTridiagonal;
pub mod generate;
pub use generate::{random_banded, random_block_tridiagonal};
