//! Configuration of an inversion run.

pub mod options;
pub use options::{DEFAULT_RECV_TIMEOUT, DEFAULT_SINGULAR_TOLERANCE, PdivOptions, check_worker_count};
