//! Context module for the PDIV inverter.
//!
//! A context owns validated options and drives a complete inversion, from
//! partitioning the input to collecting every rank's share of the inverse.
//!
//! Modules:
//! - [`pdiv_context`]: `PdivContext` and the collected `PdivOutput`.

pub mod pdiv_context;
pub use pdiv_context::{PdivContext, PdivOutput};
