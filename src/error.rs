use std::time::Duration;

use thiserror::Error;

use crate::parallel::Tag;

// Unified error type for pdiv

#[derive(Error, Debug)]
pub enum PdivError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("singular {what} on rank {rank} at reduction step {step}")]
    Singular {
        what: &'static str,
        rank: usize,
        step: usize,
    },
    #[error("rank {rank} timed out after {timeout:?} waiting for {tag:?} from rank {peer}")]
    Timeout {
        rank: usize,
        peer: usize,
        tag: Tag,
        timeout: Duration,
    },
    #[error("rank {rank} aborted: rank {peer} failed")]
    Aborted { rank: usize, peer: usize },
    #[error("rank {rank} lost its channel to rank {peer}")]
    Disconnected { rank: usize, peer: usize },
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl PdivError {
    /// True for errors that are consequences of a failure on another rank.
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            PdivError::Aborted { .. } | PdivError::Timeout { .. } | PdivError::Disconnected { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PdivError>;
