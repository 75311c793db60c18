//! Engine error types.
//!
//! Per-record and per-source problems never surface here; they are collected
//! into the sync report. The only fatal condition is an unreachable
//! persistence collaborator, because then nothing can be committed.

use thiserror::Error;

use crate::store::StoreError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A fatal engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The persistence collaborator is unreachable.
    #[error("persistence store unavailable: {0}")]
    Store(#[from] StoreError),
}
