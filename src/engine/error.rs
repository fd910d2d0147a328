//! Error types for per-item processing.

use thiserror::Error;

use crate::archive::DiskExhausted;
use crate::store::StoreError;

/// Conditions that end an item outside the normal success/failure paths.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The archive is full; the whole batch stops.
    #[error(transparent)]
    DiskExhausted(#[from] DiskExhausted),

    /// The run was cancelled at a sleep or retry boundary.
    #[error("cancelled")]
    Cancelled,

    /// History or metadata could not be persisted.
    #[error("failed to persist history: {0}")]
    Store(#[from] StoreError),
}
