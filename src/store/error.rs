//! Error types for durable state.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or persisting archiver state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading a state file failed.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing or atomically replacing a state file failed.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A state file exists but does not hold the expected JSON shape.
    ///
    /// Loading refuses to continue so a later save cannot clobber the file.
    #[error("{} is not valid state JSON: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// In-memory state could not be serialized.
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Another run holds the state directory.
    #[error("state directory {} is in use by another run", path.display())]
    Locked { path: PathBuf },

    /// The blocking write task panicked or was cancelled.
    #[error("state write task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
