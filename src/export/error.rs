//! Error types for reading a data export.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that make an export unusable as a whole.
///
/// Individual bad entries are skipped instead; see
/// [`ExportParseResult::skipped`](super::ExportParseResult::skipped).
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot read export file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("export file {} is not valid JSON: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The expected section is absent, e.g. the export has no favorites.
    #[error("export has no '{path}' list\n  Suggestion: check that the export includes {kind} videos")]
    MissingSection { path: String, kind: &'static str },
}
