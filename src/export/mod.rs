//! Reading work items out of a personal data export.
//!
//! The export is a single JSON document. Each [`ExportKind`] names a nested
//! list and the field holding the link; entries without a usable link are
//! skipped and reported, never fatal.

mod error;
mod item;

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

pub use error::ExportError;
pub use item::{DownloadItem, ExportKind, extract_video_id, web_url};

/// An entry that produced no work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Position in the export list.
    pub index: usize,
    pub reason: String,
}

/// Result of parsing one export list.
#[derive(Debug, Clone, Default)]
pub struct ExportParseResult {
    /// Items in export order; may contain repeated ids.
    pub items: Vec<DownloadItem>,
    pub skipped: Vec<SkippedEntry>,
}

/// Reads and parses the export document at `path`.
///
/// # Errors
///
/// Returns [`ExportError::Read`] or [`ExportError::Json`].
pub fn read_export(path: &Path) -> Result<Value, ExportError> {
    let raw = fs::read_to_string(path).map_err(|source| ExportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ExportError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Extracts work items of `kind` from an export document.
///
/// `limit` truncates the export list before ids are extracted.
///
/// # Errors
///
/// Returns [`ExportError::MissingSection`] when the list for `kind` is absent
/// or not an array.
#[instrument(skip(document))]
pub fn parse_export(
    document: &Value,
    kind: ExportKind,
    limit: Option<usize>,
) -> Result<ExportParseResult, ExportError> {
    let entries = kind
        .json_path()
        .iter()
        .try_fold(document, |node, key| node.get(*key))
        .and_then(Value::as_array)
        .ok_or_else(|| ExportError::MissingSection {
            path: kind.json_path().join(" > "),
            kind: kind.label(),
        })?;

    let take = limit.unwrap_or(entries.len());
    if take < entries.len() {
        info!(limit = take, total = entries.len(), "limiting export entries");
    }

    let mut result = ExportParseResult::default();
    for (index, entry) in entries.iter().take(take).enumerate() {
        let Some(link) = entry.get(kind.url_field()).and_then(Value::as_str) else {
            warn!(index, field = kind.url_field(), "export entry has no link, skipping");
            result.skipped.push(SkippedEntry {
                index,
                reason: format!("missing '{}' field", kind.url_field()),
            });
            continue;
        };

        match DownloadItem::from_link(link, kind) {
            Some(item) => result.items.push(item),
            None => {
                warn!(index, link, "could not extract video id, skipping");
                result.skipped.push(SkippedEntry {
                    index,
                    reason: format!("no video id in '{link}'"),
                });
            }
        }
    }

    debug!(
        items = result.items.len(),
        skipped = result.skipped.len(),
        "parsed export"
    );
    Ok(result)
}
