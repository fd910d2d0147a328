//! Descriptive record for an archived video.

use serde::{Deserialize, Serialize};

/// Metadata persisted for every archived item.
///
/// Text and count fields are optional because the extractor omits them for
/// some posts; they are stored as `null` rather than guessed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub uploader: Option<String>,
    pub uploader_id: Option<String>,
    /// Upload time as a Unix timestamp.
    pub timestamp: Option<i64>,
    /// Length in seconds.
    pub duration: Option<f64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub repost_count: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Reported size in bytes, else the approximate size, else 0.
    #[serde(default)]
    pub filesize: u64,
}

impl VideoMetadata {
    /// Minimal record carrying only an id, as produced by scripted backends.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the reported size.
    #[must_use]
    pub fn filesize(mut self, bytes: u64) -> Self {
        self.filesize = bytes;
        self
    }
}

/// Subset of the extractor's `--dump-json` document that we keep.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ExtractorInfo {
    id: Option<String>,
    title: Option<String>,
    description: Option<String>,
    uploader: Option<String>,
    uploader_id: Option<String>,
    timestamp: Option<i64>,
    duration: Option<f64>,
    view_count: Option<u64>,
    like_count: Option<u64>,
    comment_count: Option<u64>,
    repost_count: Option<u64>,
    tags: Option<Vec<String>>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    /// Cookies the extractor holds for the media URL, serialized as
    /// `name=value; Domain=...; Path=...` runs.
    cookies: Option<String>,
}

/// Attribute names that follow a cookie pair in the extractor's serialization.
const COOKIE_ATTRIBUTES: &[&str] = &[
    "domain", "path", "expires", "max-age", "samesite", "secure", "httponly",
];

impl ExtractorInfo {
    /// `name=value` pairs from the serialized cookie field, attributes dropped.
    pub(crate) fn cookie_pairs(&self) -> Vec<(String, String)> {
        let Some(raw) = self.cookies.as_deref() else {
            return Vec::new();
        };
        raw.split(';')
            .filter_map(|part| {
                let (name, value) = part.trim().split_once('=')?;
                let name = name.trim();
                let is_attribute = COOKIE_ATTRIBUTES
                    .iter()
                    .any(|attribute| name.eq_ignore_ascii_case(attribute));
                (!name.is_empty() && !is_attribute)
                    .then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect()
    }

    /// Converts into [`VideoMetadata`]; `None` when the document has no id.
    pub(crate) fn into_metadata(self) -> Option<VideoMetadata> {
        let id = self.id.filter(|id| !id.trim().is_empty())?;
        let filesize = self
            .filesize
            .filter(|size| *size > 0.0)
            .or(self.filesize_approx)
            .map_or(0, size_to_bytes);

        Some(VideoMetadata {
            id,
            title: self.title,
            description: self.description,
            uploader: self.uploader,
            uploader_id: self.uploader_id,
            timestamp: self.timestamp,
            duration: self.duration,
            view_count: self.view_count,
            like_count: self.like_count,
            comment_count: self.comment_count,
            repost_count: self.repost_count,
            tags: self.tags.unwrap_or_default(),
            filesize,
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn size_to_bytes(size: f64) -> u64 {
    if size.is_finite() && size > 0.0 {
        size.round() as u64
    } else {
        0
    }
}
