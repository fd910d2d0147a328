//! Boundary to the external media extraction tool.
//!
//! [`MediaBackend`] is the only coupling to the extractor. Its errors are
//! classified once, when the [`BackendError`] is built, so everything past
//! this module works with [`FailureKind`] rather than raw text.

mod metadata;
mod ytdlp;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use thiserror::Error;

use crate::failure::{FailureKind, FailureSignal};
use crate::identity::IdentityProfile;

pub use metadata::VideoMetadata;
pub use ytdlp::YtDlpBackend;

/// A failed backend call: the raw message and its classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    signal: FailureSignal,
}

impl BackendError {
    /// Builds an error from raw extractor output, classifying it.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        let signal = FailureSignal::from_message(&message);
        Self { message, signal }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.signal.kind
    }

    /// Whether the message points at the identity being rejected.
    #[must_use]
    pub fn rotate_identity(&self) -> bool {
        self.signal.rotate_identity
    }
}

/// Successful metadata lookup.
#[derive(Debug, Clone, Default)]
pub struct FetchedMetadata {
    pub metadata: VideoMetadata,
    /// Response headers worth absorbing into the identity session; may be empty.
    pub response_headers: HeaderMap,
}

impl From<VideoMetadata> for FetchedMetadata {
    fn from(metadata: VideoMetadata) -> Self {
        Self {
            metadata,
            response_headers: HeaderMap::new(),
        }
    }
}

/// Delegated fetch and download capability.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Looks up metadata for `url` without downloading media.
    async fn fetch_metadata(
        &self,
        url: &str,
        identity: &IdentityProfile,
    ) -> Result<FetchedMetadata, BackendError>;

    /// Downloads `url` to `destination_template` (extractor output template).
    async fn download(
        &self,
        url: &str,
        destination_template: &str,
        identity: &IdentityProfile,
    ) -> Result<(), BackendError>;
}
