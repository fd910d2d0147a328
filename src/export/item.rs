//! Export kinds and the work items they produce.

use std::fmt;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;
use url::Url;

/// Host suffix of mobile share links.
const SHARE_HOST: &str = "tiktokv.com";

#[allow(clippy::expect_used)]
static VIDEO_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("video id regex is valid") // Static pattern, safe to panic
});

/// Which list of the export to archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Liked,
    Favorite,
}

impl ExportKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Liked => "liked",
            Self::Favorite => "favorite",
        }
    }

    /// Object keys leading to the list of entries.
    #[must_use]
    pub fn json_path(self) -> &'static [&'static str] {
        match self {
            Self::Liked => &["Activity", "Like List", "ItemFavoriteList"],
            Self::Favorite => &["Activity", "Favorite Videos", "FavoriteVideoList"],
        }
    }

    /// Field holding the link inside each entry.
    #[must_use]
    pub fn url_field(self) -> &'static str {
        match self {
            Self::Liked => "link",
            Self::Favorite => "Link",
        }
    }

    #[must_use]
    pub fn metadata_file_name(self) -> String {
        format!("{}_video_metadata.json", self.label())
    }

    #[must_use]
    pub fn archive_subdir(self) -> String {
        format!("{}_videos", self.label())
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadItem {
    pub id: String,
    /// Link handed to the backend.
    pub url: String,
    /// Link as it appeared in the export.
    pub source_url: String,
    pub kind: ExportKind,
}

impl DownloadItem {
    /// Builds an item from an export link; `None` when no id can be extracted.
    #[must_use]
    pub fn from_link(link: &str, kind: ExportKind) -> Option<Self> {
        let id = extract_video_id(link)?;
        Some(Self {
            url: web_url(link, &id),
            id,
            source_url: link.to_string(),
            kind,
        })
    }
}

/// Extracts the video id from an export link.
///
/// # Examples
///
/// ```
/// use archiver_core::export::extract_video_id;
///
/// assert_eq!(
///     extract_video_id("https://www.tiktokv.com/share/video/7301234567890123456/").as_deref(),
///     Some("7301234567890123456")
/// );
/// assert_eq!(
///     extract_video_id("https://www.tiktok.com/@someone/video/7301234567890123456?lang=en").as_deref(),
///     Some("7301234567890123456")
/// );
/// assert_eq!(extract_video_id("not a link"), None);
/// ```
#[must_use]
pub fn extract_video_id(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
        .unwrap_or_default();

    let candidate = if is_share_host(&url) {
        segments.last()
    } else if let Some(index) = segments.iter().position(|segment| *segment == "video") {
        segments.get(index + 1)
    } else {
        segments.last()
    }?;

    VIDEO_ID_PATTERN
        .is_match(candidate)
        .then(|| (*candidate).to_string())
}

/// Rewrites share links to the canonical web form the extractor understands.
#[must_use]
pub fn web_url(link: &str, id: &str) -> String {
    match Url::parse(link.trim()) {
        Ok(url) if is_share_host(&url) => format!("https://www.tiktok.com/@user/video/{id}"),
        _ => link.trim().to_string(),
    }
}

fn is_share_host(url: &Url) -> bool {
    url.host_str()
        .is_some_and(|host| host == SHARE_HOST || host.ends_with(&format!(".{SHARE_HOST}")))
}
