//! Failure classification for errors reported by the media backend.
//!
//! Backend errors arrive as free-form text. They are translated into a
//! [`FailureSignal`] exactly once, when the [`BackendError`](crate::backend::BackendError)
//! is built, so the pacing loop and the retry logic only ever see typed variants.
//!
//! Matching is ordered and case-insensitive: the first category whose indicator
//! list matches wins, and text that matches nothing is [`FailureKind::Generic`].

use std::fmt;

use serde::Serialize;

/// Phrases that mean the remote side is throttling us.
const RATE_LIMIT_INDICATORS: &[&str] = &[
    "too many requests",
    "429",
    "rate limit",
    "blocked",
    "timeout",
    "timed out",
];

/// Phrases that point at the item itself (slideshows, unextractable posts).
const CONTENT_INDICATORS: &[&str] = &[
    "nonetype",
    "unsupported operand",
    "slideshow",
    "index out of range",
    "unsupported url",
];

/// Phrases that point at the outbound identity (cookies, permissions, login walls).
const IDENTITY_INDICATORS: &[&str] = &["cookie", "permission", "login required"];

/// Category of a failed request, as far as pacing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The service is throttling us; back off steeply.
    RateLimited,
    /// The item is malformed or unsupported; says nothing about request rate.
    ContentInvalid,
    /// The service rejected our identity (cookies, permissions).
    IdentityBlocked,
    /// Anything else; treated as transient.
    Generic,
}

impl FailureKind {
    /// Returns a short, stable label for logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ContentInvalid => "content_invalid",
            Self::IdentityBlocked => "identity_blocked",
            Self::Generic => "generic",
        }
    }

    /// Whether a local retry can help.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::ContentInvalid)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Typed result of classifying one error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FailureSignal {
    /// First matching category.
    pub kind: FailureKind,
    /// Identity indicators matched, independently of `kind`.
    pub rotate_identity: bool,
}

impl FailureSignal {
    /// Classifies raw error text.
    #[must_use]
    pub fn from_message(error: &str) -> Self {
        let lowered = error.to_lowercase();
        Self {
            kind: classify_lowered(&lowered),
            rotate_identity: matches_any(&lowered, IDENTITY_INDICATORS),
        }
    }
}

/// Classifies an error message into a [`FailureKind`].
///
/// # Examples
///
/// ```
/// use archiver_core::failure::{FailureKind, classify};
///
/// assert_eq!(classify("HTTP Error 429: Too Many Requests"), FailureKind::RateLimited);
/// assert_eq!(classify("'NoneType' object is not subscriptable"), FailureKind::ContentInvalid);
/// assert_eq!(classify("Fresh cookies are needed"), FailureKind::IdentityBlocked);
/// assert_eq!(classify("connection reset by peer"), FailureKind::Generic);
/// ```
#[must_use]
pub fn classify(error: &str) -> FailureKind {
    classify_lowered(&error.to_lowercase())
}

fn classify_lowered(lowered: &str) -> FailureKind {
    if matches_any(lowered, RATE_LIMIT_INDICATORS) {
        FailureKind::RateLimited
    } else if matches_any(lowered, CONTENT_INDICATORS) {
        FailureKind::ContentInvalid
    } else if matches_any(lowered, IDENTITY_INDICATORS) {
        FailureKind::IdentityBlocked
    } else {
        FailureKind::Generic
    }
}

fn matches_any(lowered: &str, indicators: &[&str]) -> bool {
    indicators.iter().any(|indicator| lowered.contains(indicator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rate_limit_variants() {
        assert_eq!(classify("429 too many requests"), FailureKind::RateLimited);
        assert_eq!(classify("Rate Limit exceeded"), FailureKind::RateLimited);
        assert_eq!(classify("Your IP is BLOCKED"), FailureKind::RateLimited);
        assert_eq!(classify("read timeout"), FailureKind::RateLimited);
    }

    #[test]
    fn test_classify_content_is_case_insensitive() {
        assert_eq!(classify("NoneType object"), FailureKind::ContentInvalid);
        assert_eq!(classify("nonetype object"), FailureKind::ContentInvalid);
        assert_eq!(
            classify("unsupported operand type(s) for +"),
            FailureKind::ContentInvalid
        );
        assert_eq!(classify("list index out of range"), FailureKind::ContentInvalid);
    }

    #[test]
    fn test_classify_rate_limit_wins_over_content() {
        // Ordered matching: the first list that matches decides.
        assert_eq!(
            classify("slideshow request timed out"),
            FailureKind::RateLimited
        );
    }

    #[test]
    fn test_classify_identity_only_when_nothing_else_matches() {
        assert_eq!(classify("Permission denied"), FailureKind::IdentityBlocked);
        assert_eq!(classify("Cookie expired, 429"), FailureKind::RateLimited);
    }

    #[test]
    fn test_classify_unknown_is_generic() {
        assert_eq!(classify(""), FailureKind::Generic);
        assert_eq!(classify("HTTP Error 500"), FailureKind::Generic);
    }

    #[test]
    fn test_signal_rotates_identity_independently_of_kind() {
        let signal = FailureSignal::from_message("HTTP 429; cookie jar rejected");
        assert_eq!(signal.kind, FailureKind::RateLimited);
        assert!(signal.rotate_identity);

        let signal = FailureSignal::from_message("HTTP 429");
        assert!(!signal.rotate_identity);
    }

    #[test]
    fn test_identity_flag_follows_cookie_indicators() {
        assert!(FailureSignal::from_message("Use --cookies to authenticate").rotate_identity);
        assert!(!FailureSignal::from_message("connection refused").rotate_identity);
    }

    #[test]
    fn test_only_content_invalid_is_not_retryable() {
        assert!(FailureKind::RateLimited.is_retryable());
        assert!(FailureKind::IdentityBlocked.is_retryable());
        assert!(FailureKind::Generic.is_retryable());
        assert!(!FailureKind::ContentInvalid.is_retryable());
    }
}
