//! The outbound identity presented to the remote service.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Browser-like request headers sent with every backend call.
const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("TE", "trailers"),
];

/// User agent, header overrides, captured cookies, and the cookie store path.
///
/// Serialized as the session file (`{ user_agent, headers, cookies }`); the
/// cookie store path comes from configuration and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub user_agent: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
    #[serde(skip)]
    pub cookie_file: Option<PathBuf>,
}

impl IdentityProfile {
    /// Profile with the default header template and no cookies.
    #[must_use]
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            headers: DEFAULT_HEADERS
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
            cookies: BTreeMap::new(),
            cookie_file: None,
        }
    }

    /// Cookie store path, only when the file actually exists.
    #[must_use]
    pub fn existing_cookie_file(&self) -> Option<&PathBuf> {
        self.cookie_file.as_ref().filter(|path| path.is_file())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_profile_has_browser_headers() {
        let profile = IdentityProfile::new("UA/1");
        assert_eq!(profile.user_agent, "UA/1");
        assert_eq!(profile.headers.get("Accept-Language").unwrap(), "en-US,en;q=0.5");
        assert_eq!(profile.headers.len(), DEFAULT_HEADERS.len());
        assert!(profile.cookies.is_empty());
    }

    #[test]
    fn test_session_json_shape_omits_cookie_file() {
        let mut profile = IdentityProfile::new("UA/1");
        profile.cookie_file = Some(PathBuf::from("/tmp/cookies.txt"));
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["user_agent"], "UA/1");
        assert!(value.get("cookie_file").is_none());
        assert!(value["cookies"].is_object());
    }

    #[test]
    fn test_session_json_tolerates_missing_maps() {
        let profile: IdentityProfile = serde_json::from_str(r#"{"user_agent":"UA/2"}"#).unwrap();
        assert!(profile.headers.is_empty());
        assert!(profile.cookies.is_empty());
    }

    #[test]
    fn test_existing_cookie_file_requires_file_on_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("cookies.txt");
        let mut profile = IdentityProfile::new("UA");
        profile.cookie_file = Some(path.clone());
        assert!(profile.existing_cookie_file().is_none());
        std::fs::write(&path, "# Netscape HTTP Cookie File\n").unwrap();
        assert_eq!(profile.existing_cookie_file(), Some(&path));
    }
}
