//! Circular identity rotation with session persistence.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use reqwest::header::{HeaderMap, SET_COOKIE};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::IdentityProfile;
use crate::config::IdentityConfig;
use crate::store::{StoreError, write_json_atomic};

/// Response headers worth replaying on later requests.
const RATE_LIMIT_HINT_HEADERS: &[&str] = &["x-ratelimit-remaining", "x-ratelimit-reset"];

/// Errors raised while persisting the identity session.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to persist identity session: {0}")]
    Persist(#[from] StoreError),
}

/// Owns the current [`IdentityProfile`] and the fixed list it rotates through.
#[derive(Debug)]
pub struct IdentityRotator {
    user_agents: Vec<String>,
    current: IdentityProfile,
    session_path: Option<PathBuf>,
    rotations: u64,
}

impl IdentityRotator {
    /// Restores the session from `session_path`, or starts from the first
    /// user agent when the file is missing or unreadable.
    #[must_use]
    #[instrument(skip(config), fields(session = %session_path.display()))]
    pub fn load(config: &IdentityConfig, session_path: &Path, cookie_file: Option<PathBuf>) -> Self {
        let mut current = match read_session(session_path) {
            Ok(Some(profile)) => {
                debug!(user_agent = %profile.user_agent, "restored identity session");
                profile
            }
            Ok(None) => default_profile(&config.user_agents),
            Err(error) => {
                warn!(error = %error, "unreadable identity session, using defaults");
                default_profile(&config.user_agents)
            }
        };
        current.cookie_file = cookie_file;

        Self {
            user_agents: config.user_agents.clone(),
            current,
            session_path: Some(session_path.to_path_buf()),
            rotations: 0,
        }
    }

    /// Rotator that never touches disk.
    #[must_use]
    pub fn in_memory(config: &IdentityConfig) -> Self {
        Self {
            user_agents: config.user_agents.clone(),
            current: default_profile(&config.user_agents),
            session_path: None,
            rotations: 0,
        }
    }

    #[must_use]
    pub fn current(&self) -> &IdentityProfile {
        &self.current
    }

    /// Number of rotations performed during this run.
    #[must_use]
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    /// Advances to the next user agent, wrapping after the last one. A user
    /// agent not in the list (e.g. from an old session file) moves to the first.
    ///
    /// # Errors
    ///
    /// Returns an error when the session file cannot be written; the in-memory
    /// rotation has already happened by then.
    pub fn rotate(&mut self) -> Result<&IdentityProfile, IdentityError> {
        if !self.user_agents.is_empty() {
            let next = self
                .user_agents
                .iter()
                .position(|ua| *ua == self.current.user_agent)
                .map_or(0, |index| (index + 1) % self.user_agents.len());
            self.current.user_agent.clone_from(&self.user_agents[next]);
        }
        self.rotations += 1;
        info!(
            user_agent = %self.current.user_agent,
            rotations = self.rotations,
            "rotated identity"
        );
        self.persist()?;
        Ok(&self.current)
    }

    /// Captures `set-cookie` pairs and rate-limit hint headers from a response.
    /// Returns whether anything changed; the session is persisted only then.
    ///
    /// # Errors
    ///
    /// Returns an error when the session file cannot be written.
    pub fn absorb(&mut self, headers: &HeaderMap) -> Result<bool, IdentityError> {
        let mut changed = false;

        for value in headers.get_all(SET_COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            if let Some((name, value)) = parse_cookie_pair(raw) {
                let previous = self.current.cookies.insert(name.to_string(), value.to_string());
                changed |= previous.as_deref() != Some(value);
            }
        }

        for name in RATE_LIMIT_HINT_HEADERS {
            let Some(value) = headers.get(*name).and_then(|v| v.to_str().ok()) else {
                continue;
            };
            let previous = self
                .current
                .headers
                .insert((*name).to_string(), value.to_string());
            changed |= previous.as_deref() != Some(value);
        }

        if changed {
            debug!(
                cookies = self.current.cookies.len(),
                "absorbed session data from response"
            );
            self.persist()?;
        }
        Ok(changed)
    }

    fn persist(&self) -> Result<(), IdentityError> {
        if let Some(path) = &self.session_path {
            write_json_atomic(path, &self.current)?;
        }
        Ok(())
    }
}

fn default_profile(user_agents: &[String]) -> IdentityProfile {
    let user_agent = user_agents
        .first()
        .map_or(crate::config::DEFAULT_USER_AGENTS[0], String::as_str);
    IdentityProfile::new(user_agent)
}

fn read_session(path: &Path) -> Result<Option<IdentityProfile>, String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.to_string()),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|error| error.to_string())
}

/// First `name=value` pair of a `Set-Cookie` value; attributes are dropped.
fn parse_cookie_pair(raw: &str) -> Option<(&str, &str)> {
    let first = raw.split(';').next()?.trim();
    let (name, value) = first.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some((name, value.trim()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use tempfile::TempDir;

    fn config() -> IdentityConfig {
        IdentityConfig {
            user_agents: vec!["UA-A".into(), "UA-B".into(), "UA-C".into()],
            ..IdentityConfig::default()
        }
    }

    #[test]
    fn test_rotation_wraps_around() {
        let mut rotator = IdentityRotator::in_memory(&config());
        assert_eq!(rotator.current().user_agent, "UA-A");
        assert_eq!(rotator.rotate().unwrap().user_agent, "UA-B");
        assert_eq!(rotator.rotate().unwrap().user_agent, "UA-C");
        assert_eq!(rotator.rotate().unwrap().user_agent, "UA-A");
        assert_eq!(rotator.rotations(), 3);
    }

    #[test]
    fn test_unknown_user_agent_rotates_to_first() {
        let temp = TempDir::new().unwrap();
        let session = temp.path().join("session_data.json");
        fs::write(&session, r#"{"user_agent":"Legacy/1.0","headers":{},"cookies":{}}"#).unwrap();

        let mut rotator = IdentityRotator::load(&config(), &session, None);
        assert_eq!(rotator.current().user_agent, "Legacy/1.0");
        assert_eq!(rotator.rotate().unwrap().user_agent, "UA-A");
    }

    #[test]
    fn test_rotation_persists_and_reloads() {
        let temp = TempDir::new().unwrap();
        let session = temp.path().join("session_data.json");
        {
            let mut rotator = IdentityRotator::load(&config(), &session, None);
            rotator.rotate().unwrap();
        }
        let rotator = IdentityRotator::load(&config(), &session, None);
        assert_eq!(rotator.current().user_agent, "UA-B");
    }

    #[test]
    fn test_unreadable_session_falls_back_to_default() {
        let temp = TempDir::new().unwrap();
        let session = temp.path().join("session_data.json");
        fs::write(&session, "garbage").unwrap();
        let rotator = IdentityRotator::load(&config(), &session, Some(temp.path().join("c.txt")));
        assert_eq!(rotator.current().user_agent, "UA-A");
        assert!(rotator.current().cookie_file.is_some());
    }

    #[test]
    fn test_absorb_captures_cookies_and_hints() {
        let temp = TempDir::new().unwrap();
        let session = temp.path().join("session_data.json");
        let mut rotator = IdentityRotator::load(&config(), &session, None);

        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("ttwid=abc; Path=/; HttpOnly"));
        headers.append(SET_COOKIE, HeaderValue::from_static("msToken=xyz"));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("12"));

        assert!(rotator.absorb(&headers).unwrap());
        let current = rotator.current();
        assert_eq!(current.cookies.get("ttwid").unwrap(), "abc");
        assert_eq!(current.cookies.get("msToken").unwrap(), "xyz");
        assert!(!current.cookies.contains_key("Path"));
        assert_eq!(current.headers.get("x-ratelimit-remaining").unwrap(), "12");

        let saved: IdentityProfile =
            serde_json::from_str(&fs::read_to_string(&session).unwrap()).unwrap();
        assert_eq!(saved.cookies.get("ttwid").unwrap(), "abc");
    }

    #[test]
    fn test_absorb_without_changes_does_not_write() {
        let temp = TempDir::new().unwrap();
        let session = temp.path().join("session_data.json");
        let mut rotator = IdentityRotator::load(&config(), &session, None);
        assert!(!rotator.absorb(&HeaderMap::new()).unwrap());
        assert!(!session.exists());
    }

    #[test]
    fn test_parse_cookie_pair() {
        assert_eq!(parse_cookie_pair("a=b; Secure"), Some(("a", "b")));
        assert_eq!(parse_cookie_pair("a=b=c"), Some(("a", "b=c")));
        assert_eq!(parse_cookie_pair("novalue"), None);
        assert_eq!(parse_cookie_pair("=x"), None);
    }
}
