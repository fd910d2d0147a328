//! Archiver configuration: TOML file defaults, validation, and per-component slices.
//!
//! Every field has a default, so the file is optional. Components receive the
//! slice they need at construction time; nothing reads configuration globally.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::debug;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "clip-archiver.toml";

const GIB: u64 = 1024 * 1024 * 1024;
const MIB: u64 = 1024 * 1024;

/// Fixed circular list of browser identities.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
];

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiverConfig {
    pub pacing: PacingConfig,
    pub retry: RetryConfig,
    pub identity: IdentityConfig,
    pub storage: StorageConfig,
    pub backend: BackendConfig,
}

/// Control-loop tuning for the throttle controller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacingConfig {
    pub initial_delay_secs: f64,
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
    /// Failures older than this drop out of the failure window.
    pub failure_window_secs: u64,
    /// Successes older than this drop out of the hourly-rate window.
    pub success_window_secs: u64,
    /// Consecutive successes required before the delay is reduced.
    pub streak_threshold: u32,
    /// Desired successful downloads per hour.
    pub target_hourly_rate: u32,
    /// Below this many samples the hourly rate is assumed on target.
    pub warmup_samples: usize,
    /// While the oldest sample is younger than this, the rate is extrapolated.
    pub extrapolation_window_secs: u64,
    /// Floor on the elapsed time used for extrapolation.
    pub min_extrapolation_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 4.0,
            min_delay_secs: 2.0,
            max_delay_secs: 30.0,
            failure_window_secs: 300,
            success_window_secs: 3600,
            streak_threshold: 3,
            target_hourly_rate: 80,
            warmup_samples: 5,
            extrapolation_window_secs: 900,
            min_extrapolation_secs: 60,
        }
    }
}

impl PacingConfig {
    #[must_use]
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    #[must_use]
    pub fn success_window(&self) -> Duration {
        Duration::from_secs(self.success_window_secs)
    }

    fn validate(&self) -> Result<()> {
        if !(self.min_delay_secs.is_finite() && self.max_delay_secs.is_finite()) {
            bail!("Invalid pacing delays: min/max must be finite numbers");
        }
        if self.min_delay_secs <= 0.0 {
            bail!(
                "Invalid config value for `pacing.min_delay_secs`: {}. Expected a positive number",
                self.min_delay_secs
            );
        }
        if self.min_delay_secs > self.max_delay_secs {
            bail!(
                "Invalid pacing delays: min_delay_secs ({}) exceeds max_delay_secs ({})",
                self.min_delay_secs,
                self.max_delay_secs
            );
        }
        if !(self.min_delay_secs..=self.max_delay_secs).contains(&self.initial_delay_secs) {
            bail!(
                "Invalid config value for `pacing.initial_delay_secs`: {}. Expected range: {}..={}",
                self.initial_delay_secs,
                self.min_delay_secs,
                self.max_delay_secs
            );
        }
        if self.streak_threshold == 0 {
            bail!("Invalid config value for `pacing.streak_threshold`: 0. Expected at least 1");
        }
        if self.target_hourly_rate == 0 {
            bail!("Invalid config value for `pacing.target_hourly_rate`: 0. Expected at least 1");
        }
        if self.success_window_secs == 0 || self.failure_window_secs == 0 {
            bail!("Invalid pacing windows: failure/success windows must be non-zero");
        }
        Ok(())
    }
}

/// Local retry caps for the per-item workflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub metadata_attempts: u32,
    pub download_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            metadata_attempts: 3,
            download_attempts: 3,
        }
    }
}

/// Identity rotation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Rotate proactively after this many successful downloads (0 disables).
    pub rotate_every_successes: u64,
    pub user_agents: Vec<String>,
    /// Netscape cookie file handed to the backend when it exists.
    pub cookie_file: Option<PathBuf>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            rotate_every_successes: 10,
            user_agents: DEFAULT_USER_AGENTS.iter().map(ToString::to_string).collect(),
            cookie_file: None,
        }
    }
}

/// Where state and media live, and how much media we may keep.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub state_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub capacity_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("logs"),
            archive_dir: PathBuf::from("downloads"),
            capacity_bytes: 500 * GIB,
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn history_file(&self) -> PathBuf {
        self.state_dir.join("download_history.json")
    }

    #[must_use]
    pub fn session_file(&self) -> PathBuf {
        self.state_dir.join("session_data.json")
    }

    /// Cookie file used when none is configured explicitly.
    #[must_use]
    pub fn default_cookie_file(&self) -> PathBuf {
        self.state_dir.join("cookies.txt")
    }
}

/// Network defaults passed to the extraction backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub program: PathBuf,
    pub socket_timeout_secs: u64,
    pub retries: u32,
    pub chunk_size_bytes: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            socket_timeout_secs: 30,
            retries: 3,
            chunk_size_bytes: 10 * MIB,
        }
    }
}

impl ArchiverConfig {
    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error for the first invalid value found.
    pub fn validate(&self) -> Result<()> {
        self.pacing.validate()?;
        if self.retry.metadata_attempts == 0 || self.retry.download_attempts == 0 {
            bail!("Invalid retry config: attempt caps must be at least 1");
        }
        if self.identity.user_agents.is_empty() {
            bail!("Invalid identity config: `user_agents` must not be empty");
        }
        if self.storage.capacity_bytes == 0 {
            bail!("Invalid config value for `storage.capacity_bytes`: 0");
        }
        if self.backend.socket_timeout_secs == 0 {
            bail!("Invalid config value for `backend.socket_timeout_secs`: 0");
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML, unknown keys, or invalid values.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, or from [`DEFAULT_CONFIG_FILE`] when
    /// present, or falls back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when an explicit path is missing or any file fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let candidate = match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            }
        };

        let Some(candidate) = candidate else {
            debug!("no config file found, using defaults");
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        };

        let raw = fs::read_to_string(&candidate)
            .with_context(|| format!("Failed to read config file '{}'", candidate.display()))?;
        debug!(path = %candidate.display(), "loaded config file");
        Self::from_toml_str(&raw)
            .with_context(|| format!("Failed to load config file '{}'", candidate.display()))
    }
}
