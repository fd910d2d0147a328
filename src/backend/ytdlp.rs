//! [`MediaBackend`] implementation that shells out to `yt-dlp`.

use std::ffi::OsString;
use std::process::Stdio;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::metadata::ExtractorInfo;
use super::{BackendError, FetchedMetadata, MediaBackend};
use crate::config::BackendConfig;
use crate::identity::IdentityProfile;

/// Runs the configured extractor program once per call.
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    config: BackendConfig,
}

impl YtDlpBackend {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }

    /// Arguments shared by metadata and download invocations.
    fn common_args(&self, identity: &IdentityProfile) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--user-agent".into(),
            identity.user_agent.clone().into(),
        ];
        for (name, value) in &identity.headers {
            args.push("--add-header".into());
            args.push(format!("{name}:{value}").into());
        }
        if !identity.cookies.is_empty() {
            let pairs: Vec<String> = identity
                .cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            args.push("--add-header".into());
            args.push(format!("Cookie:{}", pairs.join("; ")).into());
        }
        if let Some(cookie_file) = identity.existing_cookie_file() {
            args.push("--cookies".into());
            args.push(cookie_file.clone().into_os_string());
        }
        let retries = self.config.retries.to_string();
        args.extend(
            [
                "--socket-timeout".to_string(),
                self.config.socket_timeout_secs.to_string(),
                "--retries".to_string(),
                retries.clone(),
                "--extractor-retries".to_string(),
                retries.clone(),
                "--fragment-retries".to_string(),
                retries,
                "--http-chunk-size".to_string(),
                self.config.chunk_size_bytes.to_string(),
                "--no-warnings".to_string(),
            ]
            .into_iter()
            .map(OsString::from),
        );
        args
    }

    fn metadata_args(&self, url: &str, identity: &IdentityProfile) -> Vec<OsString> {
        let mut args = self.common_args(identity);
        args.extend(["--dump-json", "--skip-download", "--quiet", "--", url].map(OsString::from));
        args
    }

    fn download_args(&self, url: &str, template: &str, identity: &IdentityProfile) -> Vec<OsString> {
        let mut args = self.common_args(identity);
        args.extend(["-o", template, "-f", "best", "--quiet", "--", url].map(OsString::from));
        args
    }

    async fn run(&self, args: Vec<OsString>) -> Result<Vec<u8>, BackendError> {
        let output = Command::new(&self.config.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| {
                BackendError::new(format!(
                    "failed to run {}: {error}",
                    self.config.program.display()
                ))
            })?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr.trim();
        Err(BackendError::new(if message.is_empty() {
            format!("{} exited with {}", self.config.program.display(), output.status)
        } else {
            message.to_string()
        }))
    }
}

#[async_trait]
impl MediaBackend for YtDlpBackend {
    #[instrument(skip(self, identity))]
    async fn fetch_metadata(
        &self,
        url: &str,
        identity: &IdentityProfile,
    ) -> Result<FetchedMetadata, BackendError> {
        let stdout = self.run(self.metadata_args(url, identity)).await?;
        // Playlists print one document per line; the first one describes the post.
        let first_line = String::from_utf8_lossy(&stdout)
            .lines()
            .find(|line| !line.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| BackendError::new("extractor returned no metadata"))?;

        let info: ExtractorInfo = serde_json::from_str(&first_line)
            .map_err(|error| BackendError::new(format!("unreadable extractor output: {error}")))?;
        let response_headers = set_cookie_headers(&info.cookie_pairs());
        let metadata = info
            .into_metadata()
            .ok_or_else(|| BackendError::new("extractor metadata has no id (NoneType)"))?;

        debug!(
            id = %metadata.id,
            filesize = metadata.filesize,
            cookies = response_headers.len(),
            "fetched metadata"
        );
        Ok(FetchedMetadata {
            metadata,
            response_headers,
        })
    }

    #[instrument(skip(self, identity))]
    async fn download(
        &self,
        url: &str,
        destination_template: &str,
        identity: &IdentityProfile,
    ) -> Result<(), BackendError> {
        self.run(self.download_args(url, destination_template, identity))
            .await
            .map(|_| ())
    }
}

/// Re-expresses extractor cookies as `set-cookie` headers for the identity
/// session to absorb.
fn set_cookie_headers(pairs: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match HeaderValue::from_str(&format!("{name}={value}")) {
            Ok(header) => {
                headers.append(SET_COOKIE, header);
            }
            Err(error) => warn!(cookie = %name, error = %error, "skipping unrepresentable cookie"),
        }
    }
    headers
}
