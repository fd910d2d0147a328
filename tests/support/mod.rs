//! Shared helpers for integration tests: a scripted in-process backend and
//! engine builders. No network access is needed.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use archiver_core::archive::DiskBudget;
use archiver_core::backend::{BackendError, FetchedMetadata, MediaBackend, VideoMetadata};
use archiver_core::config::{IdentityConfig, PacingConfig};
use archiver_core::engine::ArchiveEngine;
use archiver_core::export::{DownloadItem, ExportKind, extract_video_id};
use archiver_core::identity::{IdentityProfile, IdentityRotator};
use archiver_core::pacing::{ThrottleController, TokioClock};
use archiver_core::store::HistoryRepository;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, SET_COOKIE};
use tokio_util::sync::CancellationToken;

pub const USER_AGENTS: &[&str] = &["UA-A", "UA-B", "UA-C"];

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Metadata { id: String, user_agent: String },
    Download { id: String, template: String, user_agent: String },
}

impl Call {
    pub fn id(&self) -> &str {
        match self {
            Self::Metadata { id, .. } | Self::Download { id, .. } => id,
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    metadata_failures: HashMap<String, VecDeque<String>>,
    download_failures: HashMap<String, VecDeque<String>>,
    filesizes: HashMap<String, u64>,
    set_cookies: HashMap<String, String>,
    calls: Vec<Call>,
    cancel_on_download: Option<(String, CancellationToken)>,
}

/// Backend that replays scripted failures and otherwise succeeds.
///
/// Clones share the script, so a test keeps a handle after moving one into
/// the engine.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata lookups for `id` fail with `messages`, in order, then succeed.
    pub fn fail_metadata(&self, id: &str, messages: &[&str]) -> &Self {
        self.script
            .lock()
            .unwrap()
            .metadata_failures
            .insert(id.to_string(), messages.iter().map(ToString::to_string).collect());
        self
    }

    /// Downloads of `id` fail with `messages`, in order, then succeed.
    pub fn fail_download(&self, id: &str, messages: &[&str]) -> &Self {
        self.script
            .lock()
            .unwrap()
            .download_failures
            .insert(id.to_string(), messages.iter().map(ToString::to_string).collect());
        self
    }

    pub fn set_filesize(&self, id: &str, bytes: u64) -> &Self {
        self.script
            .lock()
            .unwrap()
            .filesizes
            .insert(id.to_string(), bytes);
        self
    }

    /// Metadata lookups for `id` answer with a `set-cookie` header.
    pub fn set_cookie(&self, id: &str, cookie: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .set_cookies
            .insert(id.to_string(), cookie.to_string());
        self
    }

    /// Cancels `token` while downloading `id`.
    pub fn cancel_on_download(&self, id: &str, token: CancellationToken) -> &Self {
        self.script.lock().unwrap().cancel_on_download = Some((id.to_string(), token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn metadata_calls(&self, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Metadata { .. }) && call.id() == id)
            .count()
    }

    pub fn download_calls(&self, id: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Download { .. }) && call.id() == id)
            .count()
    }

    pub fn metadata_user_agents(&self, id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Metadata { id: call_id, user_agent } if call_id == id => Some(user_agent),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MediaBackend for ScriptedBackend {
    async fn fetch_metadata(
        &self,
        url: &str,
        identity: &IdentityProfile,
    ) -> Result<FetchedMetadata, BackendError> {
        let id = extract_video_id(url).unwrap_or_default();
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Metadata {
            id: id.clone(),
            user_agent: identity.user_agent.clone(),
        });
        if let Some(message) = script
            .metadata_failures
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
        {
            return Err(BackendError::new(message));
        }
        let filesize = script.filesizes.get(&id).copied().unwrap_or(1024);
        let mut fetched: FetchedMetadata = VideoMetadata::with_id(id.clone()).filesize(filesize).into();
        if let Some(cookie) = script.set_cookies.get(&id) {
            fetched
                .response_headers
                .append(SET_COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        Ok(fetched)
    }

    async fn download(
        &self,
        url: &str,
        destination_template: &str,
        identity: &IdentityProfile,
    ) -> Result<(), BackendError> {
        let id = extract_video_id(url).unwrap_or_default();
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call::Download {
            id: id.clone(),
            template: destination_template.to_string(),
            user_agent: identity.user_agent.clone(),
        });
        if let Some((cancel_id, token)) = &script.cancel_on_download {
            if *cancel_id == id {
                token.cancel();
            }
        }
        match script
            .download_failures
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
        {
            Some(message) => Err(BackendError::new(message)),
            None => Ok(()),
        }
    }
}

pub fn item(id: &str) -> DownloadItem {
    DownloadItem::from_link(
        &format!("https://www.tiktok.com/@user/video/{id}"),
        ExportKind::Liked,
    )
    .unwrap()
}

pub fn items(ids: &[&str]) -> Vec<DownloadItem> {
    ids.iter().map(|id| item(id)).collect()
}

pub fn numbered_items(count: usize) -> Vec<DownloadItem> {
    (1..=count).map(|n| item(&n.to_string())).collect()
}

pub fn identity_config() -> IdentityConfig {
    IdentityConfig {
        user_agents: USER_AGENTS.iter().map(ToString::to_string).collect(),
        ..IdentityConfig::default()
    }
}

/// Engine with default pacing, an in-memory identity, and the given budget.
pub fn engine_with_budget<R: HistoryRepository>(
    backend: &ScriptedBackend,
    store: R,
    archive_dir: &Path,
    capacity_bytes: u64,
) -> ArchiveEngine<ScriptedBackend, R> {
    ArchiveEngine::new(
        backend.clone(),
        store,
        ThrottleController::new(PacingConfig::default(), Arc::new(TokioClock)),
        IdentityRotator::in_memory(&identity_config()),
        DiskBudget::new(archive_dir, capacity_bytes),
    )
}

/// Engine with an effectively unlimited budget.
pub fn engine<R: HistoryRepository>(
    backend: &ScriptedBackend,
    store: R,
    archive_dir: &Path,
) -> ArchiveEngine<ScriptedBackend, R> {
    engine_with_budget(backend, store, archive_dir, u64::MAX)
}
