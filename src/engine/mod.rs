//! Sequential archive engine.
//!
//! [`ArchiveEngine`] drives one item at a time through
//! `Pending → MetadataFetching → DiskCheck → Downloading → Success | Failed`,
//! feeding every attempt outcome to the [`ThrottleController`] and waiting the
//! resulting delay before the next item. Exactly one request is in flight at
//! any moment; the pacing model depends on it.
//!
//! Cancellation is honored before every attempt and at every sleep. A full
//! archive stops the whole batch; any other per-item problem is logged,
//! counted, and the batch moves on.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use archiver_core::archive::DiskBudget;
//! use archiver_core::backend::YtDlpBackend;
//! use archiver_core::config::ArchiverConfig;
//! use archiver_core::engine::ArchiveEngine;
//! use archiver_core::identity::IdentityRotator;
//! use archiver_core::pacing::{ThrottleController, TokioClock};
//! use archiver_core::store::MemoryHistoryStore;
//!
//! # async fn example() {
//! let config = ArchiverConfig::default();
//! let mut engine = ArchiveEngine::new(
//!     YtDlpBackend::new(config.backend.clone()),
//!     MemoryHistoryStore::new(),
//!     ThrottleController::new(config.pacing.clone(), Arc::new(TokioClock)),
//!     IdentityRotator::in_memory(&config.identity),
//!     DiskBudget::new("downloads", config.storage.capacity_bytes),
//! );
//! let summary = engine.run_batch(Vec::new()).await;
//! assert_eq!(summary.attempted, 0);
//! # }
//! ```

mod error;
mod retry;
mod state;
mod summary;

use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::archive::{DiskBudget, format_size};
use crate::backend::{BackendError, MediaBackend, VideoMetadata};
use crate::config::RetryConfig;
use crate::export::DownloadItem;
use crate::failure::FailureKind;
use crate::identity::IdentityRotator;
use crate::pacing::{PacingOutcome, ThrottleController};
use crate::store::HistoryRepository;

pub use error::ItemError;
pub use retry::{DEFAULT_MAX_ATTEMPTS, RetryDecision, RetryPolicy};
pub use state::ItemState;
pub use summary::{
    BatchPlan, BatchSummary, ItemOutcome, ItemReport, PacingDecision, StopReason, plan_batch,
};

/// Default proactive rotation interval, in successful downloads.
const DEFAULT_ROTATE_EVERY: u64 = 10;

/// First local backoff of the download phase; metadata starts at 2s.
const DOWNLOAD_BACKOFF_BASE: Duration = Duration::from_secs(4);

/// Output template file name understood by the extractor.
const OUTPUT_FILE_TEMPLATE: &str = "%(id)s.%(ext)s";

/// Orchestrates fetch, disk gate, download, persistence, and pacing.
#[derive(Debug)]
pub struct ArchiveEngine<B, R> {
    backend: B,
    store: R,
    throttle: ThrottleController,
    identity: IdentityRotator,
    budget: DiskBudget,
    metadata_retry: RetryPolicy,
    download_retry: RetryPolicy,
    rotate_every: u64,
    cancel: CancellationToken,
    journal: Vec<PacingDecision>,
}

impl<B: MediaBackend, R: HistoryRepository> ArchiveEngine<B, R> {
    #[must_use]
    pub fn new(
        backend: B,
        store: R,
        throttle: ThrottleController,
        identity: IdentityRotator,
        budget: DiskBudget,
    ) -> Self {
        Self {
            backend,
            store,
            throttle,
            identity,
            budget,
            metadata_retry: RetryPolicy::default(),
            download_retry: RetryPolicy::default().with_base_delay(DOWNLOAD_BACKOFF_BASE),
            rotate_every: DEFAULT_ROTATE_EVERY,
            cancel: CancellationToken::new(),
            journal: Vec::new(),
        }
    }

    /// Applies per-phase attempt caps.
    #[must_use]
    pub fn with_retry(mut self, retry: &RetryConfig) -> Self {
        self.metadata_retry = RetryPolicy::with_max_attempts(retry.metadata_attempts);
        self.download_retry = RetryPolicy::with_max_attempts(retry.download_attempts)
            .with_base_delay(DOWNLOAD_BACKOFF_BASE);
        self
    }

    /// Rotates identity after every `every` successes; 0 disables.
    #[must_use]
    pub fn with_rotation_interval(mut self, every: u64) -> Self {
        self.rotate_every = every;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Every throttle update so far, oldest first.
    #[must_use]
    pub fn journal(&self) -> &[PacingDecision] {
        &self.journal
    }

    #[must_use]
    pub fn store(&self) -> &R {
        &self.store
    }

    #[must_use]
    pub fn throttle(&self) -> &ThrottleController {
        &self.throttle
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityRotator {
        &self.identity
    }

    /// Processes `items` strictly in order and returns the session summary.
    ///
    /// Never fails: per-item problems are counted, and batch-level stops are
    /// reported through [`BatchSummary::stop_reason`].
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn run_batch(&mut self, items: Vec<DownloadItem>) -> BatchSummary {
        let plan = plan_batch(items, &self.store);
        let mut summary = BatchSummary::from_plan(&plan);
        let total = plan.pending.len();

        info!(
            total_found = plan.total_found,
            duplicates = plan.duplicates,
            already_archived = plan.already_archived,
            pending = total,
            "starting batch"
        );

        for (index, item) in plan.pending.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.stop_reason = StopReason::Cancelled;
                summary.remaining = total - index;
                break;
            }

            info!(item_id = %item.id, position = index + 1, total, "processing item");
            summary.attempted += 1;

            let outcome = match self.process_item(item).await {
                Ok(outcome) => outcome,
                Err(ItemError::DiskExhausted(exhausted)) => {
                    error!(item_id = %item.id, error = %exhausted, "stopping batch");
                    summary.stop_reason = StopReason::DiskExhausted(exhausted);
                    summary.remaining = total - index;
                    break;
                }
                Err(ItemError::Cancelled) => {
                    warn!(item_id = %item.id, "cancelled during item");
                    summary.stop_reason = StopReason::Cancelled;
                    summary.remaining = total - index;
                    break;
                }
                Err(other) => {
                    error!(item_id = %item.id, error = %other, "unclassified error, continuing");
                    ItemOutcome::Failed {
                        kind: None,
                        reason: other.to_string(),
                    }
                }
            };

            match &outcome {
                ItemOutcome::Archived => summary.succeeded += 1,
                ItemOutcome::AlreadyArchived => summary.already_archived += 1,
                ItemOutcome::Failed { .. } => summary.failed += 1,
            }

            let paced_delay =
                (outcome != ItemOutcome::AlreadyArchived).then(|| self.throttle.current_delay());
            summary.items.push(ItemReport {
                id: item.id.clone(),
                outcome,
                paced_delay,
            });

            if let Some(delay) = paced_delay {
                debug!(item_id = %item.id, delay_secs = delay.as_secs_f64(), "pacing before next item");
                if self.sleep(delay).await.is_err() {
                    summary.stop_reason = StopReason::Cancelled;
                    summary.remaining = total - index - 1;
                    break;
                }
            }
        }

        let stats = self.throttle.stats();
        summary.rate_limit_hits = stats.rate_limit_hits;
        summary.identity_rotations = self.identity.rotations();

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            rate_limit_hits = summary.rate_limit_hits,
            identity_rotations = summary.identity_rotations,
            remaining = summary.remaining,
            final_delay_secs = stats.current_delay_secs,
            stop_reason = ?summary.stop_reason,
            "batch finished"
        );
        summary
    }

    /// Runs the full workflow for one item.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::DiskExhausted`] and [`ItemError::Cancelled`] for
    /// batch-level stops, and [`ItemError::Store`] when the success could not
    /// be persisted. Backend failures are reported as
    /// [`ItemOutcome::Failed`], not as errors.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn process_item(&mut self, item: &DownloadItem) -> Result<ItemOutcome, ItemError> {
        if self.store.contains(&item.id) {
            info!("already archived, skipping");
            return Ok(ItemOutcome::AlreadyArchived);
        }
        transition(item, ItemState::Pending);

        transition(item, ItemState::MetadataFetching);
        let mut metadata = match self.fetch_metadata(item).await? {
            Ok(metadata) => {
                transition(item, ItemState::MetadataOk);
                metadata
            }
            Err(failure) => {
                transition(item, ItemState::MetadataFailed);
                self.record(item, PacingOutcome::Failure(FailureKind::ContentInvalid));
                transition(item, ItemState::Failed);
                return Ok(ItemOutcome::Failed {
                    kind: Some(failure.kind()),
                    reason: failure.message().to_string(),
                });
            }
        };
        if metadata.id != item.id {
            debug!(reported = %metadata.id, "extractor reported a different id, keeping export id");
            metadata.id.clone_from(&item.id);
        }

        transition(item, ItemState::DiskCheck);
        let usage = self.budget.check(metadata.filesize)?;
        debug!(
            usage = %format_size(usage),
            filesize = %format_size(metadata.filesize),
            "disk budget ok"
        );

        transition(item, ItemState::Downloading);
        if let Err(failure) = self.download(item).await? {
            transition(item, ItemState::Failed);
            return Ok(ItemOutcome::Failed {
                kind: Some(failure.kind()),
                reason: failure.message().to_string(),
            });
        }

        self.record(item, PacingOutcome::Success);
        let filesize = metadata.filesize;
        self.store.add(metadata);
        self.store.save().await?;
        transition(item, ItemState::Success);
        info!(size = %format_size(filesize), "archived");

        let successes = self.throttle.state().success_count();
        if self.rotate_every > 0 && successes % self.rotate_every == 0 {
            self.rotate_identity("periodic rotation");
        }

        Ok(ItemOutcome::Archived)
    }

    /// Metadata phase with local retries. The outer `Result` carries
    /// batch-level stops; the inner one the final backend failure.
    async fn fetch_metadata(
        &mut self,
        item: &DownloadItem,
    ) -> Result<Result<VideoMetadata, BackendError>, ItemError> {
        let policy = self.metadata_retry.clone();
        let mut attempt = 1;
        loop {
            self.ensure_active()?;
            debug!(item_id = %item.id, attempt, "fetching metadata");

            let failure = match self
                .backend
                .fetch_metadata(&item.url, self.identity.current())
                .await
            {
                Ok(fetched) => {
                    self.absorb(&fetched.response_headers);
                    return Ok(Ok(fetched.metadata));
                }
                Err(failure) => failure,
            };

            warn!(
                item_id = %item.id,
                attempt,
                kind = %failure.kind(),
                error = %failure.message(),
                "metadata attempt failed"
            );
            match self.after_failure(item, &failure, &policy, attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    self.sleep(delay).await?;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(item_id = %item.id, reason = %reason, "giving up on metadata");
                    return Ok(Err(failure));
                }
            }
        }
    }

    /// Download phase with local retries; same result shape as
    /// [`fetch_metadata`](Self::fetch_metadata).
    async fn download(
        &mut self,
        item: &DownloadItem,
    ) -> Result<Result<(), BackendError>, ItemError> {
        let template = self.destination_template(item);
        let policy = self.download_retry.clone();
        let mut attempt = 1;
        loop {
            self.ensure_active()?;
            debug!(item_id = %item.id, attempt, template = %template, "downloading");

            let failure = match self
                .backend
                .download(&item.url, &template, self.identity.current())
                .await
            {
                Ok(()) => return Ok(Ok(())),
                Err(failure) => failure,
            };

            warn!(
                item_id = %item.id,
                attempt,
                kind = %failure.kind(),
                error = %failure.message(),
                "download attempt failed"
            );
            match self.after_failure(item, &failure, &policy, attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    self.sleep(delay).await?;
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(item_id = %item.id, reason = %reason, "giving up on download");
                    return Ok(Err(failure));
                }
            }
        }
    }

    /// Feeds a failed attempt to the throttle and asks `policy` what to do
    /// next. Identity rotates only when the failure points at it and another
    /// attempt follows.
    fn after_failure(
        &mut self,
        item: &DownloadItem,
        failure: &BackendError,
        policy: &RetryPolicy,
        attempt: u32,
    ) -> RetryDecision {
        self.record(item, PacingOutcome::Failure(failure.kind()));
        let decision = policy.should_retry(failure.kind(), attempt);
        if failure.rotate_identity() && matches!(decision, RetryDecision::Retry { .. }) {
            self.rotate_identity("identity rejected");
        }
        decision
    }

    fn record(&mut self, item: &DownloadItem, outcome: PacingOutcome) -> Duration {
        let previous_delay = self.throttle.current_delay();
        let next_delay = self.throttle.record(outcome);
        let state = self.throttle.state();
        info!(
            item_id = %item.id,
            outcome = ?outcome,
            previous_delay_secs = previous_delay.as_secs_f64(),
            next_delay_secs = next_delay.as_secs_f64(),
            consecutive_successes = state.consecutive_successes(),
            consecutive_failures = state.consecutive_failures(),
            "pacing decision"
        );
        self.journal.push(PacingDecision {
            item_id: item.id.clone(),
            outcome,
            previous_delay,
            next_delay,
        });
        next_delay
    }

    fn rotate_identity(&mut self, reason: &str) {
        match self.identity.rotate() {
            Ok(profile) => info!(reason, user_agent = %profile.user_agent, "identity rotated"),
            Err(error) => warn!(reason, error = %error, "identity rotated but not persisted"),
        }
    }

    fn absorb(&mut self, headers: &HeaderMap) {
        if headers.is_empty() {
            return;
        }
        if let Err(error) = self.identity.absorb(headers) {
            warn!(error = %error, "could not persist absorbed session data");
        }
    }

    fn destination_template(&self, item: &DownloadItem) -> String {
        self.budget
            .archive_dir()
            .join(item.kind.archive_subdir())
            .join(OUTPUT_FILE_TEMPLATE)
            .to_string_lossy()
            .into_owned()
    }

    fn ensure_active(&self) -> Result<(), ItemError> {
        if self.cancel.is_cancelled() {
            return Err(ItemError::Cancelled);
        }
        Ok(())
    }

    async fn sleep(&self, delay: Duration) -> Result<(), ItemError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(ItemError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

fn transition(item: &DownloadItem, state: ItemState) {
    info!(item_id = %item.id, state = %state, "state transition");
}
