//! Clip Archiver Core Library
//!
//! Paced, resumable archiving of the videos referenced by a personal data
//! export. The remote service enforces an unannounced rate limit, so requests
//! run one at a time and the gap between them adapts to what the service
//! tells us.
//!
//! # Architecture
//!
//! - [`export`] - Reads work items out of the data export
//! - [`failure`] - Classifies backend error text into typed failure kinds
//! - [`pacing`] - Adaptive delay control loop between items
//! - [`identity`] - Outbound identity (user agent, headers, cookies) and rotation
//! - [`backend`] - Boundary to the external extraction tool
//! - [`store`] - Durable idempotency history and metadata
//! - [`archive`] - Disk budget for the archive directory
//! - [`engine`] - Sequential per-item workflow and batch driver
//! - [`config`] - TOML configuration with defaults

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod backend;
pub mod config;
pub mod engine;
pub mod export;
pub mod failure;
pub mod identity;
pub mod pacing;
pub mod store;

// Re-export commonly used types
pub use archive::{DiskBudget, DiskExhausted};
pub use backend::{BackendError, FetchedMetadata, MediaBackend, VideoMetadata, YtDlpBackend};
pub use config::ArchiverConfig;
pub use engine::{ArchiveEngine, BatchSummary, ItemOutcome, PacingDecision, StopReason};
pub use export::{DownloadItem, ExportKind, parse_export, read_export};
pub use failure::{FailureKind, FailureSignal, classify};
pub use identity::{IdentityProfile, IdentityRotator};
pub use pacing::{Clock, PacingOutcome, ThrottleController, TokioClock};
pub use store::{HistoryRepository, JsonHistoryStore, MemoryHistoryStore, StateLock};
