//! Durable archiver state: idempotency history, per-item metadata, and the
//! state-directory lock.
//!
//! Every write goes through a temporary file that is atomically renamed over
//! the target, so an interrupted run never leaves a truncated store.

mod atomic;
mod error;
mod json;
mod lock;
mod repository;

pub(crate) use atomic::write_json_atomic;
pub use error::StoreError;
pub use json::JsonHistoryStore;
pub use lock::StateLock;
pub use repository::{HistoryRepository, MemoryHistoryStore};
