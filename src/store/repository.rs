//! Repository seam for idempotency history and metadata persistence.
//!
//! The engine depends only on [`HistoryRepository`]; the JSON file store and
//! the in-memory store are interchangeable behind it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::StoreError;
use crate::backend::VideoMetadata;

/// Data-access contract for completed items.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Whether `id` has already been archived.
    fn contains(&self, id: &str) -> bool;

    /// Number of archived ids.
    fn len(&self) -> usize;

    /// Whether nothing has been archived yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records `metadata.id` as archived. Returns `false` when it already was.
    fn add(&mut self, metadata: VideoMetadata) -> bool;

    /// Flushes history and metadata to durable storage.
    async fn save(&self) -> Result<(), StoreError>;
}

/// Volatile store for tests and dry runs.
///
/// Clones share the save counter and failure switch so a test can keep a
/// handle after moving the store into the engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    ids: HashSet<String>,
    metadata: HashMap<String, VideoMetadata>,
    saves: Arc<AtomicUsize>,
    fail_saves: Arc<AtomicBool>,
}

impl MemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates history with `ids`.
    #[must_use]
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Number of successful [`save`](HistoryRepository::save) calls.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes subsequent saves fail with a write error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn metadata(&self, id: &str) -> Option<&VideoMetadata> {
        self.metadata.get(id)
    }
}

#[async_trait]
impl HistoryRepository for MemoryHistoryStore {
    fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn add(&mut self, metadata: VideoMetadata) -> bool {
        let inserted = self.ids.insert(metadata.id.clone());
        self.metadata.insert(metadata.id.clone(), metadata);
        inserted
    }

    async fn save(&self) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::write(
                "memory",
                std::io::Error::other("simulated write failure"),
            ));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
