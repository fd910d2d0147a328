//! JSON file implementation of [`HistoryRepository`].
//!
//! History is a JSON array of ids shared by every export kind; metadata is a
//! JSON object keyed by id, one file per kind. Both are rewritten atomically
//! on every save.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use super::atomic::write_json_atomic;
use super::{HistoryRepository, StoreError};
use crate::backend::VideoMetadata;

/// History and metadata backed by two JSON files.
#[derive(Debug)]
pub struct JsonHistoryStore {
    history_path: PathBuf,
    metadata_path: PathBuf,
    ids: BTreeSet<String>,
    metadata: BTreeMap<String, VideoMetadata>,
}

impl JsonHistoryStore {
    /// Loads both files. Missing files start empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] for unreadable files and
    /// [`StoreError::Corrupt`] for files that are not the expected JSON.
    #[instrument(skip_all, fields(history = %history_path.display()))]
    pub fn open(history_path: &Path, metadata_path: &Path) -> Result<Self, StoreError> {
        let ids: BTreeSet<String> = read_json_or_default(history_path)?;
        let metadata: BTreeMap<String, VideoMetadata> = read_json_or_default(metadata_path)?;
        info!(
            archived = ids.len(),
            metadata_records = metadata.len(),
            "loaded download history"
        );
        Ok(Self {
            history_path: history_path.to_path_buf(),
            metadata_path: metadata_path.to_path_buf(),
            ids,
            metadata,
        })
    }

    #[must_use]
    pub fn metadata(&self, id: &str) -> Option<&VideoMetadata> {
        self.metadata.get(id)
    }
}

#[async_trait]
impl HistoryRepository for JsonHistoryStore {
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
        let history_path = self.history_path.clone();
        let metadata_path = self.metadata_path.clone();
        let ids: Vec<String> = self.ids.iter().cloned().collect();
        let metadata = self.metadata.clone();

        // History is the idempotency marker, so it is committed last.
        tokio::task::spawn_blocking(move || {
            write_json_atomic(&metadata_path, &metadata)?;
            write_json_atomic(&history_path, &ids)
        })
        .await
        .map_err(|error| StoreError::Task(error.to_string()))??;

        debug!(archived = self.ids.len(), "flushed download history");
        Ok(())
    }
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(error) => return Err(StoreError::read(path, error)),
    };
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}
