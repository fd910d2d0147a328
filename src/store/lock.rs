//! Single-writer guard for a state directory.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::StoreError;

const LOCK_FILE_NAME: &str = ".archiver.lock";

/// Exclusive advisory lock on `<state_dir>/.archiver.lock`, released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Takes the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] when another process holds the lock, or
    /// an I/O error when the lock file cannot be created.
    pub fn acquire(state_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(state_dir).map_err(|source| StoreError::write(state_dir, source))?;
        let path = state_dir.join(LOCK_FILE_NAME);
        let file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| StoreError::write(&path, source))?;

        if FileExt::try_lock_exclusive(&file).is_err() {
            return Err(StoreError::Locked {
                path: state_dir.to_path_buf(),
            });
        }

        debug!(path = %path.display(), "acquired state lock");
        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
