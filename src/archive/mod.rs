//! Disk budget for the archive directory.
//!
//! The budget is checked before every download: current usage plus the size
//! the extractor reported must fit under the configured capacity.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, trace};

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

/// The archive would outgrow its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "not enough disk budget: {} used + {} incoming exceeds {} capacity",
    format_size(*usage),
    format_size(*incoming),
    format_size(*capacity)
)]
pub struct DiskExhausted {
    pub usage: u64,
    pub incoming: u64,
    pub capacity: u64,
}

/// Capacity limit for one archive directory.
#[derive(Debug, Clone)]
pub struct DiskBudget {
    archive_dir: PathBuf,
    capacity_bytes: u64,
}

impl DiskBudget {
    #[must_use]
    pub fn new(archive_dir: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            capacity_bytes,
        }
    }

    #[must_use]
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    #[must_use]
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Total size of regular files under the archive directory. Symlinks are
    /// not followed and a missing directory counts as empty.
    #[must_use]
    pub fn usage(&self) -> u64 {
        dir_size(&self.archive_dir)
    }

    /// Fails when `incoming` more bytes would exceed capacity.
    ///
    /// # Errors
    ///
    /// Returns [`DiskExhausted`] with the figures that tripped the gate.
    pub fn check(&self, incoming: u64) -> Result<u64, DiskExhausted> {
        let usage = self.usage();
        debug!(
            usage = %format_size(usage),
            incoming = %format_size(incoming),
            capacity = %format_size(self.capacity_bytes),
            "checking disk budget"
        );
        if usage.saturating_add(incoming) > self.capacity_bytes {
            return Err(DiskExhausted {
                usage,
                incoming,
                capacity: self.capacity_bytes,
            });
        }
        Ok(usage)
    }
}

fn dir_size(path: &Path) -> u64 {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(error) => {
            if error.kind() != ErrorKind::NotFound {
                debug!(path = %path.display(), error = %error, "skipping unreadable directory");
            }
            return 0;
        }
    };

    let mut total: u64 = 0;
    for entry in entries.flatten() {
        let Ok(metadata) = fs::symlink_metadata(entry.path()) else {
            continue;
        };
        if metadata.is_file() {
            total = total.saturating_add(metadata.len());
        } else if metadata.is_dir() {
            total = total.saturating_add(dir_size(&entry.path()));
        } else {
            trace!(path = %entry.path().display(), "skipping non-regular entry");
        }
    }
    total
}

/// Renders a byte count with two decimals, e.g. `1.50 GB`.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.00 MB");
        assert_eq!(format_size(500 * 1024 * 1024 * 1024), "500.00 GB");
        assert_eq!(format_size(3 * 1024_u64.pow(5)), "3072.00 TB");
    }

    #[test]
    fn test_usage_sums_nested_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.mp4"), vec![0u8; 100]).unwrap();
        fs::create_dir(temp.path().join("liked_videos")).unwrap();
        fs::write(temp.path().join("liked_videos").join("b.mp4"), vec![0u8; 50]).unwrap();
        assert_eq!(DiskBudget::new(temp.path(), 1000).usage(), 150);
    }

    #[cfg(unix)]
    #[test]
    fn test_usage_skips_symlinks() {
        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("big.bin"), vec![0u8; 4096]).unwrap();
        std::os::unix::fs::symlink(outside.path().join("big.bin"), temp.path().join("link")).unwrap();
        assert_eq!(DiskBudget::new(temp.path(), 1).usage(), 0);
    }

    #[test]
    fn test_missing_dir_counts_as_empty() {
        let temp = TempDir::new().unwrap();
        let budget = DiskBudget::new(temp.path().join("absent"), 10);
        assert_eq!(budget.usage(), 0);
        assert_eq!(budget.check(10).unwrap(), 0);
    }

    #[test]
    fn test_check_rejects_over_capacity() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.mp4"), vec![0u8; 60]).unwrap();
        let budget = DiskBudget::new(temp.path(), 100);
        assert!(budget.check(40).is_ok());
        let err = budget.check(41).unwrap_err();
        assert_eq!(
            err,
            DiskExhausted {
                usage: 60,
                incoming: 41,
                capacity: 100
            }
        );
        assert!(err.to_string().contains("exceeds"));
    }
}
