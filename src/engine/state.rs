//! Per-item workflow states.

use std::fmt;

use serde::Serialize;

/// Where an item is in its workflow.
///
/// `Pending → MetadataFetching → {MetadataOk | MetadataFailed} → DiskCheck →
/// Downloading → {Success | Failed}`. `Success` and `Failed` are terminal;
/// `MetadataFailed` leads straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Pending,
    MetadataFetching,
    MetadataOk,
    MetadataFailed,
    DiskCheck,
    Downloading,
    Success,
    Failed,
}

impl ItemState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::MetadataFetching => "metadata_fetching",
            Self::MetadataOk => "metadata_ok",
            Self::MetadataFailed => "metadata_failed",
            Self::DiskCheck => "disk_check",
            Self::Downloading => "downloading",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_success_and_failed_are_terminal() {
        assert!(ItemState::Success.is_terminal());
        assert!(ItemState::Failed.is_terminal());
        assert!(!ItemState::MetadataFailed.is_terminal());
        assert!(!ItemState::Downloading.is_terminal());
    }

    #[test]
    fn test_display_uses_snake_case_label() {
        assert_eq!(ItemState::DiskCheck.to_string(), "disk_check");
    }
}
