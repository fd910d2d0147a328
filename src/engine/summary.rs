//! Batch planning, per-item reports, and the end-of-run summary.

use std::collections::HashSet;
use std::time::Duration;

use crate::archive::DiskExhausted;
use crate::export::DownloadItem;
use crate::failure::FailureKind;
use crate::pacing::PacingOutcome;
use crate::store::HistoryRepository;

/// One throttle update, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingDecision {
    pub item_id: String,
    pub outcome: PacingOutcome,
    pub previous_delay: Duration,
    pub next_delay: Duration,
}

impl PacingDecision {
    /// A rate-limit signal that doubled the delay.
    #[must_use]
    pub fn is_doubling(&self) -> bool {
        self.outcome == PacingOutcome::Failure(FailureKind::RateLimited)
            && self.next_delay == self.previous_delay * 2
    }
}

/// How a processed item ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Downloaded and recorded in history.
    Archived,
    /// Already in history; nothing was sent.
    AlreadyArchived,
    /// Gave up on the item. `kind` is `None` for unclassified errors.
    Failed {
        kind: Option<FailureKind>,
        reason: String,
    },
}

/// Result for one item of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub id: String,
    pub outcome: ItemOutcome,
    /// Pacing wait applied after the item, when one was started.
    pub paced_delay: Option<Duration>,
}

/// Why the batch loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Cancelled,
    DiskExhausted(DiskExhausted),
}

/// Work left after de-duplication and the history check.
#[derive(Debug, Clone, Default)]
pub struct BatchPlan {
    /// Distinct ids in the input.
    pub total_found: usize,
    /// Repeated ids dropped from the input.
    pub duplicates: usize,
    /// Distinct ids already in history.
    pub already_archived: usize,
    /// Items to process, in input order.
    pub pending: Vec<DownloadItem>,
}

/// Builds the id → item mapping (first occurrence wins) and drops ids
/// already present in `store`.
#[must_use]
pub fn plan_batch<R: HistoryRepository + ?Sized>(items: Vec<DownloadItem>, store: &R) -> BatchPlan {
    let mut seen = HashSet::new();
    let mut plan = BatchPlan::default();
    for item in items {
        if !seen.insert(item.id.clone()) {
            plan.duplicates += 1;
            continue;
        }
        if store.contains(&item.id) {
            plan.already_archived += 1;
            continue;
        }
        plan.pending.push(item);
    }
    plan.total_found = seen.len();
    plan
}

/// Session counts reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total_found: usize,
    pub duplicates: usize,
    pub already_archived: usize,
    /// Items whose processing started.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Pending items left unfinished because the batch stopped early.
    pub remaining: usize,
    pub rate_limit_hits: u64,
    pub identity_rotations: u64,
    pub stop_reason: StopReason,
    pub items: Vec<ItemReport>,
}

impl BatchSummary {
    #[must_use]
    pub fn from_plan(plan: &BatchPlan) -> Self {
        Self {
            total_found: plan.total_found,
            duplicates: plan.duplicates,
            already_archived: plan.already_archived,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            remaining: 0,
            rate_limit_hits: 0,
            identity_rotations: 0,
            stop_reason: StopReason::Completed,
            items: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stop_reason == StopReason::Completed
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self.stop_reason {
            StopReason::Completed => 0,
            StopReason::DiskExhausted(_) => 2,
            StopReason::Cancelled => 130,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::export::ExportKind;
    use crate::store::MemoryHistoryStore;

    fn item(id: &str) -> DownloadItem {
        DownloadItem::from_link(&format!("https://www.tiktok.com/@a/video/{id}"), ExportKind::Liked)
            .unwrap()
    }

    #[test]
    fn test_plan_drops_duplicates_and_archived() {
        let store = MemoryHistoryStore::with_ids(["2"]);
        let plan = plan_batch(vec![item("1"), item("2"), item("1"), item("3")], &store);
        assert_eq!(plan.total_found, 3);
        assert_eq!(plan.duplicates, 1);
        assert_eq!(plan.already_archived, 1);
        let ids: Vec<&str> = plan.pending.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_doubling_detection() {
        let decision = PacingDecision {
            item_id: "1".into(),
            outcome: PacingOutcome::Failure(FailureKind::RateLimited),
            previous_delay: Duration::from_secs(4),
            next_delay: Duration::from_secs(8),
        };
        assert!(decision.is_doubling());

        let capped = PacingDecision {
            next_delay: Duration::from_secs(30),
            previous_delay: Duration::from_secs(20),
            ..decision
        };
        assert!(!capped.is_doubling());
    }

    #[test]
    fn test_exit_codes() {
        let mut summary = BatchSummary::from_plan(&BatchPlan::default());
        assert_eq!(summary.exit_code(), 0);
        summary.stop_reason = StopReason::Cancelled;
        assert_eq!(summary.exit_code(), 130);
        summary.stop_reason = StopReason::DiskExhausted(DiskExhausted {
            usage: 1,
            incoming: 1,
            capacity: 1,
        });
        assert_eq!(summary.exit_code(), 2);
        assert!(!summary.is_complete());
    }
}
