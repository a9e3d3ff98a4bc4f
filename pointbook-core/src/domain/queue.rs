//! Submission queue state
//!
//! A batch run is an owned [`QueueRunState`]: the caller passes it into the
//! queue, gets it back when the run ends or pauses, and may persist it in
//! between. Nothing about a run lives in globals.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::submission::SubmissionPayload;

/// Per-item lifecycle inside a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Processing,
    Succeeded,
    Failed,
    /// Redundant with an earlier item of the same batch; never processed
    Skipped,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Processing => "processing",
            ItemStatus::Succeeded => "succeeded",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Succeeded | ItemStatus::Failed | ItemStatus::Skipped
        )
    }
}

/// What processing an item produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub submission_id: Option<Uuid>,
    pub transaction_id: Option<Uuid>,
    pub points_awarded: i64,
    /// True when the award was confirmed in the same call chain
    pub auto_confirmed: bool,
    /// Duplicate and location notices (non-blocking)
    #[serde(default)]
    pub notices: Vec<String>,
}

/// One element of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionItem {
    pub payload: SubmissionPayload,
    pub status: ItemStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub outcome: Option<ItemOutcome>,
}

impl SubmissionItem {
    pub fn new(payload: SubmissionPayload) -> Self {
        Self {
            payload,
            status: ItemStatus::Queued,
            error: None,
            outcome: None,
        }
    }

    pub(crate) fn succeed(&mut self, outcome: ItemOutcome) {
        self.status = ItemStatus::Succeeded;
        self.error = None;
        self.outcome = Some(outcome);
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        self.status = ItemStatus::Failed;
        self.error = Some(error.into());
    }
}

/// Resumable state of one batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRunState {
    pub run_id: Uuid,
    pub items: Vec<SubmissionItem>,
    /// Index of the next item to process
    pub current_index: usize,
    /// Set when the last run halted on the pause flag
    pub paused: bool,
}

impl QueueRunState {
    /// Build a run, marking in-batch repeats as Skipped up front
    pub fn new(payloads: Vec<SubmissionPayload>) -> Self {
        let mut seen = HashSet::new();
        let items = payloads
            .into_iter()
            .map(|payload| {
                let mut item = SubmissionItem::new(payload);
                if !seen.insert(item.payload.fingerprint()) {
                    item.status = ItemStatus::Skipped;
                    item.error = Some("Duplicate of an earlier item in this batch".to_string());
                }
                item
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            items,
            current_index: 0,
            paused: false,
        }
    }

    /// A run with a single submission
    pub fn single(payload: SubmissionPayload) -> Self {
        Self::new(vec![payload])
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// True once every item has reached a terminal status
    pub fn is_finished(&self) -> bool {
        self.current_index >= self.items.len()
            && self.items.iter().all(|i| i.status.is_terminal())
    }

    /// Count items per status
    pub fn summary(&self) -> QueueSummary {
        let mut summary = QueueSummary {
            run_id: self.run_id,
            total: self.items.len(),
            ..QueueSummary::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Queued | ItemStatus::Processing => summary.queued += 1,
                ItemStatus::Succeeded => summary.succeeded += 1,
                ItemStatus::Failed => summary.failed += 1,
                ItemStatus::Skipped => summary.skipped += 1,
            }
            if let Some(outcome) = &item.outcome {
                summary.points_awarded += outcome.points_awarded;
            }
        }
        summary.paused = self.paused;
        summary
    }

    /// Serialize for persistence between runs
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Granular per-run counts (a run never fails as a whole)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub queued: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub points_awarded: i64,
    pub paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(product: &str, price: i64) -> SubmissionPayload {
        SubmissionPayload::new("user-1", product, "S1", price)
    }

    #[test]
    fn test_in_batch_repeats_are_skipped() {
        let state = QueueRunState::new(vec![
            payload("1234567", 9990),
            payload("1234567", 9990),
            payload("1234567", 8990),
        ]);
        assert_eq!(state.items[0].status, ItemStatus::Queued);
        assert_eq!(state.items[1].status, ItemStatus::Skipped);
        assert_eq!(state.items[2].status, ItemStatus::Queued);

        let summary = state.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.queued, 2);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_state_survives_json() {
        let mut state = QueueRunState::new(vec![payload("1", 10), payload("2", 20)]);
        state.items[0].succeed(ItemOutcome {
            points_awarded: 5,
            auto_confirmed: true,
            ..ItemOutcome::default()
        });
        state.current_index = 1;
        state.paused = true;

        let restored = QueueRunState::from_json(&state.to_json().unwrap()).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.summary().points_awarded, 5);
    }

    #[test]
    fn test_finished_requires_terminal_items() {
        let mut state = QueueRunState::single(payload("1", 10));
        assert!(!state.is_finished());
        state.items[0].fail("boom");
        state.current_index = 1;
        assert!(state.is_finished());
    }
}
