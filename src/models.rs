//! Data models for the scheduling-state store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of review-log entries retained per record.
/// Oldest entries are dropped first when the cap is exceeded.
pub const MAX_HISTORY: usize = 20;

/// Where a card sits in the spaced-repetition lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardPhase {
    /// Never reviewed
    New,
    /// In initial learning steps
    Learning,
    /// Regular spaced review
    Review,
    /// Failed and re-learning
    Relearning,
}

impl Default for CardPhase {
    fn default() -> Self {
        Self::New
    }
}

/// One compact entry in a record's review history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLogEntry {
    /// When the review occurred
    pub timestamp: DateTime<Utc>,
    /// Rating given by the reviewer (1-4)
    pub rating: u8,
    /// Scheduled interval in days at the time of the review
    pub scheduled_days_at_review: f64,
    /// Days elapsed since the previous review
    pub elapsed_days: f64,
}

/// Scheduling state for a single flashcard.
///
/// The record is the unit of storage: created on first `set`, replaced whole
/// by later `set` calls, removed by `delete`. The scheduling algorithm that
/// produces new field values from a rating lives outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    /// Opaque unique identifier, expected to be UUID/hex-like. The first two
    /// characters decide which shard the record lives in.
    pub id: String,
    /// When the card is next due for review
    pub due: DateTime<Utc>,
    /// Memory stability parameter
    #[serde(default)]
    pub stability: f64,
    /// Memory difficulty parameter
    #[serde(default)]
    pub difficulty: f64,
    /// Total number of reviews
    #[serde(default)]
    pub reps: u32,
    /// Number of lapses (failed reviews out of the review phase)
    #[serde(default)]
    pub lapses: u32,
    /// Current lifecycle phase
    #[serde(default, rename = "state")]
    pub phase: CardPhase,
    /// Most recent review, if the card has ever been reviewed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_review: Option<DateTime<Utc>>,
    /// Current scheduled interval in days
    #[serde(default)]
    pub scheduled_days: f64,
    /// Position within the learning steps
    #[serde(default)]
    pub learning_step: u32,
    /// Suspended cards are excluded from review queues
    #[serde(default)]
    pub suspended: bool,
    /// Buried cards are excluded from review until this time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buried_until: Option<DateTime<Utc>>,
    /// Most recent reviews, newest last, capped at [`MAX_HISTORY`]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ReviewLogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ScheduleRecord {
    /// Create a fresh, never-reviewed record due immediately
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            due: now,
            stability: 0.0,
            difficulty: 0.0,
            reps: 0,
            lapses: 0,
            phase: CardPhase::New,
            last_review: None,
            scheduled_days: 0.0,
            learning_step: 0,
            suspended: false,
            buried_until: None,
            history: Vec::new(),
            created_at: Some(now),
        }
    }

    /// Drop oldest history entries until at most [`MAX_HISTORY`] remain
    pub fn trim_history(&mut self) {
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }

    /// Check whether the card should appear in a review queue right now
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.suspended {
            return false;
        }
        if let Some(buried) = self.buried_until {
            if buried > now {
                return false;
            }
        }
        self.due <= now
    }
}

/// Counters reported by a merge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Records adopted from disk that were absent from memory
    pub merged: usize,
    /// Records where the disk copy replaced the in-memory copy
    pub conflicts: usize,
}

/// Snapshot of store contents, for dashboards and sanity checks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_records: usize,
    pub new_cards: usize,
    pub learning_cards: usize,
    pub review_cards: usize,
    pub relearning_cards: usize,
    pub due_cards: usize,
    pub suspended_cards: usize,
    pub dirty_shards: usize,
}
