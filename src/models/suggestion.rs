use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::event::{EventMove, TimeRange};
use crate::models::intent::PriorityTier;

/// A proposed, not yet committed interval for the new event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSlot {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl CandidateSlot {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self { start_at, end_at }
    }

    pub fn interval(&self) -> TimeRange {
        TimeRange::new(self.start_at, self.end_at)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ConflictSeverity {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub event_id: String,
    pub event_title: String,
    pub event_start_at: DateTime<Utc>,
    pub event_end_at: DateTime<Utc>,
    pub severity: ConflictSeverity,
    pub movable: bool,
    pub priority: PriorityTier,
    /// Set when the event sits on an attendee's calendar rather than the owner's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendee_id: Option<String>,
}

impl ConflictInfo {
    pub fn is_hard(&self) -> bool {
        self.severity == ConflictSeverity::Hard
    }

    pub fn is_attendee(&self) -> bool {
        self.attendee_id.is_some()
    }

    /// A hard overlap with an owner event that can never be relocated.
    pub fn blocks_outright(&self) -> bool {
        self.is_hard() && !self.movable && !self.is_attendee()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub availability: f64,
    pub preference: f64,
    pub attendee: f64,
    pub disruption: f64,
    pub buffer: f64,
    pub composite: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum QualityTier {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityTier {
    pub fn label(self) -> &'static str {
        match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Fair => "fair",
            QualityTier::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedSlot {
    pub slot: CandidateSlot,
    pub scores: ScoreBreakdown,
    pub composite_score: u8,
    pub tier: QualityTier,
    #[serde(default)]
    pub conflicts: Vec<ConflictInfo>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub reason: String,
    #[serde(default)]
    pub proposed_moves: Option<Vec<EventMove>>,
}

impl SuggestedSlot {
    pub fn hard_conflict_count(&self) -> usize {
        self.conflicts.iter().filter(|c| c.is_hard()).count()
    }
}

/// Caller-tunable knobs for a ranking request. Unset fields fall back to settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RankOptions {
    #[serde(default)]
    pub search_window_days: Option<i64>,
    #[serde(default)]
    pub min_score: Option<u8>,
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Fail with `NoAcceptableSlot` instead of returning the best below-threshold slots.
    #[serde(default)]
    pub strict_threshold: bool,
    /// Let `schedule_best` relocate movable events when committing the top slot.
    #[serde(default)]
    pub auto_resolve: bool,
    /// Attach a resolution plan to every returned slot that has conflicts.
    #[serde(default)]
    pub plan_moves: bool,
    #[serde(default)]
    pub reference_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SchedulingStage {
    Received,
    Generated,
    Scored,
    AwaitingSelection,
    AutoSelectedTop,
    Resolving,
    Resolved,
    Failed,
    Committed,
    Rejected,
}

impl SchedulingStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, SchedulingStage::Committed | SchedulingStage::Rejected)
    }

    pub fn can_transition_to(self, next: SchedulingStage) -> bool {
        use SchedulingStage::*;
        if next == Rejected {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Received, Generated)
                | (Generated, Scored)
                | (Scored, AwaitingSelection)
                | (Scored, AutoSelectedTop)
                | (AwaitingSelection, Resolving)
                | (AwaitingSelection, Committed)
                | (AutoSelectedTop, Resolving)
                | (AutoSelectedTop, Committed)
                | (Resolving, Resolved)
                | (Resolving, Failed)
                | (Resolved, Committed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResult {
    pub success: bool,
    pub event_id: Option<String>,
    #[serde(default)]
    pub applied_moves: Vec<EventMove>,
    pub message: String,
    pub stage: SchedulingStage,
    #[serde(default)]
    pub stage_history: Vec<SchedulingStage>,
    pub notified: bool,
}
