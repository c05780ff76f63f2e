use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::intent::PriorityTier;

/// Snapshot of an event already on a calendar. The engine never mutates these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExistingEvent {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default = "default_movable")]
    pub movable: bool,
    #[serde(default)]
    pub priority: PriorityTier,
}

fn default_movable() -> bool {
    true
}

impl ExistingEvent {
    pub fn duration_minutes(&self) -> i64 {
        self.end_at.signed_duration_since(self.start_at).num_minutes()
    }

    pub fn interval(&self) -> TimeRange {
        TimeRange {
            start_at: self.start_at,
            end_at: self.end_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self { start_at, end_at }
    }

    pub fn duration_minutes(&self) -> i64 {
        self.end_at.signed_duration_since(self.start_at).num_minutes()
    }

    /// Strict intersection; touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_at < other.end_at && self.end_at > other.start_at
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start_at <= other.start_at && other.end_at <= self.end_at
    }
}

/// Authenticated actor plus optional workspace, supplied by the identity collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceScope {
    pub actor_id: String,
    #[serde(default)]
    pub workspace_id: Option<String>,
}

impl WorkspaceScope {
    pub fn personal(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            workspace_id: None,
        }
    }

    pub fn in_workspace(actor_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            workspace_id: Some(workspace_id.into()),
        }
    }
}

/// Proposed relocation of one movable event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventMove {
    pub event_id: String,
    pub event_title: String,
    pub current: TimeRange,
    pub proposed: TimeRange,
    pub justification: String,
}

/// Event to be created when a slot is committed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub attendees: Vec<String>,
    pub priority: PriorityTier,
    #[serde(default)]
    pub recurrence_rule: Option<String>,
}

/// Unit of work the calendar store must apply atomically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitBatch {
    pub new_event: NewEvent,
    #[serde(default)]
    pub moves: Vec<EventMove>,
    /// Events the new event was cleared to overlap (soft or residual conflicts).
    /// Any other overlap found at write time means the calendar changed.
    #[serde(default)]
    pub tolerated_overlaps: Vec<String>,
}
