//! Computes the smallest set of event relocations that clears a chosen slot.
//!
//! Relocation is bounded to one level: a conflicting event may only move into
//! an interval that is already free. Chains where the relocated event would
//! itself displace a further event are never attempted; the plan fails instead.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::event::{EventMove, ExistingEvent, TimeRange};
use crate::models::intent::Intent;
use crate::models::settings::SchedulingSettings;
use crate::models::suggestion::{CandidateSlot, ConflictInfo, ConflictSeverity};
use crate::services::conflict_detector;
use crate::services::schedule_utils;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionPlan {
    pub moves: Vec<EventMove>,
    /// Soft overlaps with immovable events that the plan tolerates.
    #[serde(default)]
    pub residual_conflicts: Vec<ConflictInfo>,
}

pub struct ResolutionPlanner<'a> {
    settings: &'a SchedulingSettings,
    timezone: Tz,
    now: DateTime<Utc>,
}

impl<'a> ResolutionPlanner<'a> {
    pub fn new(settings: &'a SchedulingSettings, timezone: Tz, now: DateTime<Utc>) -> Self {
        Self {
            settings,
            timezone,
            now,
        }
    }

    pub fn plan(
        &self,
        intent: &Intent,
        slot: &CandidateSlot,
        conflicts: &[ConflictInfo],
        events: &[ExistingEvent],
    ) -> AppResult<ResolutionPlan> {
        let blocking: Vec<String> = conflicts
            .iter()
            .filter(|conflict| conflict.blocks_outright())
            .map(|conflict| conflict.event_id.clone())
            .collect();
        if !blocking.is_empty() {
            return Err(AppError::resolution_failed(
                "时间段与不可移动的事件完全冲突",
                blocking,
            ));
        }

        let residual_conflicts: Vec<ConflictInfo> = conflicts
            .iter()
            .filter(|conflict| !conflict.movable)
            .cloned()
            .collect();

        let mut to_move: Vec<&ExistingEvent> = Vec::new();
        for conflict in conflicts.iter().filter(|conflict| conflict.movable) {
            let event = events
                .iter()
                .find(|event| event.id == conflict.event_id)
                .ok_or_else(|| {
                    AppError::resolution_failed(
                        "冲突事件不在当前日历快照中",
                        vec![conflict.event_id.clone()],
                    )
                })?;
            to_move.push(event);
        }
        to_move.sort_by(|a, b| a.start_at.cmp(&b.start_at).then_with(|| a.id.cmp(&b.id)));

        let moving_ids: Vec<&str> = to_move.iter().map(|event| event.id.as_str()).collect();
        let mut claimed = vec![slot.interval()];
        let mut moves = Vec::with_capacity(to_move.len());

        for event in to_move {
            let conflict = conflicts
                .iter()
                .find(|conflict| conflict.event_id == event.id)
                .map(|conflict| conflict.severity)
                .unwrap_or(ConflictSeverity::Soft);

            let proposed = self
                .find_free_interval(event, events, &moving_ids, &claimed)?
                .ok_or_else(|| {
                    AppError::resolution_failed(
                        format!("无法为事件 {} 找到空闲时间", event.title),
                        vec![event.id.clone()],
                    )
                })?;

            debug!(
                target: "app::resolution",
                event_id = %event.id,
                from = %event.start_at,
                to = %proposed.start_at,
                "relocation found"
            );

            claimed.push(proposed);
            moves.push(EventMove {
                event_id: event.id.clone(),
                event_title: event.title.clone(),
                current: event.interval(),
                proposed,
                justification: self.justify(event, &proposed, conflict, intent),
            });
        }

        info!(
            target: "app::resolution",
            moves = moves.len(),
            residual = residual_conflicts.len(),
            "resolution plan built"
        );

        Ok(ResolutionPlan {
            moves,
            residual_conflicts,
        })
    }

    /// Nearest free interval of the same length on the event's own local day,
    /// inside working hours (widened to cover the event's original placement).
    fn find_free_interval(
        &self,
        event: &ExistingEvent,
        events: &[ExistingEvent],
        moving_ids: &[&str],
        claimed: &[TimeRange],
    ) -> AppResult<Option<TimeRange>> {
        let duration = event.duration_minutes();
        let step = self.settings.slot_granularity_minutes.max(1);
        let (day_start, day_end) = self.feasible_day(event);

        let mut options = Vec::new();
        let mut cursor = schedule_utils::align_up(day_start.max(self.now), step)?;
        while let Ok(end) = schedule_utils::add_minutes(cursor, duration) {
            if end > day_end {
                break;
            }
            let range = TimeRange::new(cursor, end);
            if cursor != event.start_at
                && conflict_detector::is_free(&range, events, moving_ids)
                && claimed.iter().all(|taken| !taken.overlaps(&range))
            {
                options.push(range);
            }
            cursor = schedule_utils::add_minutes(cursor, step)?;
        }

        options.sort_by_key(|range| {
            (
                schedule_utils::gap_minutes(event.start_at, range.start_at).abs(),
                range.start_at,
            )
        });
        Ok(options.into_iter().next())
    }

    fn feasible_day(&self, event: &ExistingEvent) -> (DateTime<Utc>, DateTime<Utc>) {
        let day = event.start_at.with_timezone(&self.timezone).date_naive();
        let work_start =
            schedule_utils::local_instant(day, self.settings.workday_start_minute, self.timezone)
                .unwrap_or(event.start_at);
        let work_end =
            schedule_utils::local_instant(day, self.settings.workday_end_minute, self.timezone)
                .unwrap_or(event.end_at);
        (work_start.min(event.start_at), work_end.max(event.end_at))
    }

    fn justify(
        &self,
        event: &ExistingEvent,
        proposed: &TimeRange,
        severity: ConflictSeverity,
        intent: &Intent,
    ) -> String {
        let kind = match severity {
            ConflictSeverity::Hard => "hard",
            ConflictSeverity::Soft => "soft",
        };
        format!(
            "Move \"{}\" from {} to {} to clear a {} conflict with \"{}\"",
            event.title,
            self.local_label(event.start_at),
            self.local_label(proposed.start_at),
            kind,
            intent.title
        )
    }

    fn local_label(&self, dt: DateTime<Utc>) -> String {
        dt.with_timezone(&self.timezone)
            .format("%a %H:%M")
            .to_string()
    }
}
