use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::event::ExistingEvent;
use crate::models::intent::Intent;
use crate::models::settings::SchedulingSettings;
use crate::models::suggestion::{CandidateSlot, RankOptions, SuggestedSlot};
use crate::services::conflict_detector;
use crate::services::resolution_planner::ResolutionPlanner;
use crate::services::schedule_utils;
use crate::services::slot_scoring::{self, PreferenceContext};

const LOW_CONFIDENCE: f64 = 0.5;

/// Calendar snapshot a ranking request works against.
#[derive(Debug, Clone, Default)]
pub struct CalendarSnapshot {
    pub owner_events: Vec<ExistingEvent>,
    pub attendee_events: HashMap<String, Vec<ExistingEvent>>,
    /// Attendees whose calendars could not be read; treated as available.
    pub unreachable_attendees: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RankedSlots {
    pub slots: Vec<SuggestedSlot>,
    pub evaluated: usize,
    pub disqualified: usize,
    /// True when every slot scored below the threshold and the best ones were kept anyway.
    pub below_threshold: bool,
}

pub struct SlotRanker<'a> {
    settings: &'a SchedulingSettings,
    timezone: Tz,
    now: DateTime<Utc>,
}

impl<'a> SlotRanker<'a> {
    pub fn new(settings: &'a SchedulingSettings, timezone: Tz, now: DateTime<Utc>) -> Self {
        Self {
            settings,
            timezone,
            now,
        }
    }

    pub fn rank(
        &self,
        intent: &Intent,
        candidates: &[CandidateSlot],
        snapshot: &CalendarSnapshot,
        options: &RankOptions,
    ) -> AppResult<RankedSlots> {
        let threshold = options.min_score.unwrap_or(self.settings.min_score);
        let max_results = options.max_results.unwrap_or(self.settings.max_results).max(1);

        let mut scored = Vec::with_capacity(candidates.len());
        let mut disqualified = 0;
        for candidate in candidates {
            match self.evaluate(intent, candidate, snapshot, options) {
                Some(slot) => scored.push(slot),
                None => disqualified += 1,
            }
        }

        scored.sort_by(compare_slots);

        let evaluated = candidates.len();
        let best_score = scored.first().map(|slot| slot.composite_score);
        let Some(best_score) = best_score else {
            return Err(AppError::no_acceptable_slot(0, threshold));
        };

        let passing: Vec<SuggestedSlot> = scored
            .iter()
            .filter(|slot| slot.composite_score >= threshold)
            .cloned()
            .collect();

        let (mut slots, below_threshold) = if !passing.is_empty() {
            (passing, false)
        } else if options.strict_threshold {
            return Err(AppError::no_acceptable_slot(best_score, threshold));
        } else {
            debug!(target: "app::ranking", best_score, threshold, "no slot above threshold, keeping best available");
            let mut fallback = scored;
            for slot in fallback.iter_mut() {
                slot.warnings
                    .push(format!("below the minimum quality score of {threshold}"));
            }
            (fallback, true)
        };
        slots.truncate(max_results);

        info!(
            target: "app::ranking",
            evaluated,
            disqualified,
            returned = slots.len(),
            best_score,
            below_threshold,
            "slots ranked"
        );

        Ok(RankedSlots {
            slots,
            evaluated,
            disqualified,
            below_threshold,
        })
    }

    /// Scores a single candidate; `None` when it is disqualified outright.
    pub fn evaluate(
        &self,
        intent: &Intent,
        candidate: &CandidateSlot,
        snapshot: &CalendarSnapshot,
        options: &RankOptions,
    ) -> Option<SuggestedSlot> {
        let interval = candidate.interval();
        let owner_events = &snapshot.owner_events;
        let owner_conflicts =
            conflict_detector::detect_conflicts(candidate, owner_events, intent.priority);

        // No resolution plan can ever clear these, auto-resolve or not.
        if owner_conflicts.iter().any(|c| c.blocks_outright()) {
            return None;
        }
        let required_moves = owner_conflicts.len();

        let mut conflicts = owner_conflicts;
        conflicts.extend(conflict_detector::detect_attendee_conflicts(
            candidate,
            &intent.attendees,
            &snapshot.attendee_events,
        ));
        conflict_detector::sort_conflicts(&mut conflicts);

        let preference_context = PreferenceContext {
            timezone: self.timezone,
            workday_start_minute: self.settings.workday_start_minute,
            workday_end_minute: self.settings.workday_end_minute,
            preferred_weekdays: &intent.constraints.preferred_weekdays,
            avoided_weekdays: &intent.constraints.avoided_weekdays,
        };

        let busy = slot_scoring::busy_attendees(&interval, &intent.attendees, &snapshot.attendee_events);
        let scores = slot_scoring::breakdown(
            slot_scoring::availability_score(&interval, owner_events),
            slot_scoring::preference_score(candidate.start_at, &preference_context),
            slot_scoring::attendee_score(&interval, &intent.attendees, &snapshot.attendee_events),
            slot_scoring::disruption_score(required_moves, owner_events.len()),
            slot_scoring::buffer_score(&interval, owner_events, self.settings.min_buffer_minutes),
        );

        let mut warnings = Vec::new();
        if !preference_context.within_working_hours(candidate.start_at) {
            warnings.push("outside preferred hours".to_string());
        }
        let weekday = schedule_utils::local_weekday(candidate.start_at, self.timezone);
        if intent.constraints.avoided_weekdays.contains(&weekday) {
            warnings.push("falls on an avoided weekday".to_string());
        } else if !intent.constraints.preferred_weekdays.is_empty()
            && !intent.constraints.preferred_weekdays.contains(&weekday)
        {
            warnings.push("not on a preferred weekday".to_string());
        }
        if !busy.is_empty() {
            warnings.push(format!("attendees busy: {}", busy.join(", ")));
        }
        if !snapshot.unreachable_attendees.is_empty() {
            warnings.push(format!(
                "calendar unavailable for: {}",
                snapshot.unreachable_attendees.join(", ")
            ));
        }
        let hard = conflicts.iter().filter(|c| c.is_hard()).count();
        if hard > 0 {
            warnings.push(format!("{hard} hard conflict(s)"));
        }
        if scores.buffer < 100.0 {
            warnings.push(format!(
                "less than {} minutes between adjacent events",
                self.settings.min_buffer_minutes
            ));
        }
        if intent.confidence < LOW_CONFIDENCE {
            warnings.push("low confidence in the parsed request".to_string());
        }
        for aspect in &intent.ambiguities {
            warnings.push(format!("ambiguous: {aspect}"));
        }

        let proposed_moves = if options.plan_moves && !conflicts.is_empty() {
            let planner = ResolutionPlanner::new(self.settings, self.timezone, self.now);
            match planner.plan(intent, candidate, &conflicts, owner_events) {
                Ok(plan) => Some(plan.moves),
                Err(error) => {
                    warnings.push(format!("auto-resolution unavailable: {error}"));
                    None
                }
            }
        } else {
            None
        };

        let reason = slot_scoring::generate_reason(&scores, conflicts.len(), intent.has_attendees());

        Some(SuggestedSlot {
            slot: *candidate,
            composite_score: scores.composite,
            tier: slot_scoring::quality_tier(scores.composite),
            scores,
            conflicts,
            warnings,
            reason,
            proposed_moves,
        })
    }
}

/// Highest composite first, then fewer hard conflicts, then earlier start.
pub fn compare_slots(a: &SuggestedSlot, b: &SuggestedSlot) -> Ordering {
    b.composite_score
        .cmp(&a.composite_score)
        .then_with(|| a.hard_conflict_count().cmp(&b.hard_conflict_count()))
        .then_with(|| a.slot.start_at.cmp(&b.slot.start_at))
}
