//! Pure scoring functions for candidate slots.
//!
//! Each sub-score lies in `[0, 100]` and depends only on its arguments. The
//! composite is the fixed-weight sum of the five sub-scores, rounded.

use std::collections::HashMap;

use chrono::{DateTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::models::event::{ExistingEvent, TimeRange};
use crate::models::suggestion::{QualityTier, ScoreBreakdown};
use crate::services::schedule_utils;

pub const WEIGHT_AVAILABILITY: f64 = 0.35;
pub const WEIGHT_PREFERENCE: f64 = 0.25;
pub const WEIGHT_ATTENDEE: f64 = 0.20;
pub const WEIGHT_DISRUPTION: f64 = 0.10;
pub const WEIGHT_BUFFER: f64 = 0.10;

const FULL_OVERLAP_WEIGHT: f64 = 2.0;
const PARTIAL_OVERLAP_WEIGHT: f64 = 0.5;
const OVERLAP_NORMALIZER: f64 = 10.0;
const BUFFER_PENALTY_PER_MINUTE: f64 = 2.0;
const SWEET_SPOT_HOURS: [u32; 4] = [10, 11, 14, 15];
const EARLY_HOUR: u32 = 8;
const LATE_HOUR: u32 = 18;

/// Inputs to [`preference_score`] that come from settings and the intent.
#[derive(Debug, Clone, Copy)]
pub struct PreferenceContext<'a> {
    pub timezone: Tz,
    pub workday_start_minute: u32,
    pub workday_end_minute: u32,
    pub preferred_weekdays: &'a [Weekday],
    pub avoided_weekdays: &'a [Weekday],
}

impl PreferenceContext<'_> {
    pub fn within_working_hours(&self, start: DateTime<Utc>) -> bool {
        let minute = schedule_utils::local_minute_of_day(start, self.timezone);
        minute >= self.workday_start_minute && minute < self.workday_end_minute
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

pub fn availability_score(slot: &TimeRange, events: &[ExistingEvent]) -> f64 {
    let weighted_conflicts: f64 = events
        .iter()
        .filter(|event| slot.overlaps(&event.interval()))
        .map(|event| {
            if event.interval().contains(slot) {
                FULL_OVERLAP_WEIGHT
            } else {
                PARTIAL_OVERLAP_WEIGHT
            }
        })
        .sum();

    clamp_score(100.0 - (weighted_conflicts / OVERLAP_NORMALIZER) * 100.0)
}

pub fn preference_score(start: DateTime<Utc>, context: &PreferenceContext<'_>) -> f64 {
    let mut score = 50.0;

    if context.within_working_hours(start) {
        score += 30.0;
    } else {
        score -= 30.0;
    }

    let weekday = schedule_utils::local_weekday(start, context.timezone);
    if !context.preferred_weekdays.is_empty() {
        if context.preferred_weekdays.contains(&weekday) {
            score += 20.0;
        } else {
            score -= 10.0;
        }
    }
    if context.avoided_weekdays.contains(&weekday) {
        score -= 30.0;
    }

    let hour = schedule_utils::local_hour(start, context.timezone);
    if SWEET_SPOT_HOURS.contains(&hour) {
        score += 10.0;
    }
    if hour < EARLY_HOUR || hour >= LATE_HOUR {
        score -= 20.0;
    }

    clamp_score(score)
}

/// Attendees with at least one known event overlapping the slot, in input order.
pub fn busy_attendees<'a>(
    slot: &TimeRange,
    attendees: &'a [String],
    attendee_events: &HashMap<String, Vec<ExistingEvent>>,
) -> Vec<&'a str> {
    attendees
        .iter()
        .filter(|attendee| {
            attendee_events
                .get(attendee.as_str())
                .map(|events| events.iter().any(|event| slot.overlaps(&event.interval())))
                .unwrap_or(false)
        })
        .map(|attendee| attendee.as_str())
        .collect()
}

pub fn attendee_score(
    slot: &TimeRange,
    attendees: &[String],
    attendee_events: &HashMap<String, Vec<ExistingEvent>>,
) -> f64 {
    if attendees.is_empty() {
        return 100.0;
    }
    let busy = busy_attendees(slot, attendees, attendee_events).len();
    let available = attendees.len() - busy;
    clamp_score((available as f64 / attendees.len() as f64) * 100.0)
}

pub fn disruption_score(required_moves: usize, total_events: usize) -> f64 {
    if total_events == 0 {
        return 100.0;
    }
    clamp_score(100.0 - (required_moves as f64 / total_events as f64) * 100.0)
}

pub fn buffer_score(slot: &TimeRange, events: &[ExistingEvent], min_buffer_minutes: i64) -> f64 {
    let mut score = 100.0;

    for event in events {
        let gap = if event.end_at <= slot.start_at {
            schedule_utils::gap_minutes(event.end_at, slot.start_at)
        } else if event.start_at >= slot.end_at {
            schedule_utils::gap_minutes(slot.end_at, event.start_at)
        } else {
            continue;
        };

        if gap > 0 && gap < min_buffer_minutes {
            score -= (min_buffer_minutes - gap) as f64 * BUFFER_PENALTY_PER_MINUTE;
        }
    }

    clamp_score(score)
}

pub fn composite_score(
    availability: f64,
    preference: f64,
    attendee: f64,
    disruption: f64,
    buffer: f64,
) -> u8 {
    let weighted = clamp_score(availability) * WEIGHT_AVAILABILITY
        + clamp_score(preference) * WEIGHT_PREFERENCE
        + clamp_score(attendee) * WEIGHT_ATTENDEE
        + clamp_score(disruption) * WEIGHT_DISRUPTION
        + clamp_score(buffer) * WEIGHT_BUFFER;
    weighted.round().clamp(0.0, 100.0) as u8
}

pub fn breakdown(
    availability: f64,
    preference: f64,
    attendee: f64,
    disruption: f64,
    buffer: f64,
) -> ScoreBreakdown {
    let availability = clamp_score(availability);
    let preference = clamp_score(preference);
    let attendee = clamp_score(attendee);
    let disruption = clamp_score(disruption);
    let buffer = clamp_score(buffer);
    ScoreBreakdown {
        availability,
        preference,
        attendee,
        disruption,
        buffer,
        composite: composite_score(availability, preference, attendee, disruption, buffer),
    }
}

pub fn quality_tier(score: u8) -> QualityTier {
    match score {
        90..=u8::MAX => QualityTier::Excellent,
        75..=89 => QualityTier::Good,
        60..=74 => QualityTier::Fair,
        _ => QualityTier::Poor,
    }
}

pub fn generate_reason(scores: &ScoreBreakdown, conflict_count: usize, has_attendees: bool) -> String {
    let headline = match quality_tier(scores.composite) {
        QualityTier::Excellent => "Excellent time slot",
        QualityTier::Good => "Good time slot",
        QualityTier::Fair => "Fair time slot",
        QualityTier::Poor => "Poor time slot",
    };

    let mut parts = Vec::new();
    match conflict_count {
        0 => parts.push("no conflicts".to_string()),
        1 => parts.push("1 conflict".to_string()),
        n => parts.push(format!("{n} conflicts")),
    }

    if scores.preference >= 70.0 {
        parts.push("matches your preferences".to_string());
    } else if scores.preference < 50.0 {
        parts.push("outside preferred hours".to_string());
    }

    if has_attendees {
        if scores.attendee >= 100.0 {
            parts.push("all attendees available".to_string());
        } else if scores.attendee >= 50.0 {
            parts.push("most attendees available".to_string());
        } else {
            parts.push("limited attendee availability".to_string());
        }
    }

    format!("{headline}: {}", parts.join(", "))
}
