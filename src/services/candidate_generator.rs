use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::event::TimeRange;
use crate::models::intent::Intent;
use crate::models::settings::SchedulingSettings;
use crate::models::suggestion::CandidateSlot;
use crate::services::schedule_utils;
use crate::services::settings_service::{self, MAX_SEARCH_WINDOW_DAYS};

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSet {
    pub window: TimeRange,
    pub granularity_minutes: i64,
    pub candidates: Vec<CandidateSlot>,
}

impl CandidateSet {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Search window for an intent: hard date bounds when given, otherwise
/// `window_days` from `now`. Never starts in the past, and never spans more
/// than `MAX_SEARCH_WINDOW_DAYS` even when the hard bounds are wider.
pub fn search_window(intent: &Intent, now: DateTime<Utc>, window_days: i64) -> AppResult<TimeRange> {
    settings_service::validate_window_days(window_days)?;

    let constraints = &intent.constraints;
    let start = constraints
        .must_be_after
        .map(|after| after.max(now))
        .unwrap_or(now);
    let limit = start
        .checked_add_signed(Duration::days(MAX_SEARCH_WINDOW_DAYS))
        .ok_or_else(|| AppError::validation("搜索窗口超出可表示的时间范围"))?;

    let end = match constraints.must_be_before {
        Some(before) if before > limit => {
            debug!(target: "app::scheduling", before = %before, limit = %limit, "hard upper bound clipped to the maximum window");
            limit
        }
        Some(before) => before,
        None => start
            .checked_add_signed(Duration::days(window_days))
            .ok_or_else(|| AppError::validation("搜索窗口超出可表示的时间范围"))?,
    };
    Ok(TimeRange::new(start, end))
}

/// True when the slot breaks a constraint that excludes it from candidacy outright.
pub fn violates_hard_constraints(slot: &CandidateSlot, intent: &Intent, tz: Tz) -> bool {
    let constraints = &intent.constraints;

    if matches!(constraints.must_be_after, Some(after) if slot.start_at < after) {
        return true;
    }
    if matches!(constraints.must_be_before, Some(before) if slot.end_at > before) {
        return true;
    }

    if let Some(not_before) = constraints.not_before_minute {
        if schedule_utils::local_minute_of_day(slot.start_at, tz) < not_before {
            return true;
        }
    }

    if let Some(not_after) = constraints.not_after_minute {
        match schedule_utils::local_end_minute(slot.start_at, slot.end_at, tz) {
            Some(end_minute) if end_minute <= not_after => {}
            _ => return true,
        }
    }

    false
}

pub fn generate_candidates(
    intent: &Intent,
    duration_minutes: i64,
    window: TimeRange,
    settings: &SchedulingSettings,
    tz: Tz,
) -> AppResult<CandidateSet> {
    if duration_minutes <= 0 {
        return Err(AppError::invalid_intent("持续时间必须大于 0"));
    }

    if let (Some(start), false) = (intent.start_at, intent.flexible) {
        let end = schedule_utils::add_minutes(start, duration_minutes)?;
        let slot = CandidateSlot::new(start, end);
        let mut candidates = Vec::new();
        if start >= window.start_at && !violates_hard_constraints(&slot, intent, tz) {
            candidates.push(slot);
        } else {
            debug!(target: "app::scheduling", start = %start, "fixed start excluded by hard constraints");
        }
        return Ok(CandidateSet {
            window,
            granularity_minutes: settings.slot_granularity_minutes,
            candidates,
        });
    }

    let cap = settings.max_candidates.max(1);
    let mut step = settings.slot_granularity_minutes.max(1);

    loop {
        let mut candidates = grid(intent, duration_minutes, window, step, tz)?;

        if let Some(anchor) = intent.start_at {
            let slot = CandidateSlot::new(anchor, schedule_utils::add_minutes(anchor, duration_minutes)?);
            if anchor >= window.start_at
                && slot.end_at <= window.end_at
                && !violates_hard_constraints(&slot, intent, tz)
                && !candidates.contains(&slot)
            {
                candidates.push(slot);
                candidates.sort_by_key(|candidate| candidate.start_at);
            }
        }

        if candidates.len() <= cap {
            debug!(
                target: "app::scheduling",
                count = candidates.len(),
                granularity = step,
                "candidates generated"
            );
            return Ok(CandidateSet {
                window,
                granularity_minutes: step,
                candidates,
            });
        }

        debug!(
            target: "app::scheduling",
            count = candidates.len(),
            cap,
            granularity = step,
            "candidate cap exceeded, widening granularity"
        );
        step *= 2;
    }
}

fn grid(
    intent: &Intent,
    duration_minutes: i64,
    window: TimeRange,
    step_minutes: i64,
    tz: Tz,
) -> AppResult<Vec<CandidateSlot>> {
    let mut candidates = Vec::new();
    if window.end_at <= window.start_at {
        return Ok(candidates);
    }

    let mut cursor = schedule_utils::align_up(window.start_at, step_minutes)?;
    loop {
        let end = schedule_utils::add_minutes(cursor, duration_minutes)?;
        if end > window.end_at {
            break;
        }
        let slot = CandidateSlot::new(cursor, end);
        if !violates_hard_constraints(&slot, intent, tz) {
            candidates.push(slot);
        }
        cursor = schedule_utils::add_minutes(cursor, step_minutes)?;
    }

    Ok(candidates)
}
