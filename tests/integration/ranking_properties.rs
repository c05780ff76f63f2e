use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc, Weekday};
use cognical_slots_lib::error::AppResult;
use cognical_slots_lib::models::event::{CommitBatch, ExistingEvent, TimeRange, WorkspaceScope};
use cognical_slots_lib::models::intent::{Intent, PriorityTier};
use cognical_slots_lib::models::settings::SchedulingSettings;
use cognical_slots_lib::models::suggestion::{CandidateSlot, QualityTier, RankOptions};
use cognical_slots_lib::services::calendar_store::CalendarStore;
use cognical_slots_lib::services::conflict_detector;
use cognical_slots_lib::services::notifier::LogNotifier;
use cognical_slots_lib::services::resolution_planner::ResolutionPlanner;
use cognical_slots_lib::services::scheduling_service::SchedulingService;
use cognical_slots_lib::services::slot_ranker::{compare_slots, CalendarSnapshot, SlotRanker};
use cognical_slots_lib::services::slot_scoring;
use futures::future::join_all;

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, day, hour, minute, 0).unwrap()
}

fn event(id: &str, owner: &str, start: DateTime<Utc>, end: DateTime<Utc>, movable: bool) -> ExistingEvent {
    ExistingEvent {
        id: id.to_string(),
        owner_id: owner.to_string(),
        title: id.to_string(),
        start_at: start,
        end_at: end,
        movable,
        priority: PriorityTier::Medium,
    }
}

#[test]
fn composite_is_the_rounded_weighted_sum_and_stays_in_range() {
    let samples = [0.0, 12.5, 33.0, 50.0, 67.5, 80.0, 99.0, 100.0];
    for &a in &samples {
        for &p in &samples {
            for &t in &samples {
                let d = 100.0 - a;
                let b = (a + p) / 2.0;
                let composite = slot_scoring::composite_score(a, p, t, d, b);
                let expected = (a * 0.35 + p * 0.25 + t * 0.20 + d * 0.10 + b * 0.10).round();
                assert!(composite <= 100);
                assert!((composite as f64 - expected).abs() <= 1.0);
            }
        }
    }
    assert_eq!(slot_scoring::composite_score(100.0, 100.0, 100.0, 100.0, 100.0), 100);
    assert_eq!(slot_scoring::composite_score(0.0, 0.0, 0.0, 0.0, 0.0), 0);
    assert_eq!(slot_scoring::composite_score(100.0, 0.0, 0.0, 0.0, 0.0), 35);
    assert_eq!(slot_scoring::composite_score(0.0, 100.0, 0.0, 0.0, 0.0), 25);
    assert_eq!(slot_scoring::composite_score(0.0, 0.0, 100.0, 0.0, 0.0), 20);
    assert_eq!(slot_scoring::composite_score(0.0, 0.0, 0.0, 100.0, 0.0), 10);
    assert_eq!(slot_scoring::composite_score(0.0, 0.0, 0.0, 0.0, 100.0), 10);
}

#[test]
fn worked_examples() {
    let slot = TimeRange::new(at(1, 10, 0), at(1, 11, 0));

    let attendees: Vec<String> = ["ana", "bo", "cy", "di"].iter().map(|s| s.to_string()).collect();
    let mut calendars = HashMap::new();
    calendars.insert(
        "cy".to_string(),
        vec![event("cy-1", "cy", at(1, 10, 30), at(1, 11, 30), true)],
    );
    assert_eq!(slot_scoring::attendee_score(&slot, &attendees, &calendars), 75.0);
    assert_eq!(slot_scoring::attendee_score(&slot, &[], &calendars), 100.0);

    let earlier = [event("prev", "owner", at(1, 9, 0), at(1, 10, 0), true)];
    let late_start = TimeRange::new(at(1, 10, 5), at(1, 11, 5));
    assert_eq!(slot_scoring::buffer_score(&late_start, &earlier, 15), 80.0);

    assert_eq!(slot_scoring::availability_score(&slot, &[]), 100.0);
}

#[test]
fn free_slot_ranks_above_fully_overlapped_one() -> AppResult<()> {
    let settings = SchedulingSettings::default();
    let ranker = SlotRanker::new(&settings, chrono_tz::UTC, at(1, 0, 0));
    let snapshot = CalendarSnapshot {
        owner_events: vec![event("existing", "owner", at(1, 10, 0), at(1, 11, 0), true)],
        ..CalendarSnapshot::default()
    };
    let candidates = [
        CandidateSlot::new(at(1, 10, 0), at(1, 11, 0)),
        CandidateSlot::new(at(1, 11, 0), at(1, 12, 0)),
    ];

    let ranked = ranker.rank(
        &Intent::new("Meeting", 60),
        &candidates,
        &snapshot,
        &RankOptions::default(),
    )?;
    assert_eq!(ranked.slots[0].slot, candidates[1]);
    assert!(ranked.slots[0].composite_score > ranked.slots[1].composite_score);
    assert!(ranked.slots[1].scores.availability < 100.0);
    Ok(())
}

#[test]
fn empty_calendar_on_preferred_day_is_excellent() -> AppResult<()> {
    let settings = SchedulingSettings::default();
    let ranker = SlotRanker::new(&settings, chrono_tz::UTC, at(1, 0, 0));
    let mut intent = Intent::new("Planning", 60);
    // 2025-05-01 is a Thursday
    intent.constraints.preferred_weekdays = vec![Weekday::Thu];

    let ranked = ranker.rank(
        &intent,
        &[CandidateSlot::new(at(1, 9, 0), at(1, 10, 0))],
        &CalendarSnapshot::default(),
        &RankOptions::default(),
    )?;
    assert!(ranked.slots[0].composite_score >= 90);
    assert_eq!(ranked.slots[0].tier, QualityTier::Excellent);
    Ok(())
}

#[test]
fn ordering_is_deterministic_and_sorted() -> AppResult<()> {
    let settings = SchedulingSettings::default();
    let ranker = SlotRanker::new(&settings, chrono_tz::UTC, at(1, 0, 0));
    let snapshot = CalendarSnapshot {
        owner_events: vec![
            event("a", "owner", at(1, 9, 0), at(1, 9, 45), true),
            event("b", "owner", at(1, 13, 0), at(1, 15, 0), false),
            event("c", "owner", at(1, 16, 10), at(1, 16, 40), true),
        ],
        ..CalendarSnapshot::default()
    };
    let candidates: Vec<CandidateSlot> = (0..24)
        .map(|step| {
            let start = at(1, 7, 0) + Duration::minutes(30 * step);
            CandidateSlot::new(start, start + Duration::minutes(60))
        })
        .collect();
    let options = RankOptions {
        max_results: Some(50),
        ..RankOptions::default()
    };
    let intent = Intent::new("Deep work", 60);

    let first = ranker.rank(&intent, &candidates, &snapshot, &options)?;
    let mut reversed = candidates.clone();
    reversed.reverse();
    let second = ranker.rank(&intent, &reversed, &snapshot, &options)?;

    assert_eq!(first.slots, second.slots);
    for pair in first.slots.windows(2) {
        assert_ne!(
            compare_slots(&pair[0], &pair[1]),
            std::cmp::Ordering::Greater
        );
    }
    Ok(())
}

#[test]
fn slot_inside_immovable_event_never_gets_a_plan() {
    let settings = SchedulingSettings::default();
    let planner = ResolutionPlanner::new(&settings, chrono_tz::UTC, at(1, 0, 0));
    let events = vec![
        event("offsite", "owner", at(1, 9, 0), at(1, 17, 0), false),
        event("call", "owner", at(1, 10, 0), at(1, 10, 30), true),
    ];
    let slot = CandidateSlot::new(at(1, 10, 0), at(1, 11, 0));
    let conflicts = conflict_detector::detect_conflicts(&slot, &events, PriorityTier::High);

    assert!(planner
        .plan(&Intent::new("Sync", 60), &slot, &conflicts, &events)
        .is_err());
}

struct SharedCalendar {
    events: Vec<ExistingEvent>,
}

#[async_trait]
impl CalendarStore for SharedCalendar {
    async fn list_events(
        &self,
        _scope: &WorkspaceScope,
        owner_id: &str,
        range: &TimeRange,
    ) -> AppResult<Vec<ExistingEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|event| event.owner_id == owner_id && range.overlaps(&event.interval()))
            .cloned()
            .collect())
    }

    async fn commit(&self, _scope: &WorkspaceScope, batch: CommitBatch) -> AppResult<String> {
        Ok(batch.new_event.id)
    }
}

#[tokio::test]
async fn concurrent_requests_do_not_interfere() -> AppResult<()> {
    let store = Arc::new(SharedCalendar {
        events: vec![
            event("standup", "owner", at(5, 9, 0), at(5, 9, 30), true),
            event("review", "owner", at(5, 14, 0), at(5, 15, 0), false),
        ],
    });
    let service = SchedulingService::new(store, Arc::new(LogNotifier), SchedulingSettings::default())?;
    let scope = WorkspaceScope::personal("owner");
    let options = RankOptions {
        reference_time: Some(at(5, 8, 0)),
        ..RankOptions::default()
    };

    let intents: Vec<Intent> = (0..8)
        .map(|i| {
            let mut intent = Intent::new(format!("Meeting {i}"), 30 + 15 * (i % 3));
            intent.constraints.must_be_before = Some(at(6, 18, 0));
            intent
        })
        .collect();

    let sequential = {
        let mut results = Vec::new();
        for intent in &intents {
            results.push(service.rank(intent, &scope, &options).await?);
        }
        results
    };
    let parallel = join_all(intents.iter().map(|intent| service.rank(intent, &scope, &options))).await;

    for (expected, actual) in sequential.iter().zip(parallel) {
        assert_eq!(expected, &actual?);
    }
    Ok(())
}
