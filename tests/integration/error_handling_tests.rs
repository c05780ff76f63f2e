// Error kinds surfaced by the scheduling engine and how callers can tell them apart

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use cognical_slots_lib::error::{AppError, AppResult, ErrorCategory};
use cognical_slots_lib::models::event::{CommitBatch, ExistingEvent, TimeRange, WorkspaceScope};
use cognical_slots_lib::models::intent::{Intent, PriorityTier};
use cognical_slots_lib::models::settings::SchedulingSettings;
use cognical_slots_lib::models::suggestion::RankOptions;
use cognical_slots_lib::services::calendar_store::CalendarStore;
use cognical_slots_lib::services::notifier::LogNotifier;
use cognical_slots_lib::services::scheduling_service::SchedulingService;

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 5, hour, minute, 0).unwrap()
}

#[derive(Default)]
struct MemoryStore {
    events: HashMap<String, Vec<ExistingEvent>>,
    unreachable: Vec<String>,
    delay: Option<StdDuration>,
}

#[async_trait]
impl CalendarStore for MemoryStore {
    async fn list_events(
        &self,
        _scope: &WorkspaceScope,
        owner_id: &str,
        range: &TimeRange,
    ) -> AppResult<Vec<ExistingEvent>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.iter().any(|id| id == owner_id) {
            return Err(AppError::database(format!("calendar of {owner_id} is offline")));
        }
        Ok(self
            .events
            .get(owner_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|event| range.overlaps(&event.interval()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(&self, _scope: &WorkspaceScope, batch: CommitBatch) -> AppResult<String> {
        Ok(batch.new_event.id)
    }
}

fn service_with(store: MemoryStore, settings: SchedulingSettings) -> AppResult<SchedulingService> {
    SchedulingService::new(Arc::new(store), Arc::new(LogNotifier), settings)
}

fn scope() -> WorkspaceScope {
    WorkspaceScope::personal("owner")
}

fn options() -> RankOptions {
    RankOptions {
        reference_time: Some(at(8, 0)),
        ..RankOptions::default()
    }
}

fn morning_intent() -> Intent {
    let mut intent = Intent::new("Review", 60);
    intent.constraints.must_be_after = Some(at(9, 0));
    intent.constraints.must_be_before = Some(at(12, 0));
    intent
}

#[tokio::test]
async fn empty_title_is_invalid_input() -> AppResult<()> {
    let service = service_with(MemoryStore::default(), SchedulingSettings::default())?;
    let intent = Intent::new("   ", 30);

    let error = service.rank(&intent, &scope(), &options()).await.unwrap_err();
    assert_eq!(error.code(), "INVALID_INTENT");
    assert_eq!(error.category(), ErrorCategory::InvalidInput);
    Ok(())
}

#[tokio::test]
async fn underivable_duration_is_rejected_before_generation() -> AppResult<()> {
    let settings = SchedulingSettings {
        default_duration_minutes: None,
        ..SchedulingSettings::default()
    };
    let service = service_with(MemoryStore::default(), settings)?;
    let mut intent = morning_intent();
    intent.duration_minutes = None;

    let error = service.rank(&intent, &scope(), &options()).await.unwrap_err();
    assert!(matches!(error, AppError::InvalidIntent { .. }));

    let service = service_with(MemoryStore::default(), SchedulingSettings::default())?;
    let slots = service.rank(&intent, &scope(), &options()).await?;
    assert_eq!(slots[0].slot.interval().duration_minutes(), 60);
    Ok(())
}

#[tokio::test]
async fn constraints_that_exclude_everything_report_no_candidates() -> AppResult<()> {
    let service = service_with(MemoryStore::default(), SchedulingSettings::default())?;

    let mut too_narrow = morning_intent();
    too_narrow.constraints.not_before_minute = Some(9 * 60);
    too_narrow.constraints.not_after_minute = Some(9 * 60 + 30);
    let error = service.rank(&too_narrow, &scope(), &options()).await.unwrap_err();
    assert_eq!(error.code(), "NO_CANDIDATES_IN_WINDOW");

    let mut in_the_past = Intent::new("Yesterday", 30);
    in_the_past.constraints.must_be_after = Some(at(1, 0));
    in_the_past.constraints.must_be_before = Some(at(2, 0));
    let error = service.rank(&in_the_past, &scope(), &options()).await.unwrap_err();
    assert!(matches!(error, AppError::NoCandidatesInWindow { .. }));
    Ok(())
}

#[tokio::test]
async fn low_scores_fail_only_under_strict_threshold() -> AppResult<()> {
    let service = service_with(MemoryStore::default(), SchedulingSettings::default())?;
    let mut evening = Intent::new("Late sync", 60);
    evening.constraints.must_be_after = Some(at(20, 0));
    evening.constraints.must_be_before = Some(at(21, 0));

    let lenient = RankOptions {
        min_score: Some(95),
        ..options()
    };
    let slots = service.rank(&evening, &scope(), &lenient).await?;
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].composite_score, 75);
    assert!(slots[0]
        .warnings
        .iter()
        .any(|warning| warning == "outside preferred hours"));

    let strict = RankOptions {
        strict_threshold: true,
        ..lenient
    };
    let error = service.rank(&evening, &scope(), &strict).await.unwrap_err();
    match error {
        AppError::NoAcceptableSlot {
            best_score,
            threshold,
        } => {
            assert_eq!(best_score, 75);
            assert_eq!(threshold, 95);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn slow_calendar_fails_closed() -> AppResult<()> {
    let store = MemoryStore {
        delay: Some(StdDuration::from_millis(300)),
        ..MemoryStore::default()
    };
    let settings = SchedulingSettings {
        fetch_timeout_ms: 50,
        ..SchedulingSettings::default()
    };
    let service = service_with(store, settings)?;

    let error = service
        .rank(&morning_intent(), &scope(), &options())
        .await
        .unwrap_err();
    assert_eq!(error.code(), "DATA_FETCH_TIMEOUT");
    assert!(error.is_retryable());
    Ok(())
}

#[tokio::test]
async fn unreachable_attendee_is_a_warning_not_an_error() -> AppResult<()> {
    let mut events = HashMap::new();
    events.insert(
        "ana".to_string(),
        vec![ExistingEvent {
            id: "ana-1".to_string(),
            owner_id: "ana".to_string(),
            title: "Dentist".to_string(),
            start_at: at(11, 0),
            end_at: at(12, 0),
            movable: false,
            priority: PriorityTier::High,
        }],
    );
    let store = MemoryStore {
        events,
        unreachable: vec!["bo".to_string()],
        delay: None,
    };
    let service = service_with(store, SchedulingSettings::default())?;

    let mut intent = morning_intent();
    intent.attendees = vec!["ana".to_string(), "bo".to_string()];
    let slots = service.rank(&intent, &scope(), &options()).await?;

    assert!(slots.iter().all(|slot| slot
        .warnings
        .iter()
        .any(|warning| warning == "calendar unavailable for: bo")));
    let eleven = slots
        .iter()
        .find(|slot| slot.slot.start_at == at(11, 0))
        .ok_or_else(AppError::not_found)?;
    assert_eq!(eleven.scores.attendee, 50.0);
    assert_eq!(eleven.conflicts.len(), 1);
    assert_eq!(eleven.conflicts[0].event_id, "ana-1");
    assert_eq!(eleven.conflicts[0].attendee_id.as_deref(), Some("ana"));
    assert!(!eleven.conflicts[0].movable);
    Ok(())
}

#[tokio::test]
async fn owner_calendar_failure_fails_the_request() -> AppResult<()> {
    let store = MemoryStore {
        unreachable: vec!["owner".to_string()],
        ..MemoryStore::default()
    };
    let service = service_with(store, SchedulingSettings::default())?;

    let error = service
        .rank(&morning_intent(), &scope(), &options())
        .await
        .unwrap_err();
    assert_eq!(error.code(), "DATABASE_ERROR");
    Ok(())
}

#[test]
fn invalid_settings_are_refused_at_construction() {
    let settings = SchedulingSettings {
        timezone: "Mars/Olympus".to_string(),
        ..SchedulingSettings::default()
    };
    let result = service_with(MemoryStore::default(), settings);
    match result {
        Err(error) => assert_eq!(error.code(), "VALIDATION_FAILED"),
        Ok(_) => panic!("unknown timezone must be rejected"),
    }
}

#[tokio::test]
async fn out_of_range_search_window_is_invalid_input() -> AppResult<()> {
    let service = service_with(MemoryStore::default(), SchedulingSettings::default())?;
    let intent = Intent::new("Quarterly review", 60);

    for days in [i64::MAX, 100_000, 0] {
        let options = RankOptions {
            search_window_days: Some(days),
            ..options()
        };
        let error = service.rank(&intent, &scope(), &options).await.unwrap_err();
        assert_eq!(error.code(), "VALIDATION_FAILED");
        assert_eq!(error.category(), ErrorCategory::InvalidInput);
    }
    Ok(())
}
