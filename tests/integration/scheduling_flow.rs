use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc, Weekday};
use cognical_slots_lib::db::repositories::event_repository::EventRepository;
use cognical_slots_lib::db::DbPool;
use cognical_slots_lib::error::{AppError, AppResult, ErrorCategory};
use cognical_slots_lib::models::event::{ExistingEvent, TimeRange, WorkspaceScope};
use cognical_slots_lib::models::intent::{
    Frequency, Intent, PriorityTier, RecurrenceEnd, RecurrenceRule,
};
use cognical_slots_lib::models::settings::SchedulingSettings;
use cognical_slots_lib::models::suggestion::{
    CandidateSlot, RankOptions, ScheduleResult, SchedulingStage,
};
use cognical_slots_lib::services::calendar_store::{CalendarStore, SqliteCalendarStore};
use cognical_slots_lib::services::notifier::{LogNotifier, Notifier};
use cognical_slots_lib::services::schedule_utils;
use cognical_slots_lib::services::scheduling_service::{CommitOptions, SchedulingService};
use tempfile::{tempdir, TempDir};

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    // Monday
    Utc.with_ymd_and_hms(2025, 5, 5, hour, minute, 0).unwrap()
}

fn event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>, movable: bool) -> ExistingEvent {
    ExistingEvent {
        id: id.to_string(),
        owner_id: "owner".to_string(),
        title: id.to_string(),
        start_at: start,
        end_at: end,
        movable,
        priority: PriorityTier::Medium,
    }
}

fn morning_intent(title: &str) -> Intent {
    let mut intent = Intent::new(title, 60);
    intent.constraints.must_be_after = Some(at(9, 0));
    intent.constraints.must_be_before = Some(at(12, 0));
    intent
}

fn rank_options() -> RankOptions {
    RankOptions {
        reference_time: Some(at(8, 0)),
        ..RankOptions::default()
    }
}

fn commit_options(auto_resolve: bool, notify: bool) -> CommitOptions {
    CommitOptions {
        auto_resolve,
        notify,
        reference_time: Some(at(8, 0)),
    }
}

struct Fixture {
    store: Arc<SqliteCalendarStore>,
    service: SchedulingService,
    scope: WorkspaceScope,
    _dir: TempDir,
}

fn setup_with_notifier(notifier: Arc<dyn Notifier>) -> AppResult<Fixture> {
    let dir = tempdir()?;
    let pool = DbPool::new(dir.path().join("calendar.sqlite"))?;
    let store = Arc::new(SqliteCalendarStore::new(pool));
    let scope = WorkspaceScope::personal("owner");

    store.seed(&scope, &event("standup", at(9, 0), at(9, 30), true))?;
    store.seed(&scope, &event("focus", at(10, 0), at(11, 0), false))?;

    let service = SchedulingService::new(store.clone(), notifier, SchedulingSettings::default())?;
    Ok(Fixture {
        store,
        service,
        scope,
        _dir: dir,
    })
}

fn setup() -> AppResult<Fixture> {
    setup_with_notifier(Arc::new(LogNotifier))
}

fn find_start(store: &SqliteCalendarStore, id: &str) -> AppResult<DateTime<Utc>> {
    let row = store
        .pool()
        .with_connection(|conn| EventRepository::find_by_id(conn, id))?
        .ok_or_else(AppError::not_found)?;
    schedule_utils::parse_datetime(&row.start_at)
}

#[tokio::test]
async fn rank_then_commit_conflict_free_slot() -> AppResult<()> {
    let fixture = setup()?;
    let intent = morning_intent("Design review");

    let slots = fixture
        .service
        .rank(&intent, &fixture.scope, &rank_options())
        .await?;

    let best = &slots[0];
    assert_eq!(best.slot, CandidateSlot::new(at(11, 0), at(12, 0)));
    assert_eq!(best.composite_score, 98);
    assert!(best.conflicts.is_empty());
    assert!(
        slots.iter().all(|slot| slot.slot.start_at != at(10, 0)),
        "slot swallowed by an immovable event must be disqualified"
    );

    let result = fixture
        .service
        .commit(&best.slot, &intent, &fixture.scope, &commit_options(false, true))
        .await?;
    assert!(result.success);
    assert!(result.notified);
    assert!(result.applied_moves.is_empty());
    assert_eq!(result.stage, SchedulingStage::Committed);

    let event_id = result.event_id.ok_or_else(AppError::not_found)?;
    assert_eq!(find_start(&fixture.store, &event_id)?, at(11, 0));

    let events = fixture
        .store
        .list_events(&fixture.scope, "owner", &TimeRange::new(at(0, 0), at(23, 0)))
        .await?;
    assert_eq!(events.len(), 3);
    Ok(())
}

#[tokio::test]
async fn hard_conflict_needs_auto_resolve_and_moves_are_applied() -> AppResult<()> {
    let fixture = setup()?;
    let intent = morning_intent("Planning");
    let selected = CandidateSlot::new(at(9, 0), at(10, 0));

    let error = fixture
        .service
        .commit(&selected, &intent, &fixture.scope, &commit_options(false, false))
        .await
        .unwrap_err();
    assert_eq!(error.code(), "SLOT_UNAVAILABLE");
    assert_eq!(error.category(), ErrorCategory::PickAnotherSlot);

    let result = fixture
        .service
        .commit(&selected, &intent, &fixture.scope, &commit_options(true, false))
        .await?;
    assert_eq!(result.applied_moves.len(), 1);
    let relocation = &result.applied_moves[0];
    assert_eq!(relocation.event_id, "standup");
    assert_eq!(relocation.proposed, TimeRange::new(at(11, 0), at(11, 30)));
    assert_eq!(
        result.stage_history,
        vec![
            SchedulingStage::AwaitingSelection,
            SchedulingStage::Resolving,
            SchedulingStage::Resolved,
            SchedulingStage::Committed,
        ]
    );

    assert_eq!(find_start(&fixture.store, "standup")?, at(11, 0));
    let log = fixture
        .store
        .pool()
        .with_connection(|conn| EventRepository::list_move_log(conn, "standup"))?;
    assert_eq!(log.len(), 1);
    assert_eq!(Some(log[0].caused_by_event_id.clone()), result.event_id);
    Ok(())
}

#[tokio::test]
async fn immovable_hard_conflict_rejects_even_with_auto_resolve() -> AppResult<()> {
    let fixture = setup()?;
    let intent = morning_intent("Sync");
    let selected = CandidateSlot::new(at(10, 0), at(11, 0));

    let error = fixture
        .service
        .commit(&selected, &intent, &fixture.scope, &commit_options(true, false))
        .await
        .unwrap_err();
    match error {
        AppError::ResolutionFailed {
            blocking_event_ids, ..
        } => assert_eq!(blocking_event_ids, vec!["focus".to_string()]),
        other => panic!("unexpected error: {other:?}"),
    }

    let count = fixture.store.pool().with_connection(EventRepository::count)?;
    assert_eq!(count, 2);
    assert_eq!(find_start(&fixture.store, "standup")?, at(9, 0));
    Ok(())
}

#[tokio::test]
async fn ranking_twice_returns_identical_lists() -> AppResult<()> {
    let fixture = setup()?;
    let mut intent = morning_intent("Retro");
    intent.constraints.must_be_before = Some(at(17, 0));
    intent.constraints.preferred_weekdays = vec![Weekday::Mon];

    let first = fixture
        .service
        .rank(&intent, &fixture.scope, &rank_options())
        .await?;
    let second = fixture
        .service
        .rank(&intent, &fixture.scope, &rank_options())
        .await?;
    assert_eq!(first, second);
    assert!(!first.is_empty());
    Ok(())
}

#[tokio::test]
async fn schedule_best_records_auto_selection_and_recurrence() -> AppResult<()> {
    let fixture = setup()?;
    let mut intent = morning_intent("Weekly 1:1");
    intent.recurrence = Some(RecurrenceRule {
        frequency: Frequency::Weekly,
        interval: 1,
        days_of_week: vec![Weekday::Mon],
        end: RecurrenceEnd::Count(10),
    });

    let result = fixture
        .service
        .schedule_best(&intent, &fixture.scope, &rank_options(), false)
        .await?;
    assert_eq!(
        result.stage_history,
        vec![
            SchedulingStage::Received,
            SchedulingStage::Generated,
            SchedulingStage::Scored,
            SchedulingStage::AutoSelectedTop,
            SchedulingStage::Committed,
        ]
    );
    assert!(!result.notified);

    let event_id = result.event_id.ok_or_else(AppError::not_found)?;
    let row = fixture
        .store
        .pool()
        .with_connection(|conn| EventRepository::find_by_id(conn, &event_id))?
        .ok_or_else(AppError::not_found)?;
    assert_eq!(
        row.recurrence_rule.as_deref(),
        Some("FREQ=WEEKLY;BYDAY=MO;COUNT=10")
    );
    assert_eq!(schedule_utils::parse_datetime(&row.start_at)?, at(11, 0));
    Ok(())
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify_scheduled(&self, _result: &ScheduleResult, _intent: &Intent) -> AppResult<()> {
        Err(AppError::other("mail relay down"))
    }
}

#[tokio::test]
async fn notification_failure_keeps_the_commit() -> AppResult<()> {
    let fixture = setup_with_notifier(Arc::new(FailingNotifier))?;
    let intent = morning_intent("Kickoff");

    let result = fixture
        .service
        .commit(
            &CandidateSlot::new(at(11, 0), at(12, 0)),
            &intent,
            &fixture.scope,
            &commit_options(false, true),
        )
        .await?;
    assert!(result.success);
    assert!(!result.notified);
    assert!(result.message.contains("notification"));

    let count = fixture.store.pool().with_connection(EventRepository::count)?;
    assert_eq!(count, 3);
    Ok(())
}

/// Serves a calendar view that predates a concurrent edit, so the commit's
/// optimistic check must fail.
struct StaleStore {
    inner: Arc<SqliteCalendarStore>,
    stale: Vec<ExistingEvent>,
}

#[async_trait]
impl CalendarStore for StaleStore {
    async fn list_events(
        &self,
        _scope: &WorkspaceScope,
        _owner_id: &str,
        _range: &TimeRange,
    ) -> AppResult<Vec<ExistingEvent>> {
        Ok(self.stale.clone())
    }

    async fn commit(
        &self,
        scope: &WorkspaceScope,
        batch: cognical_slots_lib::models::event::CommitBatch,
    ) -> AppResult<String> {
        self.inner.commit(scope, batch).await
    }
}

#[tokio::test]
async fn stale_plan_rolls_back_the_whole_batch() -> AppResult<()> {
    let fixture = setup()?;
    let stale = vec![
        event("standup", at(9, 0), at(9, 30), true),
        event("focus", at(10, 0), at(11, 0), false),
    ];

    fixture.store.pool().with_connection(|conn| {
        conn.execute(
            "UPDATE calendar_events SET start_at = ?1, end_at = ?2 WHERE id = 'standup'",
            [
                schedule_utils::format_datetime(at(13, 0)),
                schedule_utils::format_datetime(at(13, 30)),
            ],
        )?;
        Ok(())
    })?;

    let service = SchedulingService::new(
        Arc::new(StaleStore {
            inner: Arc::clone(&fixture.store),
            stale,
        }),
        Arc::new(LogNotifier),
        SchedulingSettings::default(),
    )?;

    let error = service
        .commit(
            &CandidateSlot::new(at(9, 0), at(10, 0)),
            &morning_intent("Planning"),
            &fixture.scope,
            &commit_options(true, false),
        )
        .await
        .unwrap_err();
    assert_eq!(error.code(), "COMMIT_FAILED");
    assert!(error.is_retryable());

    let count = fixture.store.pool().with_connection(EventRepository::count)?;
    assert_eq!(count, 2);
    assert_eq!(find_start(&fixture.store, "standup")?, at(13, 0));
    Ok(())
}

#[tokio::test]
async fn auto_resolve_never_picks_a_slot_inside_an_immovable_block() -> AppResult<()> {
    let dir = tempdir()?;
    let store = Arc::new(SqliteCalendarStore::new(DbPool::new(
        dir.path().join("calendar.sqlite"),
    )?));
    let scope = WorkspaceScope::personal("owner");
    store.seed(&scope, &event("conference", at(9, 0), at(18, 0), false))?;
    store.seed(&scope, &event("gym", at(19, 0), at(20, 0), true))?;
    let service = SchedulingService::new(store.clone(), Arc::new(LogNotifier), SchedulingSettings::default())?;

    let mut intent = Intent::new("Vendor call", 60);
    intent.constraints.must_be_after = Some(at(6, 0));
    intent.constraints.must_be_before = Some(at(18, 0));
    intent.constraints.not_after_minute = Some(17 * 60);
    let options = RankOptions {
        reference_time: Some(at(6, 0)),
        auto_resolve: true,
        ..RankOptions::default()
    };
    let conference = TimeRange::new(at(9, 0), at(18, 0));

    let slots = service.rank(&intent, &scope, &options).await?;
    assert!(!slots.is_empty());
    assert!(slots
        .iter()
        .all(|slot| !conference.contains(&slot.slot.interval())));

    let result = service.schedule_best(&intent, &scope, &options, false).await?;
    assert!(result.success);
    assert_eq!(result.stage, SchedulingStage::Committed);
    assert!(result
        .stage_history
        .contains(&SchedulingStage::AutoSelectedTop));
    assert!(result.applied_moves.is_empty());

    let event_id = result.event_id.ok_or_else(AppError::not_found)?;
    let start = find_start(&store, &event_id)?;
    assert!(start < at(9, 0));
    Ok(())
}
