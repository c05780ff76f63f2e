use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::event::{CommitBatch, EventMove, ExistingEvent, NewEvent, TimeRange, WorkspaceScope};
use crate::models::intent::Intent;
use crate::models::settings::SchedulingSettings;
use crate::models::suggestion::{
    CandidateSlot, RankOptions, ScheduleResult, SchedulingStage, SuggestedSlot,
};
use crate::services::calendar_store::CalendarStore;
use crate::services::candidate_generator;
use crate::services::conflict_detector;
use crate::services::intent_source::{IntentContext, IntentSource};
use crate::services::notifier::Notifier;
use crate::services::resolution_planner::ResolutionPlanner;
use crate::services::schedule_utils;
use crate::services::settings_service;
use crate::services::slot_ranker::{CalendarSnapshot, SlotRanker};

/// Options for committing a chosen slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommitOptions {
    /// Relocate movable conflicting events instead of rejecting the slot.
    #[serde(default)]
    pub auto_resolve: bool,
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub reference_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextSuggestion {
    pub intent: Intent,
    pub slots: Vec<SuggestedSlot>,
}

/// Records the per-request state machine and refuses illegal transitions.
#[derive(Debug, Clone)]
pub struct StageTracker {
    history: Vec<SchedulingStage>,
}

impl StageTracker {
    pub fn start(stage: SchedulingStage) -> Self {
        Self {
            history: vec![stage],
        }
    }

    pub fn current(&self) -> SchedulingStage {
        self.history
            .last()
            .copied()
            .unwrap_or(SchedulingStage::Received)
    }

    pub fn history(&self) -> &[SchedulingStage] {
        &self.history
    }

    pub fn advance(&mut self, next: SchedulingStage) -> AppResult<()> {
        let current = self.current();
        if !current.can_transition_to(next) {
            return Err(AppError::other(format!(
                "非法的调度状态转换: {current:?} -> {next:?}"
            )));
        }
        debug!(target: "app::scheduling", from = ?current, to = ?next, "stage transition");
        self.history.push(next);
        Ok(())
    }

    /// Moves to `Rejected` unless the request already reached a terminal stage.
    pub fn reject(&mut self, error: &AppError) {
        if self.current().is_terminal() {
            return;
        }
        info!(
            target: "app::scheduling",
            from = ?self.current(),
            code = error.code(),
            "scheduling request rejected"
        );
        self.history.push(SchedulingStage::Rejected);
    }
}

pub struct SchedulingService {
    store: Arc<dyn CalendarStore>,
    notifier: Arc<dyn Notifier>,
    settings: SchedulingSettings,
    timezone: Tz,
}

impl SchedulingService {
    pub fn new(
        store: Arc<dyn CalendarStore>,
        notifier: Arc<dyn Notifier>,
        settings: SchedulingSettings,
    ) -> AppResult<Self> {
        settings_service::validate(&settings)?;
        let timezone = settings_service::resolve_timezone(&settings)?;
        Ok(Self {
            store,
            notifier,
            settings,
            timezone,
        })
    }

    pub fn settings(&self) -> &SchedulingSettings {
        &self.settings
    }

    /// Ranked suggestions for `intent`. A pure read: calling it twice against
    /// unchanged calendars yields the same list.
    pub async fn rank(
        &self,
        intent: &Intent,
        scope: &WorkspaceScope,
        options: &RankOptions,
    ) -> AppResult<Vec<SuggestedSlot>> {
        let mut tracker = StageTracker::start(SchedulingStage::Received);
        match self.rank_tracked(intent, scope, options, &mut tracker).await {
            Ok(slots) => {
                tracker.advance(SchedulingStage::AwaitingSelection)?;
                Ok(slots)
            }
            Err(error) => {
                tracker.reject(&error);
                Err(error)
            }
        }
    }

    /// Commits a slot the caller picked from an earlier `rank` call. The
    /// calendar is re-read, so conflicts reflect the current state rather than
    /// the state at ranking time.
    pub async fn commit(
        &self,
        selected: &CandidateSlot,
        intent: &Intent,
        scope: &WorkspaceScope,
        options: &CommitOptions,
    ) -> AppResult<ScheduleResult> {
        let tracker = StageTracker::start(SchedulingStage::AwaitingSelection);
        self.commit_tracked(tracker, selected, intent, scope, options)
            .await
    }

    /// Ranks and commits the top suggestion in one request.
    pub async fn schedule_best(
        &self,
        intent: &Intent,
        scope: &WorkspaceScope,
        options: &RankOptions,
        notify: bool,
    ) -> AppResult<ScheduleResult> {
        let mut tracker = StageTracker::start(SchedulingStage::Received);
        let slots = match self.rank_tracked(intent, scope, options, &mut tracker).await {
            Ok(slots) => slots,
            Err(error) => {
                tracker.reject(&error);
                return Err(error);
            }
        };

        let Some(best) = slots.first() else {
            let error = AppError::no_candidates("没有可用的时间段");
            tracker.reject(&error);
            return Err(error);
        };
        tracker.advance(SchedulingStage::AutoSelectedTop)?;
        info!(
            target: "app::scheduling",
            start = %best.slot.start_at,
            score = best.composite_score,
            tier = best.tier.label(),
            "top slot auto-selected"
        );

        let commit_options = CommitOptions {
            auto_resolve: options.auto_resolve,
            notify,
            reference_time: options.reference_time,
        };
        self.commit_tracked(tracker, &best.slot, intent, scope, &commit_options)
            .await
    }

    pub async fn suggest_from_text(
        &self,
        source: &dyn IntentSource,
        text: &str,
        scope: &WorkspaceScope,
        options: &RankOptions,
    ) -> AppResult<TextSuggestion> {
        let context = IntentContext {
            timezone: self.settings.timezone.clone(),
            reference_time: options.reference_time.unwrap_or_else(Utc::now),
        };
        let intent = source.extract(text, &context).await?;
        let slots = self.rank(&intent, scope, options).await?;
        Ok(TextSuggestion { intent, slots })
    }

    async fn rank_tracked(
        &self,
        intent: &Intent,
        scope: &WorkspaceScope,
        options: &RankOptions,
        tracker: &mut StageTracker,
    ) -> AppResult<Vec<SuggestedSlot>> {
        intent.validate()?;
        let duration = intent.effective_duration(self.settings.default_duration_minutes)?;
        let now = options.reference_time.unwrap_or_else(Utc::now);

        let window_days = options
            .search_window_days
            .unwrap_or(self.settings.search_window_days);
        let window = candidate_generator::search_window(intent, now, window_days)?;
        let candidates =
            candidate_generator::generate_candidates(intent, duration, window, &self.settings, self.timezone)?;
        if candidates.is_empty() {
            return Err(AppError::no_candidates(format!(
                "{} 至 {} 之间没有满足约束的时间段",
                schedule_utils::format_datetime(window.start_at),
                schedule_utils::format_datetime(window.end_at)
            )));
        }
        tracker.advance(SchedulingStage::Generated)?;

        let snapshot = self
            .fetch_snapshot(scope, intent, &padded(&window))
            .await?;

        let ranker = SlotRanker::new(&self.settings, self.timezone, now);
        let ranked = ranker.rank(intent, &candidates.candidates, &snapshot, options)?;
        tracker.advance(SchedulingStage::Scored)?;

        Ok(ranked.slots)
    }

    async fn commit_tracked(
        &self,
        mut tracker: StageTracker,
        selected: &CandidateSlot,
        intent: &Intent,
        scope: &WorkspaceScope,
        options: &CommitOptions,
    ) -> AppResult<ScheduleResult> {
        match self
            .commit_inner(&mut tracker, selected, intent, scope, options)
            .await
        {
            Ok(result) => Ok(result),
            Err(error) => {
                tracker.reject(&error);
                Err(error)
            }
        }
    }

    async fn commit_inner(
        &self,
        tracker: &mut StageTracker,
        selected: &CandidateSlot,
        intent: &Intent,
        scope: &WorkspaceScope,
        options: &CommitOptions,
    ) -> AppResult<ScheduleResult> {
        intent.validate()?;
        if selected.end_at <= selected.start_at {
            return Err(AppError::invalid_intent("所选时间段无效"));
        }
        let now = options.reference_time.unwrap_or_else(Utc::now);

        let owner_events = self
            .fetch_owner_events(scope, &padded(&selected.interval()))
            .await?;
        let conflicts = conflict_detector::detect_conflicts(selected, &owner_events, intent.priority);

        let moves: Vec<EventMove> = if conflicts.is_empty() {
            Vec::new()
        } else if options.auto_resolve {
            tracker.advance(SchedulingStage::Resolving)?;
            let planner = ResolutionPlanner::new(&self.settings, self.timezone, now);
            match planner.plan(intent, selected, &conflicts, &owner_events) {
                Ok(plan) => {
                    tracker.advance(SchedulingStage::Resolved)?;
                    plan.moves
                }
                Err(error) => {
                    tracker.advance(SchedulingStage::Failed)?;
                    return Err(error);
                }
            }
        } else {
            let hard: Vec<String> = conflicts
                .iter()
                .filter(|conflict| conflict.is_hard())
                .map(|conflict| conflict.event_id.clone())
                .collect();
            if !hard.is_empty() {
                return Err(AppError::slot_unavailable(
                    "所选时间段存在硬冲突，请选择其他时间或启用自动调整",
                    hard,
                ));
            }
            debug!(
                target: "app::scheduling",
                soft = conflicts.len(),
                "committing over soft conflicts"
            );
            Vec::new()
        };

        let new_event = NewEvent {
            id: Uuid::new_v4().to_string(),
            owner_id: scope.actor_id.clone(),
            title: intent.title.clone(),
            description: intent.description.clone(),
            location: intent.location.clone(),
            start_at: selected.start_at,
            end_at: selected.end_at,
            attendees: intent.attendees.clone(),
            priority: intent.priority,
            recurrence_rule: intent.recurrence.as_ref().map(|rule| rule.to_rrule()),
        };
        let tolerated_overlaps: Vec<String> = conflicts
            .iter()
            .map(|conflict| conflict.event_id.clone())
            .filter(|id| moves.iter().all(|event_move| &event_move.event_id != id))
            .collect();
        let batch = CommitBatch {
            new_event,
            moves: moves.clone(),
            tolerated_overlaps,
        };
        let event_id = self.store.commit(scope, batch).await?;
        tracker.advance(SchedulingStage::Committed)?;

        let mut result = ScheduleResult {
            success: true,
            event_id: Some(event_id),
            message: commit_message(intent, selected, &moves, self.timezone),
            applied_moves: moves,
            stage: tracker.current(),
            stage_history: tracker.history().to_vec(),
            notified: false,
        };

        if options.notify {
            match self.notifier.notify_scheduled(&result, intent).await {
                Ok(()) => result.notified = true,
                Err(error) => {
                    warn!(target: "app::scheduling", error = %error, "notification failed after commit");
                    result.message.push_str("; notification could not be delivered");
                }
            }
        }

        info!(
            target: "app::scheduling",
            event_id = ?result.event_id,
            moves = result.applied_moves.len(),
            notified = result.notified,
            "slot committed"
        );
        Ok(result)
    }

    async fn fetch_owner_events(
        &self,
        scope: &WorkspaceScope,
        range: &TimeRange,
    ) -> AppResult<Vec<ExistingEvent>> {
        self.bounded(self.store.list_events(scope, &scope.actor_id, range))
            .await?
    }

    /// Owner events are required; attendee calendars are best-effort. The
    /// whole fetch shares one deadline and fails closed when it passes.
    async fn fetch_snapshot(
        &self,
        scope: &WorkspaceScope,
        intent: &Intent,
        range: &TimeRange,
    ) -> AppResult<CalendarSnapshot> {
        let store = Arc::clone(&self.store);
        let attendees: Vec<&String> = intent
            .attendees
            .iter()
            .filter(|attendee| **attendee != scope.actor_id)
            .collect();

        let fetch = async {
            let owner = store.list_events(scope, &scope.actor_id, range);
            let others = join_all(attendees.iter().map(|attendee| {
                let store = Arc::clone(&store);
                async move { (attendee.to_string(), store.list_events(scope, attendee, range).await) }
            }));
            futures::join!(owner, others)
        };
        let (owner, others) = self.bounded(fetch).await?;

        let mut snapshot = CalendarSnapshot {
            owner_events: owner?,
            ..CalendarSnapshot::default()
        };
        for (attendee, outcome) in others {
            match outcome {
                Ok(events) => {
                    snapshot.attendee_events.insert(attendee, events);
                }
                Err(error) => {
                    warn!(
                        target: "app::scheduling",
                        attendee = %attendee,
                        error = %error,
                        "attendee calendar unavailable"
                    );
                    snapshot.unreachable_attendees.push(attendee);
                }
            }
        }

        debug!(
            target: "app::scheduling",
            owner_events = snapshot.owner_events.len(),
            attendees = snapshot.attendee_events.len(),
            unreachable = snapshot.unreachable_attendees.len(),
            "calendar snapshot loaded"
        );
        Ok(snapshot)
    }

    async fn bounded<F: Future>(&self, future: F) -> AppResult<F::Output> {
        let timeout_ms = self.settings.fetch_timeout_ms;
        tokio::time::timeout(StdDuration::from_millis(timeout_ms), future)
            .await
            .map_err(|_| AppError::data_fetch_timeout(timeout_ms))
    }
}

/// Fetch range around `range`, widened by a day on each side so buffer
/// scoring and same-day relocation see neighbouring events.
fn padded(range: &TimeRange) -> TimeRange {
    TimeRange::new(
        range.start_at - Duration::days(1),
        range.end_at + Duration::days(1),
    )
}

fn commit_message(intent: &Intent, slot: &CandidateSlot, moves: &[EventMove], tz: Tz) -> String {
    let start = slot.start_at.with_timezone(&tz).format("%a %Y-%m-%d %H:%M");
    if moves.is_empty() {
        format!("Scheduled \"{}\" for {}", intent.title, start)
    } else {
        format!(
            "Scheduled \"{}\" for {} after moving {} event(s)",
            intent.title,
            start,
            moves.len()
        )
    }
}
