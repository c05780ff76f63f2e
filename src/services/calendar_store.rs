use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::repositories::event_repository::{EventRepository, EventRow, MoveLogRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::event::{CommitBatch, ExistingEvent, TimeRange, WorkspaceScope};

/// Read and write access to calendar data for one workspace scope.
///
/// `commit` must apply the new event and every move as one unit: either all of
/// them land or none do.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn list_events(
        &self,
        scope: &WorkspaceScope,
        owner_id: &str,
        range: &TimeRange,
    ) -> AppResult<Vec<ExistingEvent>>;

    async fn commit(&self, scope: &WorkspaceScope, batch: CommitBatch) -> AppResult<String>;
}

#[derive(Clone)]
pub struct SqliteCalendarStore {
    db: Arc<DbPool>,
}

impl SqliteCalendarStore {
    pub fn new(db: DbPool) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }

    /// Places an existing event on a calendar; used to seed fixtures and imports.
    pub fn seed(&self, scope: &WorkspaceScope, event: &ExistingEvent) -> AppResult<()> {
        let row = EventRow::from_existing(event, scope.workspace_id.as_deref());
        self.db
            .with_connection(|conn| EventRepository::insert(conn, &row))
    }
}

#[async_trait]
impl CalendarStore for SqliteCalendarStore {
    async fn list_events(
        &self,
        scope: &WorkspaceScope,
        owner_id: &str,
        range: &TimeRange,
    ) -> AppResult<Vec<ExistingEvent>> {
        let db = Arc::clone(&self.db);
        let workspace_id = scope.workspace_id.clone();
        let owner_id = owner_id.to_string();
        let range = *range;

        tokio::task::spawn_blocking(move || -> AppResult<Vec<ExistingEvent>> {
            let rows = db.with_connection(|conn| {
                EventRepository::list_for_owner_in_range(
                    conn,
                    &owner_id,
                    workspace_id.as_deref(),
                    &range,
                )
            })?;
            debug!(target: "app::db", owner_id = %owner_id, count = rows.len(), "events loaded");
            rows.into_iter().map(EventRow::into_existing).collect()
        })
        .await
        .map_err(|err| AppError::other(format!("读取日历任务失败: {err}")))?
    }

    async fn commit(&self, scope: &WorkspaceScope, batch: CommitBatch) -> AppResult<String> {
        let db = Arc::clone(&self.db);
        let workspace_id = scope.workspace_id.clone();

        let outcome = tokio::task::spawn_blocking(move || -> AppResult<String> {
            let row = EventRow::from_new_event(&batch.new_event, workspace_id.as_deref())?;
            db.with_transaction(|tx| {
                EventRepository::insert(tx, &row)?;
                for event_move in &batch.moves {
                    EventRepository::apply_move(tx, event_move)?;
                    EventRepository::insert_move_log(tx, &MoveLogRow::from_move(event_move, &row.id))?;
                }

                let owner_id = batch.new_event.owner_id.as_str();
                let workspace_id = workspace_id.as_deref();
                let target = TimeRange::new(batch.new_event.start_at, batch.new_event.end_at);
                let mut allowed: Vec<&str> = batch.tolerated_overlaps.iter().map(String::as_str).collect();
                allowed.push(row.id.as_str());
                ensure_clear(tx, owner_id, workspace_id, &target, &allowed)?;
                for event_move in &batch.moves {
                    ensure_clear(tx, owner_id, workspace_id, &event_move.proposed, &[event_move.event_id.as_str()])?;
                }
                Ok(row.id.clone())
            })
        })
        .await
        .map_err(|err| AppError::commit_failed(format!("提交任务中断: {err}")))?;

        match outcome {
            Ok(event_id) => {
                info!(target: "app::db", event_id = %event_id, "calendar batch committed");
                Ok(event_id)
            }
            Err(error @ AppError::CommitFailed { .. }) => Err(error),
            Err(error) => {
                warn!(target: "app::db", error = %error, "calendar batch rolled back");
                Err(AppError::commit_failed(error.to_string()))
            }
        }
    }
}

/// Fails the batch when an event other than `allowed` now occupies `range`,
/// as happens when a concurrent commit landed after the caller's read.
fn ensure_clear(
    conn: &Connection,
    owner_id: &str,
    workspace_id: Option<&str>,
    range: &TimeRange,
    allowed: &[&str],
) -> AppResult<()> {
    let intruders: Vec<String> =
        EventRepository::list_for_owner_in_range(conn, owner_id, workspace_id, range)?
            .into_iter()
            .map(|row| row.id)
            .filter(|id| !allowed.contains(&id.as_str()))
            .collect();
    if intruders.is_empty() {
        return Ok(());
    }
    warn!(target: "app::db", ?intruders, "calendar changed since it was read");
    Err(AppError::commit_failed(format!(
        "时间段已被其他事件占用: {}",
        intruders.join(", ")
    )))
}
