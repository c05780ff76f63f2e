use std::convert::TryFrom;

use chrono::Utc;
use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::event::{EventMove, ExistingEvent, NewEvent, TimeRange};
use crate::models::intent::PriorityTier;
use crate::services::schedule_utils::{format_datetime, parse_datetime};

const SELECT_COLUMNS: &str = r#"
    id,
    workspace_id,
    owner_id,
    title,
    description,
    location,
    start_at,
    end_at,
    movable,
    priority,
    attendees,
    recurrence_rule,
    created_at,
    updated_at
"#;

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: String,
    pub workspace_id: Option<String>,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_at: String,
    pub end_at: String,
    pub movable: bool,
    pub priority: String,
    pub attendees: Option<String>,
    pub recurrence_rule: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl EventRow {
    pub fn from_new_event(event: &NewEvent, workspace_id: Option<&str>) -> AppResult<Self> {
        let now = format_datetime(Utc::now());
        let attendees = if event.attendees.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&event.attendees)?)
        };

        Ok(Self {
            id: event.id.clone(),
            workspace_id: workspace_id.map(str::to_string),
            owner_id: event.owner_id.clone(),
            title: event.title.clone(),
            description: event.description.clone(),
            location: event.location.clone(),
            start_at: format_datetime(event.start_at),
            end_at: format_datetime(event.end_at),
            movable: true,
            priority: event.priority.as_str().to_string(),
            attendees,
            recurrence_rule: event.recurrence_rule.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Row for an event that already sits on a calendar; used to seed stores.
    pub fn from_existing(event: &ExistingEvent, workspace_id: Option<&str>) -> Self {
        let now = format_datetime(Utc::now());
        Self {
            id: event.id.clone(),
            workspace_id: workspace_id.map(str::to_string),
            owner_id: event.owner_id.clone(),
            title: event.title.clone(),
            description: None,
            location: None,
            start_at: format_datetime(event.start_at),
            end_at: format_datetime(event.end_at),
            movable: event.movable,
            priority: event.priority.as_str().to_string(),
            attendees: None,
            recurrence_rule: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn into_existing(self) -> AppResult<ExistingEvent> {
        Ok(ExistingEvent {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            start_at: parse_datetime(&self.start_at)?,
            end_at: parse_datetime(&self.end_at)?,
            movable: self.movable,
            priority: PriorityTier::parse(&self.priority)?,
        })
    }
}

impl TryFrom<&Row<'_>> for EventRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            workspace_id: row.get("workspace_id")?,
            owner_id: row.get("owner_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            location: row.get("location")?,
            start_at: row.get("start_at")?,
            end_at: row.get("end_at")?,
            movable: row.get::<_, i64>("movable")? != 0,
            priority: row.get("priority")?,
            attendees: row.get("attendees")?,
            recurrence_rule: row.get("recurrence_rule")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MoveLogRow {
    pub event_id: String,
    pub caused_by_event_id: String,
    pub from_start_at: String,
    pub from_end_at: String,
    pub to_start_at: String,
    pub to_end_at: String,
    pub justification: String,
    pub moved_at: String,
}

impl MoveLogRow {
    pub fn from_move(event_move: &EventMove, caused_by_event_id: &str) -> Self {
        Self {
            event_id: event_move.event_id.clone(),
            caused_by_event_id: caused_by_event_id.to_string(),
            from_start_at: format_datetime(event_move.current.start_at),
            from_end_at: format_datetime(event_move.current.end_at),
            to_start_at: format_datetime(event_move.proposed.start_at),
            to_end_at: format_datetime(event_move.proposed.end_at),
            justification: event_move.justification.clone(),
            moved_at: format_datetime(Utc::now()),
        }
    }
}

impl TryFrom<&Row<'_>> for MoveLogRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            event_id: row.get("event_id")?,
            caused_by_event_id: row.get("caused_by_event_id")?,
            from_start_at: row.get("from_start_at")?,
            from_end_at: row.get("from_end_at")?,
            to_start_at: row.get("to_start_at")?,
            to_end_at: row.get("to_end_at")?,
            justification: row.get("justification")?,
            moved_at: row.get("moved_at")?,
        })
    }
}

pub struct EventRepository;

impl EventRepository {
    pub fn insert(conn: &Connection, row: &EventRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO calendar_events (
                    id,
                    workspace_id,
                    owner_id,
                    title,
                    description,
                    location,
                    start_at,
                    end_at,
                    movable,
                    priority,
                    attendees,
                    recurrence_rule,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :workspace_id,
                    :owner_id,
                    :title,
                    :description,
                    :location,
                    :start_at,
                    :end_at,
                    :movable,
                    :priority,
                    :attendees,
                    :recurrence_rule,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":workspace_id": &row.workspace_id,
                ":owner_id": &row.owner_id,
                ":title": &row.title,
                ":description": &row.description,
                ":location": &row.location,
                ":start_at": &row.start_at,
                ":end_at": &row.end_at,
                ":movable": row.movable,
                ":priority": &row.priority,
                ":attendees": &row.attendees,
                ":recurrence_rule": &row.recurrence_rule,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<EventRow>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM calendar_events WHERE id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
            .query_row([id], |row| EventRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    /// Events of `owner_id` intersecting `range`. A `None` workspace matches
    /// personal events only.
    pub fn list_for_owner_in_range(
        conn: &Connection,
        owner_id: &str,
        workspace_id: Option<&str>,
        range: &TimeRange,
    ) -> AppResult<Vec<EventRow>> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM calendar_events
            WHERE owner_id = :owner_id
              AND workspace_id IS :workspace_id
              AND start_at < :range_end
              AND end_at > :range_start
            ORDER BY start_at ASC, id ASC
            "#
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            named_params! {
                ":owner_id": owner_id,
                ":workspace_id": workspace_id,
                ":range_start": format_datetime(range.start_at),
                ":range_end": format_datetime(range.end_at),
            },
            |row| EventRow::try_from(row),
        )?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Moves an event only if it still sits where the plan saw it and is still movable.
    pub fn apply_move(conn: &Connection, event_move: &EventMove) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE calendar_events SET
                    start_at = :to_start_at,
                    end_at = :to_end_at,
                    updated_at = :updated_at
                WHERE id = :id
                  AND start_at = :from_start_at
                  AND end_at = :from_end_at
                  AND movable = 1
            "#,
            named_params! {
                ":id": &event_move.event_id,
                ":from_start_at": format_datetime(event_move.current.start_at),
                ":from_end_at": format_datetime(event_move.current.end_at),
                ":to_start_at": format_datetime(event_move.proposed.start_at),
                ":to_end_at": format_datetime(event_move.proposed.end_at),
                ":updated_at": format_datetime(Utc::now()),
            },
        )?;

        if affected == 0 {
            return Err(AppError::commit_failed(format!(
                "事件 {} 已被修改或不可移动",
                event_move.event_id
            )));
        }

        Ok(())
    }

    pub fn insert_move_log(conn: &Connection, row: &MoveLogRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO event_move_log (
                    event_id,
                    caused_by_event_id,
                    from_start_at,
                    from_end_at,
                    to_start_at,
                    to_end_at,
                    justification,
                    moved_at
                ) VALUES (
                    :event_id,
                    :caused_by_event_id,
                    :from_start_at,
                    :from_end_at,
                    :to_start_at,
                    :to_end_at,
                    :justification,
                    :moved_at
                )
            "#,
            named_params! {
                ":event_id": &row.event_id,
                ":caused_by_event_id": &row.caused_by_event_id,
                ":from_start_at": &row.from_start_at,
                ":from_end_at": &row.from_end_at,
                ":to_start_at": &row.to_start_at,
                ":to_end_at": &row.to_end_at,
                ":justification": &row.justification,
                ":moved_at": &row.moved_at,
            },
        )?;
        Ok(())
    }

    pub fn list_move_log(conn: &Connection, event_id: &str) -> AppResult<Vec<MoveLogRow>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT
                event_id,
                caused_by_event_id,
                from_start_at,
                from_end_at,
                to_start_at,
                to_end_at,
                justification,
                moved_at
            FROM event_move_log
            WHERE event_id = ?1
            ORDER BY id ASC
        "#,
        )?;
        let rows = stmt.query_map([event_id], |row| MoveLogRow::try_from(row))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn count(conn: &Connection) -> AppResult<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM calendar_events", [], |row| row.get(0))?;
        Ok(count)
    }
}
