use async_trait::async_trait;
use tracing::info;

use crate::error::AppResult;
use crate::models::intent::Intent;
use crate::models::suggestion::ScheduleResult;

/// Delivers "your event was scheduled" messages. Failures are reported back to
/// the caller but never undo a commit.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_scheduled(&self, result: &ScheduleResult, intent: &Intent) -> AppResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_scheduled(&self, result: &ScheduleResult, intent: &Intent) -> AppResult<()> {
        info!(
            target: "app::scheduling",
            event_id = ?result.event_id,
            title = %intent.title,
            attendees = intent.attendees.len(),
            moves = result.applied_moves.len(),
            "scheduled event notification"
        );
        Ok(())
    }
}
