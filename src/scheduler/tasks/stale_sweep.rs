//! Periodic stale-session sweep
//!
//! Closes open sessions whose clients stopped sending heartbeats without
//! calling end. Uses the same conditional close as the request path, so a
//! concurrent end or heartbeat either wins or observes the sweep's close.

use crate::lifecycle::SessionController;
use crate::scheduler::TaskResult;

pub async fn execute(controller: &SessionController) -> TaskResult {
    match controller.sweep_stale().await {
        Ok(report) => TaskResult {
            task_name: "stale_sweep".to_string(),
            items_processed: report.scanned,
            items_affected: report.closed,
            errors: report.errors,
            detail: format!(
                "{} stale sessions found, {} closed",
                report.scanned, report.closed
            ),
        },
        Err(e) => TaskResult {
            task_name: "stale_sweep".to_string(),
            items_processed: 0,
            items_affected: 0,
            errors: 1,
            detail: format!("Failed to scan open sessions: {}", e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sweep_task_closes_abandoned_session() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut config = Config::default();
        config.attendance.heartbeat_timeout_secs = 60;
        let controller = SessionController::new(db, &config);

        let started = Utc::now() - Duration::minutes(10);
        let session = controller.start_session_at("T", started).await.unwrap();

        let result = execute(&controller).await;
        assert_eq!(result.task_name, "stale_sweep");
        assert_eq!(result.items_affected, 1);
        assert_eq!(result.errors, 0);

        let swept = controller.get_session(&session.id).await.unwrap();
        assert_eq!(swept.end_time, Some(session.last_heartbeat_at));
    }
}
