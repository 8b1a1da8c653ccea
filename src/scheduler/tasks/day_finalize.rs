//! Periodic day finalization
//!
//! Re-aggregates yesterday and today for every trainer with sessions on
//! those days. This reconciles any aggregation that failed on the close path.

use crate::lifecycle::SessionController;
use crate::scheduler::TaskResult;
use chrono::{DateTime, Duration, Utc};

pub async fn execute(controller: &SessionController) -> TaskResult {
    execute_at(controller, Utc::now()).await
}

pub async fn execute_at(controller: &SessionController, now: DateTime<Utc>) -> TaskResult {
    let aggregator = controller.aggregator();
    let today = aggregator.date_of(now);
    let days = [today - Duration::days(1), today];

    let mut trainers = 0usize;
    let mut aggregated = 0usize;
    let mut errors = 0usize;

    for date in days {
        match aggregator.finalize_day_at(date, now).await {
            Ok(report) => {
                trainers += report.trainers;
                aggregated += report.aggregated;
                errors += report.errors;
            }
            Err(e) => {
                tracing::error!("Failed to finalize attendance for {}: {}", date, e);
                errors += 1;
            }
        }
    }

    TaskResult {
        task_name: "day_finalize".to_string(),
        items_processed: trainers,
        items_affected: aggregated,
        errors,
        detail: format!(
            "{} trainer-days aggregated for {} and {}",
            aggregated, days[0], days[1]
        ),
    }
}
