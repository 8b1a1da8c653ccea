//! Periodic background task scheduler
//!
//! Manages background tasks that run at configurable intervals:
//! - **Stale sweep**: close open sessions that stopped sending heartbeats
//! - **Day finalization**: re-aggregate yesterday and today for all trainers
//!
//! Each task runs in its own tokio::spawn with an independent interval timer.
//! Tasks are staggered so they don't hit the database at the same moment.

pub mod tasks;

use crate::config::Config;
use crate::lifecycle::SessionController;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Result of a single scheduler task execution
pub struct TaskResult {
    pub task_name: String,
    pub items_processed: usize,
    pub items_affected: usize,
    pub errors: usize,
    pub detail: String,
}

/// Registered periodic tasks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScheduledTask {
    StaleSweep,
    DayFinalize,
}

impl ScheduledTask {
    fn name(&self) -> &'static str {
        match self {
            ScheduledTask::StaleSweep => "stale_sweep",
            ScheduledTask::DayFinalize => "day_finalize",
        }
    }

    fn is_enabled(&self, config: &Config) -> bool {
        match self {
            ScheduledTask::StaleSweep => config.sweep.enabled,
            ScheduledTask::DayFinalize => config.sweep.finalize_enabled,
        }
    }

    fn interval(&self, config: &Config) -> Duration {
        match self {
            ScheduledTask::StaleSweep => config.sweep_interval(),
            ScheduledTask::DayFinalize => config.finalize_interval(),
        }
    }

    async fn execute(&self, controller: &SessionController) -> TaskResult {
        match self {
            ScheduledTask::StaleSweep => tasks::stale_sweep::execute(controller).await,
            ScheduledTask::DayFinalize => tasks::day_finalize::execute(controller).await,
        }
    }
}

/// Start all enabled periodic tasks.
///
/// Returns the spawned task handles; dropping them leaves the tasks running.
pub fn start_scheduler(config: &Config, controller: SessionController) -> Vec<JoinHandle<()>> {
    let all_tasks = [ScheduledTask::StaleSweep, ScheduledTask::DayFinalize];
    let mut handles = Vec::new();

    for (idx, task) in all_tasks.into_iter().enumerate() {
        if !task.is_enabled(config) {
            tracing::info!("Scheduler: task '{}' is disabled", task.name());
            continue;
        }

        let interval = task.interval(config);
        tracing::info!(
            "Scheduler: starting task '{}' (every {}s)",
            task.name(),
            interval.as_secs()
        );

        let controller = controller.clone();
        let stagger = Duration::from_secs(idx as u64 * 5);

        handles.push(tokio::spawn(async move {
            tokio::time::sleep(stagger).await;

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            // Skip the first immediate tick (tasks run after the interval, not immediately)
            ticker.tick().await;

            loop {
                ticker.tick().await;
                tracing::debug!("Scheduler: running task '{}'", task.name());

                let result = task.execute(&controller).await;

                if result.errors > 0 {
                    tracing::warn!(
                        "Scheduler: task '{}' completed with {} errors: {}",
                        result.task_name,
                        result.errors,
                        result.detail
                    );
                } else if result.items_affected > 0 {
                    tracing::info!(
                        "Scheduler: task '{}' completed: {} ({} examined)",
                        result.task_name,
                        result.detail,
                        result.items_processed
                    );
                } else {
                    tracing::debug!("Scheduler: task '{}' completed (no changes)", task.name());
                }
            }
        }));
    }

    handles
}
