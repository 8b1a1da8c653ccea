//! Attendance aggregation
//!
//! Turns a trainer's closed sessions for one day into the single
//! `trainer_attendance` row for that (trainer, date). Every call recomputes
//! from the stored sessions, so repeated or concurrent calls converge on the
//! same record.
//!
//! Sessions belong to the day they start on. Time past the end of that day
//! is dropped rather than credited to the next day.

pub mod compute;
pub mod records;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::models::TrainerAttendance;
use crate::retry::{execute_with_retry, RetryPolicy};
use crate::store::SessionStore;
use crate::time::{day_bounds, day_offset, local_date};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use compute::{summarize, Thresholds};
use std::sync::Arc;

/// Outcome of finalizing one day across all trainers
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    pub trainers: usize,
    pub aggregated: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct Aggregator {
    db: Arc<Database>,
    store: SessionStore,
    thresholds: Thresholds,
    offset: FixedOffset,
    retry: RetryPolicy,
}

impl Aggregator {
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        Aggregator {
            store: SessionStore::new(db.clone()),
            db,
            thresholds: Thresholds::from_config(&config.attendance),
            offset: day_offset(config.attendance.utc_offset_minutes),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    /// Calendar date a timestamp falls on, in the configured offset
    pub fn date_of(&self, ts: DateTime<Utc>) -> NaiveDate {
        local_date(ts, self.offset)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Recompute and store the attendance record for (trainer, date)
    pub async fn aggregate(&self, trainer_id: &str, date: NaiveDate) -> Result<TrainerAttendance> {
        self.aggregate_at(trainer_id, date, Utc::now()).await
    }

    /// Same as [`Aggregator::aggregate`] with an explicit `updated_at`
    pub async fn aggregate_at(
        &self,
        trainer_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<TrainerAttendance> {
        let trainer_id = trainer_id.trim();
        execute_with_retry(&self.retry, "aggregate", move || {
            self.aggregate_once(trainer_id, date, now)
        })
        .await
    }

    async fn aggregate_once(
        &self,
        trainer_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<TrainerAttendance> {
        let (day_start, day_end) = day_bounds(date, self.offset);
        let sessions = self
            .store
            .find_by_trainer_and_date_range(trainer_id, day_start, day_end)
            .await?;

        let summary = summarize(&sessions, day_start, day_end);
        let status = self.thresholds.status_for(summary.total_duration_ms);

        tracing::debug!(
            "Aggregating trainer {} on {}: {} sessions, {} ms, {}",
            trainer_id,
            date,
            summary.session_ids.len(),
            summary.total_duration_ms,
            status.as_str()
        );

        let trainer_id = trainer_id.to_string();
        self.db
            .with_conn(move |conn| records::upsert(conn, &trainer_id, date, &summary, status, now))
            .await
    }

    /// Re-aggregate every trainer with a session starting on `date`
    pub async fn finalize_day(&self, date: NaiveDate) -> Result<FinalizeReport> {
        self.finalize_day_at(date, Utc::now()).await
    }

    pub async fn finalize_day_at(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<FinalizeReport> {
        let (day_start, day_end) = day_bounds(date, self.offset);
        let trainers = self
            .store
            .trainers_with_sessions_between(day_start, day_end)
            .await?;

        let mut report = FinalizeReport {
            trainers: trainers.len(),
            ..Default::default()
        };

        for trainer_id in trainers {
            match self.aggregate_at(&trainer_id, date, now).await {
                Ok(_) => report.aggregated += 1,
                Err(e) => {
                    tracing::error!(
                        "Failed to finalize attendance for trainer {} on {}: {}",
                        trainer_id,
                        date,
                        e
                    );
                    report.errors += 1;
                }
            }
            tokio::task::yield_now().await;
        }

        Ok(report)
    }

    pub async fn get_attendance(
        &self,
        trainer_id: &str,
        date: NaiveDate,
    ) -> Result<Option<TrainerAttendance>> {
        let trainer_id = trainer_id.trim().to_string();
        self.db
            .with_conn(move |conn| records::get(conn, &trainer_id, date))
            .await
    }

    pub async fn list_attendance(
        &self,
        trainer_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TrainerAttendance>> {
        let trainer_id = trainer_id.trim().to_string();
        self.db
            .with_conn(move |conn| records::list(conn, &trainer_id, from, to))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceStatus, CloseReason, SessionStatus, TrainerSession};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        store: SessionStore,
        aggregator: Aggregator,
    }

    fn fixture(full_day_minutes: u32, half_day_minutes: u32) -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut config = Config::default();
        config.attendance.full_day_minutes = full_day_minutes;
        config.attendance.half_day_minutes = half_day_minutes;
        Fixture {
            store: SessionStore::new(db.clone()),
            aggregator: Aggregator::new(db, &config),
        }
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    async fn closed_session(
        store: &SessionStore,
        id: &str,
        trainer: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) {
        let session = TrainerSession {
            id: id.to_string(),
            trainer_id: trainer.to_string(),
            start_time: start,
            last_heartbeat_at: start,
            end_time: None,
            status: SessionStatus::Open,
            close_reason: None,
            created_at: start,
            updated_at: start,
        };
        store.insert(&session).await.unwrap();
        assert!(store.close(id, end, CloseReason::Ended, None, end).await.unwrap());
    }

    #[tokio::test]
    async fn test_two_sessions_same_day() {
        let f = fixture(240, 60);
        closed_session(&f.store, "pm", "t1", at(1, 14, 0), at(1, 14, 30)).await;
        closed_session(&f.store, "am", "t1", at(1, 9, 0), at(1, 10, 0)).await;

        let record = f.aggregator.aggregate_at("t1", day(1), at(1, 15, 0)).await.unwrap();
        assert_eq!(record.total_duration_ms, 90 * 60_000);
        assert_eq!(record.session_ids, vec!["am".to_string(), "pm".to_string()]);
        assert_eq!(record.status, AttendanceStatus::HalfDay);
    }

    #[tokio::test]
    async fn test_aggregate_is_idempotent() {
        let f = fixture(240, 120);
        closed_session(&f.store, "s1", "t1", at(1, 9, 0), at(1, 13, 0)).await;

        let first = f.aggregator.aggregate_at("t1", day(1), at(1, 13, 0)).await.unwrap();
        let second = f.aggregator.aggregate_at("t1", day(1), at(1, 14, 0)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.total_duration_ms, second.total_duration_ms);
        assert_eq!(first.status, second.status);
        assert_eq!(first.session_ids, second.session_ids);
        assert_eq!(second.status, AttendanceStatus::Present);
        assert_eq!(second.updated_at, at(1, 14, 0));
    }

    #[tokio::test]
    async fn test_midnight_crossing_stays_on_start_day() {
        let f = fixture(240, 120);
        closed_session(&f.store, "late", "t1", at(1, 23, 50), at(2, 0, 30)).await;

        let day_one = f.aggregator.aggregate_at("t1", day(1), at(2, 1, 0)).await.unwrap();
        let day_two = f.aggregator.aggregate_at("t1", day(2), at(2, 1, 0)).await.unwrap();

        assert_eq!(day_one.total_duration_ms, 10 * 60_000);
        assert_eq!(day_one.session_ids, vec!["late".to_string()]);
        assert_eq!(day_two.total_duration_ms, 0);
        assert!(day_two.session_ids.is_empty());
        assert_eq!(day_two.status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn test_day_boundaries_follow_offset() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut config = Config::default();
        config.attendance.utc_offset_minutes = 330;
        let store = SessionStore::new(db.clone());
        let aggregator = Aggregator::new(db, &config);

        // 20:00 UTC on the 1st is 01:30 on the 2nd at +05:30
        closed_session(&store, "s1", "t1", at(1, 20, 0), at(1, 21, 0)).await;
        assert_eq!(aggregator.date_of(at(1, 20, 0)), day(2));

        let record = aggregator.aggregate_at("t1", day(2), at(1, 22, 0)).await.unwrap();
        assert_eq!(record.total_duration_ms, 60 * 60_000);
    }

    #[tokio::test]
    async fn test_finalize_day_covers_all_trainers() {
        let f = fixture(240, 120);
        closed_session(&f.store, "a", "t1", at(1, 9, 0), at(1, 10, 0)).await;
        closed_session(&f.store, "b", "t2", at(1, 9, 0), at(1, 17, 0)).await;
        closed_session(&f.store, "c", "t3", at(2, 9, 0), at(2, 10, 0)).await;

        let report = f.aggregator.finalize_day_at(day(1), at(2, 0, 5)).await.unwrap();
        assert_eq!(report.trainers, 2);
        assert_eq!(report.aggregated, 2);
        assert_eq!(report.errors, 0);

        let t2 = f.aggregator.get_attendance("t2", day(1)).await.unwrap().unwrap();
        assert_eq!(t2.status, AttendanceStatus::Present);
        assert!(f.aggregator.get_attendance("t3", day(1)).await.unwrap().is_none());

        let listed = f
            .aggregator
            .list_attendance("t1", day(1), day(1) + Duration::days(6))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
