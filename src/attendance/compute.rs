//! Pure day-summary computation

use crate::config::AttendanceConfig;
use crate::models::{AttendanceStatus, TrainerSession};
use chrono::{DateTime, Utc};

/// Minimum daily totals for each status, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub full_day_ms: i64,
    pub half_day_ms: i64,
}

impl Thresholds {
    pub fn from_config(config: &AttendanceConfig) -> Self {
        Thresholds {
            full_day_ms: config.full_day_minutes as i64 * 60_000,
            half_day_ms: config.half_day_minutes as i64 * 60_000,
        }
    }

    pub fn status_for(&self, total_duration_ms: i64) -> AttendanceStatus {
        if total_duration_ms >= self.full_day_ms {
            AttendanceStatus::Present
        } else if total_duration_ms >= self.half_day_ms {
            AttendanceStatus::HalfDay
        } else {
            AttendanceStatus::Absent
        }
    }
}

/// Result of summing one day's sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaySummary {
    pub total_duration_ms: i64,
    /// Sessions with a non-zero contribution, in input order
    pub session_ids: Vec<String>,
}

/// Milliseconds of `session` inside `[day_start, day_end)`. Open sessions
/// contribute nothing.
pub fn contribution_ms(
    session: &TrainerSession,
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
) -> i64 {
    let Some(end) = session.end_time else {
        return 0;
    };
    let from = session.start_time.max(day_start);
    let to = end.min(day_end);
    (to - from).num_milliseconds().max(0)
}

/// Sum contributions of sessions already ordered by start time
pub fn summarize(
    sessions: &[TrainerSession],
    day_start: DateTime<Utc>,
    day_end: DateTime<Utc>,
) -> DaySummary {
    let mut total_duration_ms = 0;
    let mut session_ids = Vec::new();

    for session in sessions {
        let ms = contribution_ms(session, day_start, day_end);
        if ms > 0 {
            total_duration_ms += ms;
            session_ids.push(session.id.clone());
        }
    }

    DaySummary {
        total_duration_ms,
        session_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CloseReason, SessionStatus};
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    fn closed(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> TrainerSession {
        TrainerSession {
            id: id.to_string(),
            trainer_id: "t1".to_string(),
            start_time: start,
            last_heartbeat_at: end,
            end_time: Some(end),
            status: SessionStatus::Closed,
            close_reason: Some(CloseReason::Ended),
            created_at: start,
            updated_at: end,
        }
    }

    #[test]
    fn test_thresholds() {
        let t = Thresholds {
            full_day_ms: 240 * 60_000,
            half_day_ms: 120 * 60_000,
        };
        assert_eq!(t.status_for(240 * 60_000), AttendanceStatus::Present);
        assert_eq!(t.status_for(239 * 60_000), AttendanceStatus::HalfDay);
        assert_eq!(t.status_for(120 * 60_000), AttendanceStatus::HalfDay);
        assert_eq!(t.status_for(0), AttendanceStatus::Absent);
    }

    #[test]
    fn test_contribution_clamps_to_day_end() {
        let day_start = at(0, 0);
        let day_end = day_start + Duration::days(1);
        let session = closed("late", at(23, 50), day_end + Duration::minutes(20));
        assert_eq!(contribution_ms(&session, day_start, day_end), 10 * 60_000);
    }

    #[test]
    fn test_open_and_empty_sessions_are_skipped() {
        let day_start = at(0, 0);
        let day_end = day_start + Duration::days(1);
        let mut open = closed("open", at(8, 0), at(8, 30));
        open.end_time = None;
        open.status = SessionStatus::Open;
        let zero = closed("zero", at(9, 0), at(9, 0));
        let real = closed("real", at(10, 0), at(10, 45));

        let summary = summarize(&[open, zero, real], day_start, day_end);
        assert_eq!(summary.total_duration_ms, 45 * 60_000);
        assert_eq!(summary.session_ids, vec!["real".to_string()]);
    }
}
