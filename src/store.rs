//! SessionStore - persistence boundary for trainer sessions.
//!
//! No business rules live here. The one-open-session-per-trainer invariant is
//! a partial unique index; `close` and `update_heartbeat` are conditional on
//! the row still being open, so concurrent writers see exactly one winner.

use crate::db::Database;
use crate::error::{is_unique_violation, CoreError, Result};
use crate::models::{CloseReason, SessionStatus, TrainerSession};
use crate::time::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

const SESSION_COLUMNS: &str = "id, trainer_id, start_time, last_heartbeat_at, end_time, status,
     close_reason, created_at, updated_at";

#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Database>,
}

impl SessionStore {
    pub fn new(db: Arc<Database>) -> Self {
        SessionStore { db }
    }

    /// Insert a new session. Fails with `Conflict` if the trainer already
    /// has an open one.
    pub async fn insert(&self, session: &TrainerSession) -> Result<()> {
        let session = session.clone();
        self.db
            .with_conn(move |conn| {
                let result = conn.execute(
                    "INSERT INTO trainer_sessions
                        (id, trainer_id, start_time, last_heartbeat_at, end_time, status,
                         close_reason, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        session.id,
                        session.trainer_id,
                        format_timestamp(session.start_time),
                        format_timestamp(session.last_heartbeat_at),
                        session.end_time.map(format_timestamp),
                        session.status.as_str(),
                        session.close_reason.map(|r| r.as_str()),
                        format_timestamp(session.created_at),
                        format_timestamp(session.updated_at),
                    ],
                );
                match result {
                    Ok(_) => Ok(()),
                    Err(e) if is_unique_violation(&e) => Err(CoreError::Conflict(format!(
                        "trainer {} already has an open session",
                        session.trainer_id
                    ))),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    pub async fn find_by_id(&self, session_id: &str) -> Result<Option<TrainerSession>> {
        let session_id = session_id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM trainer_sessions WHERE id = ?1", SESSION_COLUMNS),
                    [&session_id],
                    row_to_session,
                )
                .optional()
            })
            .await
    }

    pub async fn find_open_by_trainer(&self, trainer_id: &str) -> Result<Option<TrainerSession>> {
        let trainer_id = trainer_id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {} FROM trainer_sessions WHERE trainer_id = ?1 AND status = 'open'",
                        SESSION_COLUMNS
                    ),
                    [&trainer_id],
                    row_to_session,
                )
                .optional()
            })
            .await
    }

    /// Move `last_heartbeat_at` forward. Returns false if the session is no
    /// longer open.
    pub async fn update_heartbeat(&self, session_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let session_id = session_id.to_string();
        self.db
            .with_conn(move |conn| {
                let ts = format_timestamp(at);
                conn.execute(
                    "UPDATE trainer_sessions SET last_heartbeat_at = ?1, updated_at = ?1
                     WHERE id = ?2 AND status = 'open'",
                    params![ts, session_id],
                )
                .map(|changed| changed == 1)
            })
            .await
    }

    /// Close an open session. Returns true only for the caller whose update
    /// performed the transition.
    ///
    /// With `expected_heartbeat` set, the close also requires the session's
    /// last heartbeat to still be that value, so a heartbeat accepted after
    /// the caller read the row makes the close lose.
    pub async fn close(
        &self,
        session_id: &str,
        end_time: DateTime<Utc>,
        reason: CloseReason,
        expected_heartbeat: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let session_id = session_id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE trainer_sessions
                     SET end_time = ?1, status = 'closed', close_reason = ?2, updated_at = ?3
                     WHERE id = ?4 AND status = 'open'
                       AND (?5 IS NULL OR last_heartbeat_at = ?5)",
                    params![
                        format_timestamp(end_time),
                        reason.as_str(),
                        format_timestamp(now),
                        session_id,
                        expected_heartbeat.map(format_timestamp)
                    ],
                )
                .map(|changed| changed == 1)
            })
            .await
    }

    /// Sessions of one trainer whose start time lies in `[from, to)`,
    /// oldest first.
    pub async fn find_by_trainer_and_date_range(
        &self,
        trainer_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TrainerSession>> {
        let trainer_id = trainer_id.to_string();
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM trainer_sessions
                     WHERE trainer_id = ?1 AND start_time >= ?2 AND start_time < ?3
                     ORDER BY start_time ASC, id ASC",
                    SESSION_COLUMNS
                ))?;
                let sessions = stmt
                    .query_map(
                        params![trainer_id, format_timestamp(from), format_timestamp(to)],
                        row_to_session,
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok::<_, rusqlite::Error>(sessions)
            })
            .await
    }

    /// Open sessions whose last heartbeat is strictly before `cutoff`
    pub async fn find_stale_open(&self, cutoff: DateTime<Utc>) -> Result<Vec<TrainerSession>> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM trainer_sessions
                     WHERE status = 'open' AND last_heartbeat_at < ?1
                     ORDER BY last_heartbeat_at ASC",
                    SESSION_COLUMNS
                ))?;
                let sessions = stmt
                    .query_map([format_timestamp(cutoff)], row_to_session)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok::<_, rusqlite::Error>(sessions)
            })
            .await
    }

    /// Distinct trainers with at least one session starting in `[from, to)`
    pub async fn trainers_with_sessions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT trainer_id FROM trainer_sessions
                     WHERE start_time >= ?1 AND start_time < ?2
                     ORDER BY trainer_id",
                )?;
                let ids = stmt
                    .query_map([format_timestamp(from), format_timestamp(to)], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok::<_, rusqlite::Error>(ids)
            })
            .await
    }
}

fn invalid_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

pub(crate) fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw).ok_or_else(|| invalid_column(idx, format!("invalid timestamp: {}", raw)))
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<TrainerSession> {
    let end_time = match row.get::<_, Option<String>>(4)? {
        Some(raw) => Some(
            parse_timestamp(&raw)
                .ok_or_else(|| invalid_column(4, format!("invalid timestamp: {}", raw)))?,
        ),
        None => None,
    };
    let status_raw: String = row.get(5)?;
    let status = SessionStatus::parse(&status_raw)
        .ok_or_else(|| invalid_column(5, format!("invalid status: {}", status_raw)))?;
    let close_reason = row
        .get::<_, Option<String>>(6)?
        .and_then(|r| CloseReason::parse(&r));

    Ok(TrainerSession {
        id: row.get(0)?,
        trainer_id: row.get(1)?,
        start_time: timestamp_column(row, 2)?,
        last_heartbeat_at: timestamp_column(row, 3)?,
        end_time,
        status,
        close_reason,
        created_at: timestamp_column(row, 7)?,
        updated_at: timestamp_column(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(Database::open_in_memory().unwrap()))
    }

    fn open_session(id: &str, trainer: &str, start: DateTime<Utc>) -> TrainerSession {
        TrainerSession {
            id: id.to_string(),
            trainer_id: trainer.to_string(),
            start_time: start,
            last_heartbeat_at: start,
            end_time: None,
            status: SessionStatus::Open,
            close_reason: None,
            created_at: start,
            updated_at: start,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = store();
        store.insert(&open_session("s1", "t1", at(9, 0))).await.unwrap();

        let found = store.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(found.trainer_id, "t1");
        assert!(found.is_open());

        let open = store.find_open_by_trainer("t1").await.unwrap().unwrap();
        assert_eq!(open.id, "s1");
        assert!(store.find_open_by_trainer("t2").await.unwrap().is_none());
        assert!(store.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_open_insert_is_conflict() {
        let store = store();
        store.insert(&open_session("s1", "t1", at(9, 0))).await.unwrap();
        let err = store.insert(&open_session("s2", "t1", at(9, 1))).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_close_is_conditional() {
        let store = store();
        store.insert(&open_session("s1", "t1", at(9, 0))).await.unwrap();

        assert!(store.close("s1", at(9, 30), CloseReason::Ended, None, at(9, 30)).await.unwrap());
        assert!(!store.close("s1", at(9, 40), CloseReason::Swept, None, at(9, 40)).await.unwrap());
        assert!(!store.update_heartbeat("s1", at(9, 45)).await.unwrap());

        let closed = store.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(closed.end_time, Some(at(9, 30)));
        assert_eq!(closed.close_reason, Some(CloseReason::Ended));
        assert_eq!(closed.duration_ms(), 30 * 60_000);
    }

    #[tokio::test]
    async fn test_close_loses_to_newer_heartbeat() {
        let store = store();
        store.insert(&open_session("s1", "t1", at(9, 0))).await.unwrap();

        // scan sees the 09:00 heartbeat, then a heartbeat lands before the close
        let stale = store.find_stale_open(at(9, 6)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert!(store.update_heartbeat("s1", at(9, 5)).await.unwrap());

        let seen = stale[0].last_heartbeat_at;
        assert!(!store
            .close("s1", seen, CloseReason::Swept, Some(seen), at(9, 6))
            .await
            .unwrap());

        let session = store.find_by_id("s1").await.unwrap().unwrap();
        assert!(session.is_open());
        assert_eq!(session.last_heartbeat_at, at(9, 5));

        // with the current heartbeat the close goes through
        assert!(store
            .close("s1", at(9, 5), CloseReason::Swept, Some(at(9, 5)), at(9, 11))
            .await
            .unwrap());
        let closed = store.find_by_id("s1").await.unwrap().unwrap();
        assert_eq!(closed.end_time, Some(at(9, 5)));
    }

    #[tokio::test]
    async fn test_find_stale_open() {
        let store = store();
        let mut fresh = open_session("fresh", "t1", at(9, 0));
        fresh.last_heartbeat_at = at(9, 58);
        store.insert(&fresh).await.unwrap();
        store.insert(&open_session("stale", "t2", at(9, 0))).await.unwrap();

        let stale = store.find_stale_open(at(9, 55)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "stale");
    }

    #[tokio::test]
    async fn test_range_query_orders_by_start() {
        let store = store();
        for (id, h) in [("b", 14), ("a", 9), ("c", 23)] {
            store.insert(&open_session(id, "t1", at(h, 0))).await.unwrap();
            store.close(id, at(h, 30), CloseReason::Ended, None, at(h, 30)).await.unwrap();
        }

        let sessions = store
            .find_by_trainer_and_date_range("t1", at(0, 0), at(20, 0))
            .await
            .unwrap();
        let ids: Vec<_> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let trainers = store
            .trainers_with_sessions_between(at(0, 0), at(0, 0) + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(trainers, vec!["t1".to_string()]);
    }
}
