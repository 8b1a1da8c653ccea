//! Session lifecycle: start, heartbeat, end, and the stale-session sweep.
//!
//! A session moves `Open -> Closed` exactly once. Every path that closes a
//! session (end, late heartbeat, sweep) goes through the store's conditional
//! close, and only the caller that wins that update runs aggregation. A
//! failed aggregation is logged and never fails the triggering call, since
//! attendance can be rebuilt from the sessions at any time.

use crate::attendance::Aggregator;
use crate::config::Config;
use crate::db::Database;
use crate::error::{CoreError, Result};
use crate::models::{CloseReason, SessionStatus, TrainerSession};
use crate::store::SessionStore;
use crate::time::{format_duration_ms, range_bounds, truncate_to_storage};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::sync::Arc;

/// Outcome of one sweep pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale open sessions found
    pub scanned: usize,
    /// Sessions this pass actually closed
    pub closed: usize,
    pub errors: usize,
}

#[derive(Clone)]
pub struct SessionController {
    store: SessionStore,
    aggregator: Aggregator,
    heartbeat_timeout: Duration,
}

impl SessionController {
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        SessionController {
            store: SessionStore::new(db.clone()),
            aggregator: Aggregator::new(db, config),
            heartbeat_timeout: config.attendance.heartbeat_timeout(),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub async fn start_session(&self, trainer_id: &str) -> Result<TrainerSession> {
        self.start_session_at(trainer_id, Utc::now()).await
    }

    /// Open a new session for `trainer_id`. `Conflict` if one is already open.
    pub async fn start_session_at(
        &self,
        trainer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TrainerSession> {
        let now = truncate_to_storage(now);
        let trainer_id = trainer_id.trim();
        if trainer_id.is_empty() {
            return Err(CoreError::Validation("trainerId is required".to_string()));
        }

        if let Some(open) = self.store.find_open_by_trainer(trainer_id).await? {
            return Err(CoreError::Conflict(format!(
                "trainer {} already has open session {}",
                trainer_id, open.id
            )));
        }

        let session = TrainerSession {
            id: uuid::Uuid::new_v4().to_string(),
            trainer_id: trainer_id.to_string(),
            start_time: now,
            last_heartbeat_at: now,
            end_time: None,
            status: SessionStatus::Open,
            close_reason: None,
            created_at: now,
            updated_at: now,
        };

        // The unique index rejects a concurrent start that slipped past the check above
        self.store.insert(&session).await?;

        tracing::info!("Started session {} for trainer {}", session.id, trainer_id);
        Ok(session)
    }

    pub async fn heartbeat(&self, session_id: &str) -> Result<TrainerSession> {
        self.heartbeat_at(session_id, Utc::now()).await
    }

    /// Extend an open session. A heartbeat arriving after the timeout closes
    /// the session at its previous heartbeat and returns `Expired`.
    pub async fn heartbeat_at(&self, session_id: &str, now: DateTime<Utc>) -> Result<TrainerSession> {
        let now = truncate_to_storage(now);
        let mut session = self.open_session(session_id).await?;

        if session.idle_for(now) > self.heartbeat_timeout {
            if self.expire(&session, now).await? {
                return Err(CoreError::Expired(format!(
                    "session {} missed its heartbeat window",
                    session_id
                )));
            }
            // Another heartbeat refreshed the session before the close
            session = self.open_session(session_id).await?;
        }

        let at = now.max(session.last_heartbeat_at);
        if !self.store.update_heartbeat(session_id, at).await? {
            return Err(not_found(session_id));
        }

        tracing::debug!("Heartbeat for session {}", session_id);
        session.last_heartbeat_at = at;
        session.updated_at = at;
        Ok(session)
    }

    pub async fn end_session(&self, session_id: &str) -> Result<TrainerSession> {
        self.end_session_at(session_id, Utc::now()).await
    }

    /// Close an open session at `now` and aggregate its day. A session already
    /// past its heartbeat timeout is closed at its last heartbeat instead,
    /// so idle time is never credited.
    pub async fn end_session_at(&self, session_id: &str, now: DateTime<Utc>) -> Result<TrainerSession> {
        let now = truncate_to_storage(now);
        let mut session = self.open_session(session_id).await?;

        if session.idle_for(now) > self.heartbeat_timeout {
            if self.expire(&session, now).await? {
                let end_time = session.last_heartbeat_at;
                return Ok(closed(session, end_time, CloseReason::Expired, now));
            }
            session = self.open_session(session_id).await?;
        }

        let end_time = now.max(session.start_time);
        if !self
            .close_and_aggregate(&session, end_time, CloseReason::Ended, now)
            .await?
        {
            return Err(not_found(session_id));
        }

        let session = closed(session, end_time, CloseReason::Ended, now);
        tracing::info!(
            "Ended session {} for trainer {} ({})",
            session.id,
            session.trainer_id,
            format_duration_ms(session.duration_ms())
        );
        Ok(session)
    }

    pub async fn sweep_stale(&self) -> Result<SweepReport> {
        self.sweep_stale_at(Utc::now()).await
    }

    /// Close every open session whose last heartbeat is older than the
    /// timeout, at that heartbeat
    pub async fn sweep_stale_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let now = truncate_to_storage(now);
        let cutoff = now - self.heartbeat_timeout;
        let stale = self.store.find_stale_open(cutoff).await?;

        let mut report = SweepReport {
            scanned: stale.len(),
            ..Default::default()
        };

        for session in stale {
            match self
                .close_and_aggregate(&session, session.last_heartbeat_at, CloseReason::Swept, now)
                .await
            {
                Ok(true) => {
                    tracing::info!(
                        "Swept stale session {} for trainer {}",
                        session.id,
                        session.trainer_id
                    );
                    report.closed += 1;
                }
                // Ended, expired or heartbeated between the scan and our update
                Ok(false) => {}
                Err(e) => {
                    tracing::error!("Failed to sweep session {}: {}", session.id, e);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<TrainerSession> {
        self.store
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Session", session_id.to_string()))
    }

    pub async fn current_session(&self, trainer_id: &str) -> Result<Option<TrainerSession>> {
        self.store.find_open_by_trainer(trainer_id.trim()).await
    }

    /// Closed sessions starting within `from..=to`, oldest first
    pub async fn session_history(
        &self,
        trainer_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TrainerSession>> {
        if from > to {
            return Err(CoreError::Validation(format!(
                "from ({}) is after to ({})",
                from, to
            )));
        }

        let (start, end) = range_bounds(from, to, self.aggregator.offset());
        let sessions = self
            .store
            .find_by_trainer_and_date_range(trainer_id.trim(), start, end)
            .await?;

        Ok(sessions.into_iter().filter(|s| !s.is_open()).collect())
    }

    async fn open_session(&self, session_id: &str) -> Result<TrainerSession> {
        match self.store.find_by_id(session_id).await? {
            Some(session) if session.is_open() => Ok(session),
            _ => Err(not_found(session_id)),
        }
    }

    /// Close a timed-out session at its last heartbeat. Returns false when
    /// the session was closed or heartbeated by someone else first.
    async fn expire(&self, session: &TrainerSession, now: DateTime<Utc>) -> Result<bool> {
        let closed = self
            .close_and_aggregate(session, session.last_heartbeat_at, CloseReason::Expired, now)
            .await?;
        if closed {
            tracing::info!(
                "Session {} expired after {}s idle, closed at last heartbeat",
                session.id,
                session.idle_for(now).num_seconds()
            );
        }
        Ok(closed)
    }

    /// Conditionally close `session`; the winner aggregates its day.
    /// Returns whether this call performed the close.
    ///
    /// Closes at the last heartbeat (expiry, sweep) only win while that
    /// heartbeat is still the latest one.
    async fn close_and_aggregate(
        &self,
        session: &TrainerSession,
        end_time: DateTime<Utc>,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let expected_heartbeat = match reason {
            CloseReason::Ended => None,
            CloseReason::Expired | CloseReason::Swept => Some(session.last_heartbeat_at),
        };
        if !self
            .store
            .close(&session.id, end_time, reason, expected_heartbeat, now)
            .await?
        {
            return Ok(false);
        }

        let date = self.aggregator.date_of(session.start_time);
        if let Err(e) = self
            .aggregator
            .aggregate_at(&session.trainer_id, date, now)
            .await
        {
            tracing::warn!(
                "Attendance aggregation failed for trainer {} on {} after closing {}: {}",
                session.trainer_id,
                date,
                session.id,
                e
            );
        }

        Ok(true)
    }
}

fn closed(
    mut session: TrainerSession,
    end_time: DateTime<Utc>,
    reason: CloseReason,
    now: DateTime<Utc>,
) -> TrainerSession {
    session.end_time = Some(end_time);
    session.status = SessionStatus::Closed;
    session.close_reason = Some(reason);
    session.updated_at = now;
    session
}

fn not_found(session_id: &str) -> CoreError {
    CoreError::NotFound("Open session", session_id.to_string())
}
