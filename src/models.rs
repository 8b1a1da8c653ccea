//! Domain types for trainer sessions and daily attendance

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Session state; `Closed` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(SessionStatus::Open),
            "closed" => Some(SessionStatus::Closed),
            _ => None,
        }
    }
}

/// Why a session was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    /// Client called end
    Ended,
    /// A late heartbeat found the session stale
    Expired,
    /// The background sweep found the session stale
    Swept,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Ended => "ended",
            CloseReason::Expired => "expired",
            CloseReason::Swept => "swept",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ended" => Some(CloseReason::Ended),
            "expired" => Some(CloseReason::Expired),
            "swept" => Some(CloseReason::Swept),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainerSession {
    pub id: String,
    pub trainer_id: String,
    pub start_time: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub close_reason: Option<CloseReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainerSession {
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }

    /// Time since the last heartbeat, as seen at `now`
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_heartbeat_at
    }

    /// Wall-clock length of a closed session; zero while open
    pub fn duration_ms(&self) -> i64 {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds().max(0))
            .unwrap_or(0)
    }
}

/// Daily attendance verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    #[serde(rename = "Half Day")]
    HalfDay,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::HalfDay => "Half Day",
            AttendanceStatus::Absent => "Absent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Present" => Some(AttendanceStatus::Present),
            "Half Day" => Some(AttendanceStatus::HalfDay),
            "Absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainerAttendance {
    pub id: String,
    pub trainer_id: String,
    pub date: NaiveDate,
    pub total_duration_ms: i64,
    pub status: AttendanceStatus,
    pub session_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_round_trip_strings() {
        for status in [AttendanceStatus::Present, AttendanceStatus::HalfDay, AttendanceStatus::Absent] {
            assert_eq!(AttendanceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(
            serde_json::to_string(&AttendanceStatus::HalfDay).unwrap(),
            "\"Half Day\""
        );
        assert_eq!(SessionStatus::parse("bogus"), None);
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let session = TrainerSession {
            id: "s1".into(),
            trainer_id: "t1".into(),
            start_time: t,
            last_heartbeat_at: t,
            end_time: None,
            status: SessionStatus::Open,
            close_reason: None,
            created_at: t,
            updated_at: t,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["trainerId"], "t1");
        assert_eq!(json["status"], "open");
        assert!(json["endTime"].is_null());
        assert_eq!(session.duration_ms(), 0);
    }
}
