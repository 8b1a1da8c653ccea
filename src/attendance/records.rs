//! Attendance record persistence
//!
//! Only the aggregator writes through [`upsert`]; the read helpers are shared
//! with the API.

use super::compute::DaySummary;
use crate::models::{AttendanceStatus, TrainerAttendance};
use crate::store::timestamp_column;
use crate::time::format_timestamp;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const RECORD_COLUMNS: &str =
    "id, trainer_id, date, total_duration_ms, status, session_ids, created_at, updated_at";

/// Insert or replace the derived fields of the (trainer, date) record.
/// Id and created_at survive re-aggregation.
pub fn upsert(
    conn: &Connection,
    trainer_id: &str,
    date: NaiveDate,
    summary: &DaySummary,
    status: AttendanceStatus,
    now: DateTime<Utc>,
) -> rusqlite::Result<TrainerAttendance> {
    let session_ids = serde_json::to_string(&summary.session_ids)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    let now = format_timestamp(now);

    conn.execute(
        "INSERT INTO trainer_attendance
            (id, trainer_id, date, total_duration_ms, status, session_ids, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
         ON CONFLICT(trainer_id, date) DO UPDATE SET
            total_duration_ms = excluded.total_duration_ms,
            status = excluded.status,
            session_ids = excluded.session_ids,
            updated_at = excluded.updated_at",
        params![
            uuid::Uuid::new_v4().to_string(),
            trainer_id,
            date.to_string(),
            summary.total_duration_ms,
            status.as_str(),
            session_ids,
            now,
        ],
    )?;

    get(conn, trainer_id, date)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get(
    conn: &Connection,
    trainer_id: &str,
    date: NaiveDate,
) -> rusqlite::Result<Option<TrainerAttendance>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM trainer_attendance WHERE trainer_id = ?1 AND date = ?2",
            RECORD_COLUMNS
        ),
        params![trainer_id, date.to_string()],
        row_to_record,
    )
    .optional()
}

/// Records for `trainer_id` with `from <= date <= to`, oldest first
pub fn list(
    conn: &Connection,
    trainer_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> rusqlite::Result<Vec<TrainerAttendance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM trainer_attendance
         WHERE trainer_id = ?1 AND date >= ?2 AND date <= ?3
         ORDER BY date ASC",
        RECORD_COLUMNS
    ))?;
    let records: rusqlite::Result<Vec<TrainerAttendance>> = stmt
        .query_map(
            params![trainer_id, from.to_string(), to.to_string()],
            row_to_record,
        )?
        .collect();
    records
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TrainerAttendance> {
    let date_raw: String = row.get(2)?;
    let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
        .map_err(|_| conversion_error(2, format!("invalid date: {}", date_raw)))?;
    let status_raw: String = row.get(4)?;
    let status = AttendanceStatus::parse(&status_raw)
        .ok_or_else(|| conversion_error(4, format!("invalid status: {}", status_raw)))?;
    let ids_raw: String = row.get(5)?;
    let session_ids: Vec<String> = serde_json::from_str(&ids_raw)
        .map_err(|e| conversion_error(5, format!("invalid session_ids: {}", e)))?;

    Ok(TrainerAttendance {
        id: row.get(0)?,
        trainer_id: row.get(1)?,
        date,
        total_duration_ms: row.get(3)?,
        status,
        session_ids,
        created_at: timestamp_column(row, 6)?,
        updated_at: timestamp_column(row, 7)?,
    })
}
