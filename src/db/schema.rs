//! SQLite schema for trainer sessions and attendance
//!
//! Timestamps are stored as RFC 3339 UTC strings with millisecond precision,
//! so lexical order matches chronological order.

use rusqlite::{Connection, Result};

/// Initialize the database with required tables
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS trainer_sessions (
            id TEXT PRIMARY KEY,
            trainer_id TEXT NOT NULL,
            start_time TEXT NOT NULL,
            last_heartbeat_at TEXT NOT NULL,
            end_time TEXT,
            status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'closed')),
            close_reason TEXT CHECK (close_reason IN ('ended', 'expired', 'swept')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK ((status = 'open') = (end_time IS NULL))
        )",
        [],
    )?;

    // One open session per trainer
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_trainer_sessions_one_open
         ON trainer_sessions(trainer_id) WHERE status = 'open'",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_trainer_sessions_trainer_start
         ON trainer_sessions(trainer_id, start_time)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_trainer_sessions_open_heartbeat
         ON trainer_sessions(last_heartbeat_at) WHERE status = 'open'",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS trainer_attendance (
            id TEXT PRIMARY KEY,
            trainer_id TEXT NOT NULL,
            date TEXT NOT NULL,
            total_duration_ms INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL CHECK (status IN ('Present', 'Half Day', 'Absent')),
            session_ids TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(trainer_id, date)
        )",
        [],
    )?;

    Ok(())
}
