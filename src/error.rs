//! Error types for the trainer attendance service

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Not found error
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    /// A trainer already has an open session
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Heartbeat arrived after the timeout; the session was force-closed
    #[error("Session expired: {0}")]
    Expired(String),

    /// Transient persistence failure (busy/locked database, lost connection)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable(_))
    }

    /// Short machine-readable kind, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Database(_) => "database",
            CoreError::Io(_) => "io",
            CoreError::Config(_) => "config",
            CoreError::Json(_) => "json",
            CoreError::TomlParse(_) => "config",
            CoreError::NotFound(..) => "not_found",
            CoreError::Conflict(_) => "conflict",
            CoreError::Expired(_) => "expired",
            CoreError::StoreUnavailable(_) => "store_unavailable",
            CoreError::Validation(_) => "validation",
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                CoreError::StoreUnavailable(e.to_string())
            }
            _ => CoreError::Database(e),
        }
    }
}

/// True when the error is a UNIQUE/PRIMARY KEY constraint violation
pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_maps_to_store_unavailable() {
        let err: CoreError = sqlite_failure(rusqlite::ffi::SQLITE_BUSY).into();
        assert!(err.is_transient());
        assert_eq!(err.kind(), "store_unavailable");
    }

    #[test]
    fn test_other_sqlite_errors_are_permanent() {
        let err: CoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(!err.is_transient());
        assert_eq!(err.kind(), "database");
    }

    #[test]
    fn test_unique_violation_detection() {
        assert!(is_unique_violation(&sqlite_failure(
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )));
        assert!(!is_unique_violation(&sqlite_failure(
            rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL
        )));
    }
}
