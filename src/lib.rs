//! Trainer attendance - session heartbeat tracking and daily attendance
//!
//! This crate provides the trainer-session side of the LMS backend:
//! - Session lifecycle (start, heartbeat, end) with one open session per trainer
//! - Stale-session sweep that closes sessions at their last heartbeat
//! - Daily attendance aggregation (Present / Half Day / Absent)
//! - SQLite storage and an HTTP API
//!
//! # Usage
//!
//! As a library:
//! ```ignore
//! use trainer_attendance::{Config, Core};
//!
//! let core = Core::new(Config::default()).unwrap();
//! let session = core.controller().start_session("trainer-42").await?;
//! ```
//!
//! As a standalone server (CLI):
//! ```text
//! trainer-attendance --config ~/.trainer-attendance/config.toml
//! ```

pub mod api;
pub mod attendance;
pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod time;

// Re-export main types for convenience
pub use config::Config;
pub use db::Database;
pub use error::{CoreError, Result};
pub use lifecycle::SessionController;

use std::sync::Arc;

/// Core service that wires storage, lifecycle, scheduler, and API together
pub struct Core {
    /// Configuration
    pub config: Config,

    /// Database connection
    pub db: Arc<Database>,

    controller: SessionController,
}

impl Core {
    /// Create a new Core instance with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let db = Arc::new(Database::new(config.database_path())?);
        Ok(Self::with_database(config, db))
    }

    /// Create a Core instance with an existing database
    pub fn with_database(config: Config, db: Arc<Database>) -> Self {
        let controller = SessionController::new(db.clone(), &config);
        Core {
            config,
            db,
            controller,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Start the stale-session sweep and day-finalization tasks
    pub fn start_periodic_tasks(&self) {
        let handles = scheduler::start_scheduler(&self.config, self.controller.clone());
        tracing::info!("Started {} periodic tasks", handles.len());
    }

    /// Start the HTTP API server (blocks until shutdown)
    pub async fn start_api_server(&self) -> Result<()> {
        let addr = self.config.server_addr();
        tracing::info!("Starting API server on {}", addr);
        api::serve(
            addr,
            api::AppState {
                controller: self.controller.clone(),
                api_key: self.config.server.api_key.clone(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_core_opens_database_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = dir.path().to_path_buf();

        let core = Core::new(config).unwrap();
        assert!(dir.path().join("attendance.db").exists());

        let session = core.controller().start_session("T").await.unwrap();
        assert!(session.is_open());
    }

    #[test]
    fn test_core_rejects_invalid_config() {
        let mut config = Config::default();
        config.attendance.heartbeat_timeout_secs = 0;
        assert!(matches!(Core::new(config), Err(CoreError::Config(_))));
    }
}
