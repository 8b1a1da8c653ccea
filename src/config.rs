//! Configuration management for the trainer attendance service
//!
//! Loads settings from TOML file at ~/.trainer-attendance/config.toml

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Heartbeat timeout and attendance thresholds
    #[serde(default)]
    pub attendance: AttendanceConfig,

    /// Background sweep configuration
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Retry policy for attendance aggregation writes
    #[serde(default)]
    pub retry: RetryConfig,

    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Data directory (defaults to ~/.trainer-attendance)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".trainer-attendance"))
        .unwrap_or_else(|| PathBuf::from(".trainer-attendance"))
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port (default: 19430)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Server host (default: 127.0.0.1 - localhost only)
    #[serde(default = "default_host")]
    pub host: String,

    /// Optional API key for authentication
    /// Required in Authorization header if set: "Authorization: Bearer <key>"
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_port() -> u16 {
    19430
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            host: default_host(),
            api_key: None,
        }
    }
}

/// Session and attendance rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceConfig {
    /// Seconds without a heartbeat after which an open session is stale
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    /// Minutes of activity needed for a day to count as Present
    #[serde(default = "default_full_day_minutes")]
    pub full_day_minutes: u32,

    /// Minutes of activity needed for a day to count as Half Day
    #[serde(default = "default_half_day_minutes")]
    pub half_day_minutes: u32,

    /// Fixed offset from UTC used to cut days, in minutes (e.g. 330 for IST)
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_heartbeat_timeout() -> u64 {
    300
}

fn default_full_day_minutes() -> u32 {
    240
}

fn default_half_day_minutes() -> u32 {
    120
}

impl AttendanceConfig {
    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.heartbeat_timeout_secs as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_timeout_secs == 0 {
            return Err(CoreError::Config(
                "attendance.heartbeat_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.half_day_minutes > self.full_day_minutes {
            return Err(CoreError::Config(format!(
                "attendance.half_day_minutes ({}) must not exceed full_day_minutes ({})",
                self.half_day_minutes, self.full_day_minutes
            )));
        }
        // chrono::FixedOffset accepts strictly less than a day
        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(CoreError::Config(format!(
                "attendance.utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        AttendanceConfig {
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            full_day_minutes: default_full_day_minutes(),
            half_day_minutes: default_half_day_minutes(),
            utc_offset_minutes: 0,
        }
    }
}

/// Background sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Whether the stale-session sweep runs
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between stale-session sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Whether the day-finalization task runs
    #[serde(default = "default_true")]
    pub finalize_enabled: bool,

    /// Seconds between day-finalization passes
    #[serde(default = "default_finalize_interval")]
    pub finalize_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_finalize_interval() -> u64 {
    3600
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            enabled: true,
            interval_secs: default_sweep_interval(),
            finalize_enabled: true,
            finalize_interval_secs: default_finalize_interval(),
        }
    }
}

/// Exponential backoff for aggregation writes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Log output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling log files; stdout only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            attendance: AttendanceConfig::default(),
            sweep: SweepConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_path(path.as_ref());

        if !expanded_path.exists() {
            return Err(CoreError::Config(format!(
                "Configuration file not found: {}",
                expanded_path.display()
            )));
        }

        let content = std::fs::read_to_string(&expanded_path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|p| p.join(".trainer-attendance").join("config.toml"))
            .unwrap_or_else(|| PathBuf::from(".trainer-attendance/config.toml"))
    }

    /// Check every section for values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        self.attendance.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(CoreError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sweep.interval_secs == 0 || self.sweep.finalize_interval_secs == 0 {
            return Err(CoreError::Config(
                "sweep intervals must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the data directory, expanding ~ if present
    pub fn data_dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("attendance.db")
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> SocketAddr {
        use std::net::ToSocketAddrs;

        format!("{}:{}", self.server.host, self.server.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], self.server.port)))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep.interval_secs)
    }

    pub fn finalize_interval(&self) -> Duration {
        Duration::from_secs(self.sweep.finalize_interval_secs)
    }

    /// Apply environment variable overrides (server options only)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("TRAINER_ATTENDANCE_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("TRAINER_ATTENDANCE_SERVER_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(key) = std::env::var("TRAINER_ATTENDANCE_SERVER_API_KEY") {
            self.server.api_key = if key.is_empty() { None } else { Some(key) };
        }
        if let Ok(data_dir) = std::env::var("TRAINER_ATTENDANCE_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }
    }

    /// Create a default configuration file at the given path
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let content = r#"# Trainer Attendance Configuration

[server]
# Port to listen on (default: 19430)
port = 19430

# Host to bind to
# "127.0.0.1" = localhost only
# "0.0.0.0" = all interfaces (use with api_key!)
host = "127.0.0.1"

# Optional API key for authentication
# If set, clients must send: Authorization: Bearer <api_key>
# api_key = "your-secret-key"

[attendance]
# Open sessions without a heartbeat for this long are closed at their last heartbeat
heartbeat_timeout_secs = 300

# Daily totals at or above these are Present / Half Day, anything less is Absent
full_day_minutes = 240
half_day_minutes = 120

# Offset from UTC used to decide where a day starts and ends
utc_offset_minutes = 0

[sweep]
enabled = true
interval_secs = 60

# Re-aggregate today and yesterday for every trainer with sessions
finalize_enabled = true
finalize_interval_secs = 3600

[retry]
max_attempts = 4
initial_delay_ms = 50
max_delay_ms = 1000
backoff_multiplier = 2.0

[logging]
# dir = "~/.trainer-attendance/logs"
"#;

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        Ok(())
    }
}

/// Expand ~ to home directory in paths
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
