//! Trainer attendance CLI - standalone session and attendance server

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trainer_attendance::config::expand_path;
use trainer_attendance::{Config, Core};

#[derive(Parser, Debug)]
#[command(name = "trainer-attendance")]
#[command(author = "LMS Team")]
#[command(version)]
#[command(about = "Trainer session tracking and daily attendance service", long_about = None)]
struct Args {
    /// Path to configuration file [default: ~/.trainer-attendance/config.toml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override server host
    #[arg(long)]
    host: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Initialize a new config file with defaults
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_path = args
        .config
        .as_deref()
        .map(expand_path)
        .unwrap_or_else(Config::default_path);

    // Handle --init flag before logging is configured from the file
    if args.init {
        let _log_guard = init_logging(args.verbose, None);
        if config_path.exists() {
            tracing::warn!("Config file already exists: {}", config_path.display());
            return Ok(());
        }
        Config::create_default(&config_path)?;
        tracing::info!("Created default config at: {}", config_path.display());
        return Ok(());
    }

    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        Config::default()
    };

    config.apply_env_overrides();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let _log_guard = init_logging(args.verbose, config.logging.dir.as_deref());
    if !config_path.exists() {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            config_path.display()
        );
    }

    let core = Core::new(config)?;
    tracing::info!("Database at {}", core.config.database_path().display());

    core.start_periodic_tasks();

    // Blocks until shutdown
    core.start_api_server().await?;

    Ok(())
}

/// Stdout logging, plus a daily-rolling file when a log directory is configured.
/// The returned guard must stay alive for file output to be flushed.
fn init_logging(
    verbose: bool,
    log_dir: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("trainer_attendance={},tower_http=debug", log_level).into()
    });

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(expand_path(dir), "attendance.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}
