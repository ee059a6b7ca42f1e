//! Logging for the model lifecycle service
//!
//! This crate installs the process-wide `tracing` subscriber: an `EnvFilter`
//! seeded from the configured level (overridden by `RUST_LOG`), a stdout
//! layer in human or JSON form, and an optional daily rolling JSON file.

use std::path::Path;

use service_config::LoggingConfig;
use thiserror::Error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix of rolled log files
pub const LOG_FILE_PREFIX: &str = "mlops-service.log";

/// Logging setup errors
#[derive(Error, Debug)]
pub enum LoggingError {
    /// The filter directive could not be parsed
    #[error("Invalid log filter '{0}': {1}")]
    Filter(String, String),

    /// The log directory could not be prepared
    #[error("Log directory error: {0}")]
    Io(#[from] std::io::Error),

    /// A global subscriber was already installed
    #[error("Failed to install subscriber: {0}")]
    Init(String),
}

/// Keeps the background file writer alive; flushes buffered lines on drop
#[derive(Default)]
pub struct LoggingGuard {
    file_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether a rolling file writer is attached
    pub fn has_file_output(&self) -> bool {
        self.file_guard.is_some()
    }
}

/// Builds the filter from `RUST_LOG`, falling back to the configured level
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| LoggingError::Filter(level.to_string(), e.to_string()))
}

/// Installs the global subscriber
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = build_filter(&config.level)?;

    let json_stdout = config.json.then(|| fmt::layer().json().with_current_span(true));
    let plain_stdout = (!config.json).then(|| fmt::layer().with_target(true).with_line_number(true));

    let mut guard = LoggingGuard::default();
    let file_layer = match &config.directory {
        Some(dir) => {
            let (writer, file_guard) = rolling_writer(dir)?;
            guard.file_guard = Some(file_guard);
            Some(fmt::layer().json().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_stdout)
        .with(plain_stdout)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    info!(
        level = %config.level,
        json = config.json,
        file = guard.has_file_output(),
        "Logging initialized"
    );
    Ok(guard)
}

fn rolling_writer(
    dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}
