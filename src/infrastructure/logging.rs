use crate::infrastructure::error::InfraError;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub const COMMAND_LOG_FILE: &str = "commands.log";

pub fn command_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(COMMAND_LOG_FILE)
}

/// Installs the global subscriber writing JSON lines to `logs/commands.log`.
/// `RUST_LOG` wins over `default_level`. Later calls leave the first
/// subscriber in place.
pub fn init_logging(logs_dir: &Path, default_level: &str) -> Result<(), InfraError> {
    fs::create_dir_all(logs_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(command_log_path(logs_dir))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|error| InfraError::InvalidConfig(format!("invalid log level: {error}")))?;

    let init_result = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init();

    if let Err(error) = init_result {
        tracing::debug!(error = %error, "tracing subscriber already set, continuing");
    }
    Ok(())
}
