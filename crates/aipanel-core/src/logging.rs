//! Tracing subscriber setup for front-ends.
//!
//! Log output goes to a daily-rolling file under `${AIPANEL_HOME}/logs`;
//! stdout stays reserved for chat output.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogConfig, paths};

const LOG_FILE_PREFIX: &str = "aipanel.log";

/// Builds the filter: `RUST_LOG` when set, otherwise the configured level.
fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Installs the global subscriber.
///
/// Returns the writer guard when file logging is enabled; keep it alive
/// until exit so buffered lines are flushed. With file logging disabled
/// nothing is installed.
///
/// # Errors
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already set.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    if !config.file {
        return Ok(None);
    }
    init_in(config, &paths::logs_dir()).map(Some)
}

fn init_in(config: &LogConfig, dir: &Path) -> Result<WorkerGuard> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_disabled_file_logging_installs_nothing() {
        let config = LogConfig {
            file: false,
            ..LogConfig::default()
        };
        assert!(init(&config).unwrap().is_none());
    }

    #[test]
    fn test_init_creates_log_directory() {
        let dir = tempdir().unwrap();
        let logs = dir.path().join("logs");

        // Only one global subscriber per process; a second install fails but
        // the directory is still created first.
        let _ = init_in(&LogConfig::default(), &logs);
        assert!(logs.is_dir());
    }
}
