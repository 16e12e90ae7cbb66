//! Logging setup.
//!
//! Diagnostics go to stderr so that stdout carries only the measurement
//! report. With a log directory configured, a second layer writes a
//! daily-rotated file and files older than the retention period are
//! removed at startup.

use std::fs;
use std::io;
use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::LatencyError;

const LOG_FILE_NAME: &str = "tslatency.log";

/// Install the global subscriber and bridge `log` macros into it.
///
/// The returned guard flushes the file writer on drop; hold it until exit.
pub fn init_logging(
    config: &LoggingConfig,
    verbose: bool,
) -> Result<Option<WorkerGuard>, LatencyError> {
    let level = if verbose {
        "debug"
    } else {
        config.level.as_deref().unwrap_or("info")
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match &config.log_dir {
        Some(log_dir) => {
            fs::create_dir_all(log_dir).map_err(|e| {
                LatencyError::Logging(format!("Failed to create {}: {}", log_dir.display(), e))
            })?;
            clean_old_logs(log_dir, config.retention_days)
                .map_err(|e| LatencyError::Logging(format!("Failed to clean old logs: {}", e)))?;

            let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_timer(LocalTimeTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_level(true)
                .with_thread_ids(false)
                .with_timer(LocalTimeTimer),
        )
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LatencyError::Logging(format!("Failed to set default subscriber: {}", e)))?;

    tracing_log::LogTracer::init()
        .map_err(|e| LatencyError::Logging(format!("Failed to initialize LogTracer: {}", e)))?;

    Ok(guard)
}

/// Remove rotated log files older than `retention_days`.
fn clean_old_logs(log_dir: &Path, retention_days: u64) -> io::Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let cutoff = Local::now() - chrono::Duration::days(retention_days as i64);

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name.starts_with(LOG_FILE_NAME));
        if !path.is_file() || !is_ours {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => chrono::DateTime::<Local>::from(modified),
            Err(_) => continue,
        };
        if modified < cutoff {
            if let Err(e) = fs::remove_file(&path) {
                eprintln!("Failed to remove old log file {:?}: {}", path, e);
            }
        }
    }

    Ok(())
}

/// Local time, microsecond precision.
#[derive(Debug, Clone, Copy)]
struct LocalTimeTimer;

impl fmt::time::FormatTime for LocalTimeTimer {
    fn format_time(&self, w: &mut fmt::format::Writer) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_old_logs_keeps_fresh_and_foreign_files() {
        let dir = std::env::temp_dir().join(format!("tslatency-logs-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let ours = dir.join("tslatency.log.2026-01-01");
        let foreign = dir.join("other.log");
        fs::write(&ours, b"x").unwrap();
        fs::write(&foreign, b"y").unwrap();

        clean_old_logs(&dir, 7).unwrap();
        assert!(ours.exists());
        assert!(foreign.exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_clean_old_logs_missing_dir() {
        let dir = std::env::temp_dir().join("tslatency-logs-does-not-exist");
        assert!(clean_old_logs(&dir, 7).is_ok());
    }
}
