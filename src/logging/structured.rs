// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Subscriber installation for the tracing macros in [`crate::logging`]
//!
//! Human-readable lines always go to the console. With `local_enabled`, the
//! same events are appended as JSON to `<local_path>/datawh.log.<period>`
//! through a background writer thread.

use crate::config::LoggingConfig;
use crate::domain::errors::EtlError;
use crate::domain::Result;
use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log file name prefix inside the log directory
pub const LOG_FILE_PREFIX: &str = "datawh.log";

/// Keeps the file writer thread alive; buffered lines are flushed on drop
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard(Option<WorkerGuard>);

impl LoggingGuard {
    /// Whether events are also being written to a log file
    pub fn writes_file(&self) -> bool {
        self.0.is_some()
    }
}

/// Installs the global subscriber
///
/// `RUST_LOG` takes precedence over `level` when it is set. Fails on an
/// unknown level name or when the log directory cannot be created.
pub fn init_logging(level: &str, config: &LoggingConfig) -> Result<LoggingGuard> {
    let level = parse_log_level(level)?;
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("datawh={level}")))
    };

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(filter());

    let (file, guard) = if config.local_enabled {
        let (writer, guard) = file_writer(config)?;
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_writer(writer)
            .with_filter(filter());
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry().with(console).with(file).init();

    tracing::info!(
        level = %level,
        local_enabled = config.local_enabled,
        local_path = %config.local_path,
        "Logging initialized"
    );
    Ok(LoggingGuard(guard))
}

fn file_writer(config: &LoggingConfig) -> Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(&config.local_path).map_err(|e| {
        EtlError::Configuration(format!(
            "Cannot create log directory {}: {e}",
            config.local_path
        ))
    })?;
    let appender = RollingFileAppender::new(
        parse_rotation(&config.local_rotation),
        &config.local_path,
        LOG_FILE_PREFIX,
    );
    Ok(tracing_appender::non_blocking(appender))
}

pub(crate) fn parse_log_level(name: &str) -> Result<Level> {
    name.parse::<Level>().map_err(|_| {
        EtlError::Configuration(format!(
            "Unknown log level '{name}', expected trace, debug, info, warn or error"
        ))
    })
}

/// Size-based rotation is approximated by daily files
fn parse_rotation(rotation: &str) -> Rotation {
    match rotation {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test_case("trace", Level::TRACE)]
    #[test_case("DEBUG", Level::DEBUG)]
    #[test_case("Info", Level::INFO)]
    #[test_case("warn", Level::WARN)]
    #[test_case("error", Level::ERROR)]
    fn test_known_levels(input: &str, expected: Level) {
        assert_eq!(parse_log_level(input).unwrap(), expected);
    }

    #[test_case("verbose")]
    #[test_case("")]
    fn test_unknown_level_is_a_configuration_error(input: &str) {
        assert!(matches!(
            parse_log_level(input),
            Err(EtlError::Configuration(_))
        ));
    }

    #[test_case("hourly", Rotation::HOURLY)]
    #[test_case("never", Rotation::NEVER)]
    #[test_case("daily", Rotation::DAILY)]
    #[test_case("size", Rotation::DAILY)]
    fn test_rotation(input: &str, expected: Rotation) {
        assert_eq!(parse_rotation(input), expected);
    }

    #[test]
    fn test_file_writer_creates_log_directory() {
        let dir = TempDir::new().unwrap();
        let config = LoggingConfig {
            local_enabled: true,
            local_path: dir.path().join("logs/etl").to_string_lossy().into_owned(),
            ..LoggingConfig::default()
        };

        let (_writer, guard) = file_writer(&config).unwrap();
        assert!(dir.path().join("logs/etl").is_dir());
        assert!(LoggingGuard(Some(guard)).writes_file());
        assert!(!LoggingGuard(None).writes_file());
    }
}
