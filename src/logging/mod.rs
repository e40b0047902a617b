// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - JSON-formatted file logs with rotation
//! - Configurable log levels, overridable through `RUST_LOG`
//! - Console output
//!
//! # Example
//!
//! ```no_run
//! use datawh::logging::init_logging;
//! use datawh::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

pub use structured::{init_logging, LoggingGuard};

/// Log the start of a run over a revision interval
///
/// # Example
///
/// ```no_run
/// use datawh::log_run_start;
/// use datawh::domain::{EtlDate, Revision, RevisionInterval};
///
/// let interval = RevisionInterval::new(
///     Revision::new(10).unwrap(),
///     Revision::new(12).unwrap(),
///     EtlDate::now(),
/// )
/// .unwrap();
/// log_run_start!(&interval);
/// ```
#[macro_export]
macro_rules! log_run_start {
    ($interval:expr) => {
        tracing::info!(
            interval = %$interval,
            etl_date = %$interval.etl_date(),
            "Starting run"
        )
    };
}

/// Log the completion of a run
///
/// # Example
///
/// ```no_run
/// use datawh::log_run_complete;
/// use std::time::Duration;
///
/// log_run_complete!(42, Duration::from_secs(10));
/// ```
#[macro_export]
macro_rules! log_run_complete {
    ($count:expr, $duration:expr) => {
        tracing::info!(
            count = $count,
            duration_ms = $duration.as_millis() as u64,
            "Run completed"
        )
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use datawh::log_error_with_context;
/// use datawh::domain::EtlError;
///
/// let error = EtlError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        )
    };
}

/// Log the ids a job skipped, with the first error seen
///
/// # Example
///
/// ```no_run
/// use datawh::log_skipped_ids;
/// use datawh::domain::EntityId;
///
/// let ids = vec![EntityId::new(4).unwrap()];
/// log_skipped_ids!("lab_batch", &ids, Some("Transform error: no batch name"));
/// ```
#[macro_export]
macro_rules! log_skipped_ids {
    ($job:expr, $ids:expr, $first_error:expr) => {
        if !$ids.is_empty() {
            tracing::warn!(
                job = %$job,
                count = $ids.len(),
                ids = ?$ids.iter().map(|id| id.value()).collect::<Vec<i64>>(),
                first_error = ?$first_error,
                "Skipped entities with recoverable errors"
            );
        }
    };
}

/// Log a retried lookup
///
/// # Example
///
/// ```no_run
/// use datawh::log_retry_attempt;
///
/// log_retry_attempt!(1, 2, "Entity 5 not found");
/// ```
#[macro_export]
macro_rules! log_retry_attempt {
    ($attempt:expr, $max_attempts:expr, $reason:expr) => {
        tracing::debug!(
            attempt = $attempt,
            max_attempts = $max_attempts,
            reason = %$reason,
            "Retrying lookup"
        )
    };
}
