// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Run summary and reporting
//!
//! This module defines structures for tracking and reporting run results.

use crate::core::etl::job::JobOutcome;
use crate::domain::change::EtlDate;
use crate::domain::errors::EtlError;
use crate::domain::ids::Revision;
use std::collections::BTreeMap;
use std::time::Duration;

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Run timestamp
    pub etl_date: EtlDate,

    /// Revision bounds `(last, current]`, absent for backfills
    pub revisions: Option<(Revision, Revision)>,

    /// Per-job outcomes in execution order
    pub jobs: Vec<JobOutcome>,

    /// Lines committed per table
    pub table_counts: BTreeMap<String, usize>,

    /// Total lines committed
    pub record_count: usize,

    /// Whether the watermark moved
    pub watermark_advanced: bool,

    /// Duration of the run
    pub duration: Duration,

    /// Recoverable errors reported by jobs
    pub errors: Vec<RunError>,
}

impl RunSummary {
    /// Create a new empty run summary
    pub fn new(etl_date: EtlDate) -> Self {
        Self {
            etl_date,
            revisions: None,
            jobs: Vec::new(),
            table_counts: BTreeMap::new(),
            record_count: 0,
            watermark_advanced: false,
            duration: Duration::from_secs(0),
            errors: Vec::new(),
        }
    }

    /// Set the revision bounds
    pub fn with_revisions(mut self, last: Revision, current: Revision) -> Self {
        self.revisions = Some((last, current));
        self
    }

    /// Set the duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Add a job outcome, turning its skips into a run error
    pub fn add_job(&mut self, outcome: JobOutcome) {
        if let Some(message) = &outcome.first_error {
            self.add_error(
                RunError::new(RunErrorType::Transform, message.clone()).with_context(format!(
                    "job={}, skipped={}",
                    outcome.job,
                    outcome.skipped.len()
                )),
            );
        }
        self.jobs.push(outcome);
    }

    /// Add an error
    pub fn add_error(&mut self, error: RunError) {
        self.errors.push(error);
    }

    /// Set the committed counts
    pub fn set_table_counts(&mut self, table_counts: BTreeMap<String, usize>) {
        self.record_count = table_counts.values().sum();
        self.table_counts = table_counts;
    }

    /// Entities skipped across all jobs
    pub fn total_skipped(&self) -> usize {
        self.jobs.iter().map(|j| j.skipped.len()).sum()
    }

    /// Tombstones from lookup misses across all jobs
    pub fn total_reclassified(&self) -> usize {
        self.jobs.iter().map(|j| j.reclassified).sum()
    }

    /// Check if the run had no recoverable errors
    pub fn is_successful(&self) -> bool {
        self.errors.is_empty()
    }

    /// Log the summary
    pub fn log_summary(&self) {
        tracing::info!(
            etl_date = %self.etl_date,
            revisions = ?self.revisions.map(|(l, c)| (l.value(), c.value())),
            jobs = self.jobs.len(),
            records = self.record_count,
            skipped = self.total_skipped(),
            reclassified = self.total_reclassified(),
            watermark_advanced = self.watermark_advanced,
            duration_ms = self.duration.as_millis() as u64,
            "Run completed"
        );

        for (table, count) in &self.table_counts {
            tracing::debug!(table = %table, records = count, "Table written");
        }

        if !self.errors.is_empty() {
            tracing::warn!(error_count = self.errors.len(), "Run completed with errors");
            for error in &self.errors {
                tracing::warn!(
                    error_type = ?error.error_type,
                    message = %error.message,
                    context = ?error.context,
                    "Run error"
                );
            }
        }
    }
}

/// Type of run error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunErrorType {
    /// Store unavailable or failing
    Store,
    /// Output or state file I/O
    Io,
    /// Watermark or marker files
    State,
    /// Configuration error
    Configuration,
    /// Per-entity transformation error
    Transform,
    /// Unknown error
    Unknown,
}

/// Run error with context
#[derive(Debug, Clone)]
pub struct RunError {
    /// Type of error
    pub error_type: RunErrorType,

    /// Error message
    pub message: String,

    /// Optional context (job name, entity id)
    pub context: Option<String>,
}

impl RunError {
    /// Create a new run error
    pub fn new(error_type: RunErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            context: None,
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }
}

impl From<&EtlError> for RunError {
    fn from(error: &EtlError) -> Self {
        let error_type = match error {
            EtlError::Store(_) => RunErrorType::Store,
            EtlError::Io(_) => RunErrorType::Io,
            EtlError::State(_) => RunErrorType::State,
            EtlError::Configuration(_) => RunErrorType::Configuration,
            EtlError::Transform(_)
            | EtlError::MissingRelated(_)
            | EtlError::Validation(_)
            | EtlError::Serialization(_) => RunErrorType::Transform,
            EtlError::Other(_) => RunErrorType::Unknown,
        };
        RunError::new(error_type, error.to_string())
    }
}
