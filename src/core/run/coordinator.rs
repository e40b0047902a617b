// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Run coordination
//!
//! The coordinator owns the single-flight guard, picks the revision interval,
//! runs every registered job into one stream set and commits the streams, the
//! watermark and the ready marker only when every job succeeded.

use crate::adapters::store::RevisionClock;
use crate::core::etl::job::EtlJob;
use crate::core::etl::summary::RunSummary;
use crate::core::record::StreamSet;
use crate::core::state::{RunCommit, StateManager};
use crate::domain::change::{EtlDate, RevisionInterval};
use crate::domain::errors::EtlError;
use crate::domain::ids::{EntityId, EntityType, Revision};
use crate::domain::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};

/// Why a trigger did not start a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotRunReason {
    /// Another run holds the guard
    Busy { minutes: u64 },
    /// No data file directory is configured
    DirectoryNotConfigured,
    /// The data file directory does not exist
    DirectoryMissing(PathBuf),
    /// No watermark has been initialized
    WatermarkUnknown,
}

impl fmt::Display for NotRunReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotRunReason::Busy { minutes } => {
                write!(f, "another run has been busy for {minutes} minutes")
            }
            NotRunReason::DirectoryNotConfigured => write!(f, "datafile directory not configured"),
            NotRunReason::DirectoryMissing(dir) => {
                write!(f, "datafile directory {} does not exist", dir.display())
            }
            NotRunReason::WatermarkUnknown => write!(f, "watermark not initialized"),
        }
    }
}

/// Result of one trigger
#[derive(Debug)]
pub enum RunOutcome {
    Completed(RunSummary),
    NotRun(NotRunReason),
}

impl RunOutcome {
    /// Records written, or `None` when the run could not start
    pub fn record_count(&self) -> Option<usize> {
        match self {
            RunOutcome::Completed(summary) => Some(summary.record_count),
            RunOutcome::NotRun(_) => None,
        }
    }
}

enum Work<'a> {
    Interval(&'a RevisionInterval),
    Backfill { start: EntityId, end: EntityId },
}

/// Holds the guard for the duration of a run
struct ActiveRun<'a> {
    _permit: SemaphorePermit<'a>,
    since: &'a Mutex<Option<Instant>>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        *self.since.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Runs the registered jobs, one run at a time
pub struct RunCoordinator {
    jobs: Vec<Arc<dyn EtlJob>>,
    clock: Arc<dyn RevisionClock>,
    state: Arc<StateManager>,
    datafile_dir: Option<PathBuf>,
    guard: Semaphore,
    busy_since: Mutex<Option<Instant>>,
    missing_dir_logged: AtomicBool,
}

impl RunCoordinator {
    pub fn new(
        clock: Arc<dyn RevisionClock>,
        state: Arc<StateManager>,
        datafile_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            jobs: Vec::new(),
            clock,
            state,
            datafile_dir,
            guard: Semaphore::new(1),
            busy_since: Mutex::new(None),
            missing_dir_logged: AtomicBool::new(false),
        }
    }

    /// Adds a job; jobs run in registration order
    pub fn with_job(mut self, job: Arc<dyn EtlJob>) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.name()).collect()
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// Runs every job over `(watermark, current revision as of now]`
    ///
    /// # Errors
    ///
    /// Returns the first systemic error; streams are aborted and the
    /// watermark is left untouched.
    pub async fn run_incremental(&self, now: DateTime<Utc>) -> Result<RunOutcome> {
        let _active = match self.try_enter() {
            Ok(active) => active,
            Err(reason) => return Ok(RunOutcome::NotRun(reason)),
        };
        let dir = match self.output_dir() {
            Ok(dir) => dir,
            Err(reason) => return Ok(RunOutcome::NotRun(reason)),
        };
        let Some(watermark) = self.state.load_watermark().await? else {
            tracing::warn!("Watermark not initialized, seed it before the first incremental run");
            return Ok(RunOutcome::NotRun(NotRunReason::WatermarkUnknown));
        };

        let last = watermark.revision;
        let mut current = self.clock.current_revision_number(now).await?;
        if current < last {
            tracing::warn!(
                last = %last,
                current = %current,
                "Revision store is behind the watermark, nothing to do"
            );
            current = last;
        }

        let interval = RevisionInterval::new(last, current, EtlDate::new(now))?;
        let summary = self
            .execute(dir, interval.etl_date(), Work::Interval(&interval), None, Some(current))
            .await?;
        Ok(RunOutcome::Completed(summary.with_revisions(last, current)))
    }

    /// Runs every job over an explicit interval without moving the watermark
    pub async fn run_interval(
        &self,
        last: Revision,
        current: Revision,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        let _active = match self.try_enter() {
            Ok(active) => active,
            Err(reason) => return Ok(RunOutcome::NotRun(reason)),
        };
        let dir = match self.output_dir() {
            Ok(dir) => dir,
            Err(reason) => return Ok(RunOutcome::NotRun(reason)),
        };

        let interval = RevisionInterval::new(last, current, EtlDate::new(now))?;
        let summary = self
            .execute(dir, interval.etl_date(), Work::Interval(&interval), None, None)
            .await?;
        Ok(RunOutcome::Completed(summary.with_revisions(last, current)))
    }

    /// Re-emits ids `[start, end]` of `entity_type` without moving the watermark
    ///
    /// # Errors
    ///
    /// Returns a validation error when no registered job backfills
    /// `entity_type` or the range is inverted.
    pub async fn backfill(
        &self,
        entity_type: &EntityType,
        start: EntityId,
        end: EntityId,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome> {
        if !self
            .jobs
            .iter()
            .any(|job| job.entity_type() == Some(entity_type))
        {
            return Err(EtlError::Validation(format!(
                "No job backfills entity type {entity_type}"
            )));
        }

        let _active = match self.try_enter() {
            Ok(active) => active,
            Err(reason) => return Ok(RunOutcome::NotRun(reason)),
        };
        let dir = match self.output_dir() {
            Ok(dir) => dir,
            Err(reason) => return Ok(RunOutcome::NotRun(reason)),
        };

        let summary = self
            .execute(
                dir,
                EtlDate::new(now),
                Work::Backfill { start, end },
                Some(entity_type),
                None,
            )
            .await?;
        Ok(RunOutcome::Completed(summary))
    }

    fn try_enter(&self) -> std::result::Result<ActiveRun<'_>, NotRunReason> {
        match self.guard.try_acquire() {
            Ok(permit) => {
                *self.busy_since.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(Instant::now());
                Ok(ActiveRun {
                    _permit: permit,
                    since: &self.busy_since,
                })
            }
            Err(_) => {
                let minutes = self
                    .busy_since
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .map(|since| since.elapsed().as_secs() / 60)
                    .unwrap_or(0);
                tracing::info!(busy_minutes = minutes, "Run already in progress, skipping trigger");
                Err(NotRunReason::Busy { minutes })
            }
        }
    }

    fn output_dir(&self) -> std::result::Result<PathBuf, NotRunReason> {
        let Some(dir) = &self.datafile_dir else {
            tracing::warn!("No datafile directory configured, not running");
            return Err(NotRunReason::DirectoryNotConfigured);
        };
        if !dir.is_dir() {
            if !self.missing_dir_logged.swap(true, Ordering::SeqCst) {
                tracing::warn!(
                    dir = %dir.display(),
                    "Datafile directory does not exist, not running"
                );
            }
            return Err(NotRunReason::DirectoryMissing(dir.clone()));
        }
        Ok(dir.clone())
    }

    async fn execute(
        &self,
        dir: PathBuf,
        etl_date: EtlDate,
        work: Work<'_>,
        only: Option<&EntityType>,
        watermark: Option<Revision>,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        match &work {
            Work::Interval(interval) => crate::log_run_start!(interval),
            Work::Backfill { start, end } => tracing::info!(
                entity_type = ?only.map(EntityType::as_str),
                start = %start,
                end = %end,
                etl_date = %etl_date,
                "Starting backfill"
            ),
        }

        let mut streams = StreamSet::new(dir, etl_date);
        let mut summary = RunSummary::new(etl_date);
        let mut config_hash = None;

        let jobs = self
            .jobs
            .iter()
            .filter(|job| only.is_none() || job.entity_type() == only);
        for job in jobs {
            let result = match &work {
                Work::Interval(interval) => job.run(interval, &mut streams).await,
                Work::Backfill { start, end } => job.backfill(*start, *end, &mut streams).await,
            };
            match result {
                Ok(outcome) => {
                    if outcome.config_hash.is_some() {
                        config_hash = outcome.config_hash.clone();
                    }
                    summary.add_job(outcome);
                }
                Err(e) => {
                    crate::log_error_with_context!(e, format!("job={}", job.name()));
                    streams.abort_all();
                    return Err(e);
                }
            }
        }

        let counts = streams.commit_all()?;
        summary.set_table_counts(counts);

        self.state
            .commit_run(&RunCommit {
                watermark,
                config_hash,
                etl_date,
                record_count: summary.record_count,
            })
            .await?;
        summary.watermark_advanced = watermark.is_some();

        let summary = summary.with_duration(started.elapsed());
        crate::log_run_complete!(summary.record_count, summary.duration);
        summary.log_summary();
        Ok(summary)
    }
}
