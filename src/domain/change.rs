// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Change records and revision intervals
//!
//! A run looks at every audited change in a half-open revision interval
//! `(last, current]`. The interval carries the run timestamp ([`EtlDate`]) that
//! prefixes every emitted line and names the run's output files.

use crate::domain::errors::EtlError;
use crate::domain::ids::{EntityId, Revision};
use crate::domain::Result;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp format shared by line prefixes, file names and date fields
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Anything with a stable primary key can flow through the ETL engine
pub trait Entity: Clone + Send + Sync + 'static {
    /// Primary key of this entity
    fn entity_id(&self) -> EntityId;
}

/// Kind of audited mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Entity was created
    Added,
    /// Entity was updated
    Modified,
    /// Entity was removed
    Deleted,
}

/// One audited mutation of an entity
#[derive(Debug, Clone)]
pub struct ChangeRecord<E> {
    /// Entity state as audited at `revision`
    pub snapshot: E,

    /// What happened to the entity
    pub kind: ChangeKind,

    /// Revision at which the change was recorded
    pub revision: Revision,

    /// Wall-clock time of the revision
    pub revision_timestamp: DateTime<Utc>,
}

impl<E: Entity> ChangeRecord<E> {
    /// Creates a new change record
    pub fn new(
        snapshot: E,
        kind: ChangeKind,
        revision: Revision,
        revision_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            snapshot,
            kind,
            revision,
            revision_timestamp,
        }
    }

    /// Id of the audited entity
    pub fn entity_id(&self) -> EntityId {
        self.snapshot.entity_id()
    }
}

/// Run timestamp, truncated to whole seconds
///
/// # Examples
///
/// ```
/// use datawh::domain::change::EtlDate;
/// use std::str::FromStr;
///
/// let date = EtlDate::from_str("20240301120000").unwrap();
/// assert_eq!(date.to_string(), "20240301120000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EtlDate(DateTime<Utc>);

impl EtlDate {
    /// Creates an EtlDate, dropping sub-second precision
    pub fn new(at: DateTime<Utc>) -> Self {
        let seconds = at.timestamp();
        Self(Utc.timestamp_opt(seconds, 0).single().unwrap_or(at))
    }

    /// Creates an EtlDate for the current instant
    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    /// Returns the underlying timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for EtlDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl FromStr for EtlDate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let naive = NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
            .map_err(|e| format!("Invalid ETL date '{s}': {e}"))?;
        Ok(Self(Utc.from_utc_datetime(&naive)))
    }
}

/// Half-open revision interval `(last, current]` processed by one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionInterval {
    last: Revision,
    current: Revision,
    etl_date: EtlDate,
}

impl RevisionInterval {
    /// Creates a new interval
    ///
    /// # Errors
    ///
    /// Returns a validation error when `last` is greater than `current`.
    pub fn new(last: Revision, current: Revision, etl_date: EtlDate) -> Result<Self> {
        if last > current {
            return Err(EtlError::Validation(format!(
                "Revision interval is inverted: last {last} > current {current}"
            )));
        }
        Ok(Self {
            last,
            current,
            etl_date,
        })
    }

    /// Last revision already processed (exclusive lower bound)
    pub fn last(&self) -> Revision {
        self.last
    }

    /// Newest revision to process (inclusive upper bound)
    pub fn current(&self) -> Revision {
        self.current
    }

    /// Run timestamp
    pub fn etl_date(&self) -> EtlDate {
        self.etl_date
    }

    /// True when there is nothing to process
    pub fn is_empty(&self) -> bool {
        self.last == self.current
    }

    /// True when `revision` falls inside `(last, current]`
    pub fn contains(&self, revision: Revision) -> bool {
        revision > self.last && revision <= self.current
    }
}

impl fmt::Display for RevisionInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.last, self.current)
    }
}
