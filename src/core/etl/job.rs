// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Job abstraction shared by every ETL the coordinator runs

use crate::core::record::StreamSet;
use crate::domain::change::RevisionInterval;
use crate::domain::errors::{EtlError, SkippedEntity};
use crate::domain::ids::{EntityId, EntityType};
use crate::domain::Result;
use async_trait::async_trait;

/// One unit of work registered with the run coordinator
#[async_trait]
pub trait EtlJob: Send + Sync {
    /// Name used in logs and summaries
    fn name(&self) -> &str;

    /// Entity type a backfill of this job covers, if it supports backfill
    fn entity_type(&self) -> Option<&EntityType> {
        None
    }

    /// Processes every change in `interval`
    async fn run(&self, interval: &RevisionInterval, streams: &mut StreamSet)
        -> Result<JobOutcome>;

    /// Re-emits the entities with ids in `[start, end]`
    async fn backfill(
        &self,
        start: EntityId,
        end: EntityId,
        streams: &mut StreamSet,
    ) -> Result<JobOutcome> {
        let _ = (start, end, streams);
        Err(EtlError::Validation(format!(
            "{} does not support backfill",
            self.name()
        )))
    }
}

/// Result of one job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutcome {
    /// Job name
    pub job: String,
    /// Lines written
    pub records: usize,
    /// Entities emitted from current state
    pub upserted: usize,
    /// Tombstones written, reclassified misses included
    pub deleted: usize,
    /// Upserts that turned into tombstones because the entity was gone
    pub reclassified: usize,
    /// Entities whose transformation failed
    pub skipped: Vec<SkippedEntity>,
    /// First recoverable error of the job
    pub first_error: Option<String>,
    /// Workflow configuration hash to persist with the watermark
    pub config_hash: Option<String>,
}

impl JobOutcome {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            ..Default::default()
        }
    }

    pub fn add_records(&mut self, count: usize) {
        self.records += count;
    }

    pub fn add_upserted(&mut self) {
        self.upserted += 1;
    }

    pub fn add_deleted(&mut self) {
        self.deleted += 1;
        self.records += 1;
    }

    pub fn add_reclassified(&mut self) {
        self.reclassified += 1;
        self.add_deleted();
    }

    /// Records a recoverable failure for one entity
    pub fn add_skipped(&mut self, entity_id: EntityId, error: &EtlError) {
        if self.first_error.is_none() {
            self.first_error = Some(error.to_string());
        }
        self.skipped.push(SkippedEntity::new(entity_id, error.to_string()));
    }

    /// Ids of skipped entities
    pub fn skipped_ids(&self) -> Vec<EntityId> {
        self.skipped.iter().map(|s| s.entity_id).collect()
    }

    /// Merge another outcome into this one
    pub fn merge(&mut self, other: JobOutcome) {
        self.records += other.records;
        self.upserted += other.upserted;
        self.deleted += other.deleted;
        self.reclassified += other.reclassified;
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
        self.skipped.extend(other.skipped);
        if other.config_hash.is_some() {
            self.config_hash = other.config_hash;
        }
    }
}
