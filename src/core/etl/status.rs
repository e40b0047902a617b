// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Current state plus a status history stream

use crate::adapters::store::{ChangeFeed, EntityStore};
use crate::core::etl::entity::{
    backfill_ids, CurrentStateEmitter, EntityPreview, EtlSettings, RecordMapper,
};
use crate::core::etl::id_set::EntityIdSet;
use crate::core::etl::job::{EtlJob, JobOutcome};
use crate::core::record::{DenormalizedRecord, StreamSet};
use crate::domain::change::{EtlDate, RevisionInterval};
use crate::domain::ids::{EntityId, EntityType};
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Mapper for entities that also keep a status history
pub trait StatusMapper: RecordMapper {
    /// Table receiving the status history
    fn status_table(&self) -> &str;

    /// Status line for one audited snapshot, `None` when it has no status
    fn status_record(
        &self,
        etl_date: EtlDate,
        status_date: DateTime<Utc>,
        entity: &Self::Entity,
    ) -> Option<DenormalizedRecord>;
}

/// Entity ETL that also writes one status line per audited change
///
/// Status lines are not deduplicated: every change in the interval produces
/// one, stamped with its revision timestamp. Only entities whose current-state
/// records were written get status lines.
pub struct StatusEtl<M: StatusMapper> {
    name: String,
    entity_type: EntityType,
    feed: Arc<dyn ChangeFeed<M::Entity>>,
    emitter: CurrentStateEmitter<M>,
}

impl<M: StatusMapper> StatusEtl<M> {
    pub fn new(
        entity_type: EntityType,
        feed: Arc<dyn ChangeFeed<M::Entity>>,
        store: Arc<dyn EntityStore<M::Entity>>,
        mapper: M,
        settings: EtlSettings,
    ) -> Self {
        Self {
            name: mapper.table().to_string(),
            entity_type,
            feed,
            emitter: CurrentStateEmitter::new(store, mapper, settings),
        }
    }

    pub async fn preview(&self, id: EntityId, etl_date: EtlDate) -> Result<EntityPreview> {
        self.emitter.preview(id, etl_date).await
    }
}

#[async_trait]
impl<M: StatusMapper> EtlJob for StatusEtl<M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity_type(&self) -> Option<&EntityType> {
        Some(&self.entity_type)
    }

    async fn run(
        &self,
        interval: &RevisionInterval,
        streams: &mut StreamSet,
    ) -> Result<JobOutcome> {
        let mut outcome = JobOutcome::new(&self.name);
        if interval.is_empty() {
            return Ok(outcome);
        }

        let changes = self
            .feed
            .changes_in_revision_range(&self.entity_type, interval)
            .await?;
        let ids = EntityIdSet::from_changes(&changes);
        let etl_date = interval.etl_date();
        let upserted = self
            .emitter
            .emit(&ids, etl_date, streams, &mut outcome)
            .await?;

        let mapper = self.emitter.mapper();
        let mut status_lines = 0;
        for change in changes.iter().filter(|c| upserted.contains(&c.entity_id())) {
            if let Some(record) =
                mapper.status_record(etl_date, change.revision_timestamp, &change.snapshot)
            {
                streams.write(mapper.status_table(), &record)?;
                status_lines += 1;
            }
        }
        outcome.add_records(status_lines);
        tracing::debug!(
            table = %mapper.status_table(),
            records = status_lines,
            "Status history written"
        );

        let skipped = outcome.skipped_ids();
        crate::log_skipped_ids!(self.name, skipped, outcome.first_error.as_deref());
        Ok(outcome)
    }

    /// Re-emits current state for `[start, end]`; status history is not rebuilt
    async fn backfill(
        &self,
        start: EntityId,
        end: EntityId,
        streams: &mut StreamSet,
    ) -> Result<JobOutcome> {
        let mut outcome = JobOutcome::new(&self.name);
        let ids = backfill_ids(
            &self.entity_type,
            self.feed.as_ref(),
            self.emitter.store().as_ref(),
            start,
            end,
        )
        .await?;
        let etl_date = streams.etl_date();
        self.emitter.emit(&ids, etl_date, streams, &mut outcome).await?;
        Ok(outcome)
    }
}
