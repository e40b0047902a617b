// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Generic current-state ETL for one entity type
//!
//! A run turns the change records of an interval into an [`EntityIdSet`],
//! writes one tombstone per deleted id, looks up the current state of every
//! other id exactly once and hands each entity to a [`RecordMapper`]. Ids the
//! store no longer knows are tombstoned as if they had been deleted.

use crate::adapters::store::{ChangeFeed, EntityStore};
use crate::config::EtlConfig;
use crate::core::etl::id_set::EntityIdSet;
use crate::core::etl::job::{EtlJob, JobOutcome};
use crate::core::record::{DenormalizedRecord, StreamSet};
use crate::domain::change::{ChangeKind, Entity, EtlDate, RevisionInterval};
use crate::domain::errors::EtlError;
use crate::domain::ids::{EntityId, EntityType};
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Default number of ids per batched lookup
pub const DEFAULT_LOOKUP_BATCH_SIZE: usize = 500;

/// Default number of individual retries for an id a lookup missed
pub const DEFAULT_LOOKUP_MISS_RETRIES: u32 = 1;

/// Tuning shared by every entity ETL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtlSettings {
    pub lookup_batch_size: usize,
    pub lookup_miss_retries: u32,
}

impl Default for EtlSettings {
    fn default() -> Self {
        Self {
            lookup_batch_size: DEFAULT_LOOKUP_BATCH_SIZE,
            lookup_miss_retries: DEFAULT_LOOKUP_MISS_RETRIES,
        }
    }
}

impl EtlSettings {
    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            lookup_batch_size: config.lookup_batch_size.max(1),
            lookup_miss_retries: config.lookup_miss_retries,
        }
    }
}

/// Turns one entity into the lines of its output table
///
/// `records` must be a pure function of the entity and the context: running
/// the same interval twice has to produce the same bytes.
#[async_trait]
pub trait RecordMapper: Send + Sync + 'static {
    type Entity: Entity;
    /// Data loaded once per run and shared by every entity
    type Context: Send + Sync;

    /// Table that receives untagged records and tombstones
    fn table(&self) -> &str;

    async fn context(&self) -> Result<Self::Context>;

    /// Records for one entity
    ///
    /// # Errors
    ///
    /// Recoverable errors skip the entity. Systemic errors abort the job.
    fn records(
        &self,
        context: &Self::Context,
        etl_date: EtlDate,
        entity: &Self::Entity,
    ) -> Result<Vec<DenormalizedRecord>>;
}

/// What a single id would produce, without writing anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityPreview {
    /// Rendered lines the entity would emit
    Records(Vec<String>),
    /// The entity would be tombstoned
    Tombstone { reason: String },
    /// The transformation fails and the entity would be skipped
    Skipped { reason: String },
}

/// Current-state lookup and record emission shared by the entity ETLs
pub struct CurrentStateEmitter<M: RecordMapper> {
    store: Arc<dyn EntityStore<M::Entity>>,
    mapper: M,
    settings: EtlSettings,
}

impl<M: RecordMapper> CurrentStateEmitter<M> {
    pub fn new(store: Arc<dyn EntityStore<M::Entity>>, mapper: M, settings: EtlSettings) -> Self {
        Self {
            store,
            mapper,
            settings,
        }
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn store(&self) -> &Arc<dyn EntityStore<M::Entity>> {
        &self.store
    }

    /// Current state of `ids`, keyed by id
    ///
    /// Ids are fetched in batches. An id a batch did not return is retried
    /// individually before it counts as missing.
    pub async fn lookup(&self, ids: &[EntityId]) -> Result<BTreeMap<EntityId, M::Entity>> {
        let mut found = BTreeMap::new();

        for chunk in ids.chunks(self.settings.lookup_batch_size.max(1)) {
            for entity in self.store.find_by_ids(chunk).await? {
                found.insert(entity.entity_id(), entity);
            }

            for &id in chunk {
                if found.contains_key(&id) {
                    continue;
                }
                for attempt in 1..=self.settings.lookup_miss_retries {
                    crate::log_retry_attempt!(
                        attempt,
                        self.settings.lookup_miss_retries,
                        format!("{} {id} missing from batch", self.mapper.table())
                    );
                    if let Some(entity) = self.store.find_by_id(id).await? {
                        found.insert(id, entity);
                        break;
                    }
                }
            }
        }

        Ok(found)
    }

    /// Emit tombstones and current-state records for `ids`
    ///
    /// Tombstones come first, ascending, followed by the records of each
    /// found entity in ascending id order.
    ///
    /// # Returns
    ///
    /// The ids whose records were written.
    pub async fn emit(
        &self,
        ids: &EntityIdSet,
        etl_date: EtlDate,
        streams: &mut StreamSet,
        outcome: &mut JobOutcome,
    ) -> Result<BTreeSet<EntityId>> {
        let upsert_ids = ids.to_upsert();
        let current = self.lookup(&upsert_ids).await?;

        let missing: BTreeSet<EntityId> = upsert_ids
            .iter()
            .filter(|id| !current.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            tracing::debug!(
                table = %self.mapper.table(),
                count = missing.len(),
                "Entities no longer present, reclassified as deleted"
            );
        }

        let tombstones: BTreeSet<EntityId> =
            ids.to_delete().into_iter().chain(missing.iter().copied()).collect();
        for &id in &tombstones {
            streams.write(self.mapper.table(), &DenormalizedRecord::tombstone(etl_date, id))?;
            if missing.contains(&id) {
                outcome.add_reclassified();
            } else {
                outcome.add_deleted();
            }
        }

        let mut upserted = BTreeSet::new();
        if current.is_empty() {
            return Ok(upserted);
        }

        let context = self.mapper.context().await?;
        for (&id, entity) in &current {
            match self.mapper.records(&context, etl_date, entity) {
                Ok(records) => {
                    for record in &records {
                        self.write(streams, record)?;
                    }
                    outcome.add_records(records.len());
                    outcome.add_upserted();
                    upserted.insert(id);
                }
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        table = %self.mapper.table(),
                        entity_id = %id,
                        error = %e,
                        "Skipping entity"
                    );
                    outcome.add_skipped(id, &e);
                }
            }
        }

        Ok(upserted)
    }

    /// The transformation of one id, without writing output
    pub async fn preview(&self, id: EntityId, etl_date: EtlDate) -> Result<EntityPreview> {
        let Some(entity) = self.lookup(&[id]).await?.remove(&id) else {
            return Ok(EntityPreview::Tombstone {
                reason: format!("{} {id} not found in current state", self.mapper.table()),
            });
        };

        let context = self.mapper.context().await?;
        match self.mapper.records(&context, etl_date, &entity) {
            Ok(records) => Ok(EntityPreview::Records(
                records.iter().map(DenormalizedRecord::render).collect(),
            )),
            Err(e) if e.is_systemic() => Err(e),
            Err(e) => Ok(EntityPreview::Skipped {
                reason: e.to_string(),
            }),
        }
    }

    fn write(&self, streams: &mut StreamSet, record: &DenormalizedRecord) -> Result<()> {
        if record.tag().is_some() {
            streams.write_tagged(record)
        } else {
            streams.write(self.mapper.table(), record)
        }
    }
}

/// Ids a backfill of `[start, end]` should touch
///
/// Existing ids are upserted; ids the audit trail records as deleted are
/// tombstoned.
pub(crate) async fn backfill_ids<E: Entity>(
    entity_type: &EntityType,
    feed: &dyn ChangeFeed<E>,
    store: &dyn EntityStore<E>,
    start: EntityId,
    end: EntityId,
) -> Result<EntityIdSet> {
    validate_range(start, end)?;
    let mut ids = EntityIdSet::upserts(store.ids_in_range(start, end).await?);
    for id in feed.deleted_ids_in_range(entity_type, start, end).await? {
        ids.insert(id, ChangeKind::Deleted);
    }
    Ok(ids)
}

pub(crate) fn validate_range(start: EntityId, end: EntityId) -> Result<()> {
    if start > end {
        return Err(EtlError::Validation(format!(
            "Backfill range is inverted: {start} > {end}"
        )));
    }
    Ok(())
}

/// ETL of one audited entity type into its own table
pub struct EntityEtl<M: RecordMapper> {
    name: String,
    entity_type: EntityType,
    feed: Arc<dyn ChangeFeed<M::Entity>>,
    emitter: CurrentStateEmitter<M>,
}

impl<M: RecordMapper> EntityEtl<M> {
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

    pub fn mapper(&self) -> &M {
        self.emitter.mapper()
    }

    /// What the ETL would emit for `id` right now
    pub async fn preview(&self, id: EntityId, etl_date: EtlDate) -> Result<EntityPreview> {
        self.emitter.preview(id, etl_date).await
    }

    /// Current state of `id`, with the usual miss retries
    pub async fn current_state(&self, id: EntityId) -> Result<Option<M::Entity>> {
        Ok(self.emitter.lookup(&[id]).await?.remove(&id))
    }

    fn finish(&self, outcome: JobOutcome) -> JobOutcome {
        let skipped = outcome.skipped_ids();
        crate::log_skipped_ids!(self.name, skipped, outcome.first_error.as_deref());
        tracing::info!(
            job = %self.name,
            records = outcome.records,
            upserted = outcome.upserted,
            deleted = outcome.deleted,
            reclassified = outcome.reclassified,
            "Job finished"
        );
        outcome
    }
}

#[async_trait]
impl<M: RecordMapper> EtlJob for EntityEtl<M> {
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
        tracing::debug!(
            entity_type = %self.entity_type,
            changes = changes.len(),
            ids = ids.len(),
            "Collected changed ids"
        );

        self.emitter
            .emit(&ids, interval.etl_date(), streams, &mut outcome)
            .await?;
        Ok(self.finish(outcome))
    }

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

        tracing::info!(
            entity_type = %self.entity_type,
            start = %start,
            end = %end,
            ids = ids.len(),
            "Backfilling"
        );
        let etl_date = streams.etl_date();
        self.emitter.emit(&ids, etl_date, streams, &mut outcome).await?;
        Ok(self.finish(outcome))
    }
}
