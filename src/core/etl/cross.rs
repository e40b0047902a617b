// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! ETL where the audited entity differs from the denormalized one
//!
//! Changes to an audited entity `A` mark their owning entities as modified.
//! The owners then go through the regular current-state emission. Audited
//! deletes never produce tombstones of the owner.

use crate::adapters::store::{AssociationQuery, AuditStore, ChangeFeed, EntityStore};
use crate::core::etl::entity::{validate_range, CurrentStateEmitter, EtlSettings, RecordMapper};
use crate::core::etl::id_set::EntityIdSet;
use crate::core::etl::job::{EtlJob, JobOutcome};
use crate::core::record::StreamSet;
use crate::domain::change::{ChangeRecord, Entity, RevisionInterval};
use crate::domain::ids::{EntityId, EntityType};
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

/// Default number of audited ids per association query
pub const DEFAULT_TRANSLATION_CHUNK_SIZE: usize = 1000;

/// Maps audited changes to the ids of the entities to re-emit
#[async_trait]
pub trait IdTranslator<A: Entity>: Send + Sync {
    async fn translate(&self, changes: &[ChangeRecord<A>]) -> Result<BTreeSet<EntityId>>;
}

/// Translation through accessors on the audited snapshot
pub struct GraphTranslator<A, F> {
    owners: F,
    _audited: PhantomData<fn(&A)>,
}

impl<A, F> GraphTranslator<A, F>
where
    A: Entity,
    F: Fn(&A) -> Vec<EntityId> + Send + Sync,
{
    pub fn new(owners: F) -> Self {
        Self {
            owners,
            _audited: PhantomData,
        }
    }
}

#[async_trait]
impl<A, F> IdTranslator<A> for GraphTranslator<A, F>
where
    A: Entity,
    F: Fn(&A) -> Vec<EntityId> + Send + Sync,
{
    async fn translate(&self, changes: &[ChangeRecord<A>]) -> Result<BTreeSet<EntityId>> {
        Ok(changes
            .iter()
            .flat_map(|change| (self.owners)(&change.snapshot))
            .collect())
    }
}

/// Translation through a foreign-key column of the audit table
///
/// Needed when the audited entity was deleted and its snapshot no longer
/// links back to the owner.
pub struct AuditColumnTranslator {
    audit: Arc<dyn AuditStore>,
    query: AssociationQuery,
    chunk_size: usize,
}

impl AuditColumnTranslator {
    pub fn new(audit: Arc<dyn AuditStore>, query: AssociationQuery) -> Self {
        Self {
            audit,
            query,
            chunk_size: DEFAULT_TRANSLATION_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

#[async_trait]
impl<A: Entity> IdTranslator<A> for AuditColumnTranslator {
    async fn translate(&self, changes: &[ChangeRecord<A>]) -> Result<BTreeSet<EntityId>> {
        let audited: Vec<EntityId> = changes
            .iter()
            .map(ChangeRecord::entity_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut owners = BTreeSet::new();
        for chunk in audited.chunks(self.chunk_size) {
            owners.extend(self.audit.associated_ids(&self.query, chunk).await?);
        }

        tracing::debug!(
            audit_table = %self.query.audit_table,
            audited = audited.len(),
            owners = owners.len(),
            "Translated audited ids"
        );
        Ok(owners)
    }
}

/// ETL of an owning entity driven by changes to another audited entity
pub struct CrossEntityEtl<A: Entity, M: RecordMapper> {
    name: String,
    audited_type: EntityType,
    feed: Arc<dyn ChangeFeed<A>>,
    translator: Arc<dyn IdTranslator<A>>,
    emitter: CurrentStateEmitter<M>,
}

impl<A: Entity, M: RecordMapper> CrossEntityEtl<A, M> {
    pub fn new(
        audited_type: EntityType,
        feed: Arc<dyn ChangeFeed<A>>,
        translator: Arc<dyn IdTranslator<A>>,
        store: Arc<dyn EntityStore<M::Entity>>,
        mapper: M,
        settings: EtlSettings,
    ) -> Self {
        Self {
            name: format!("{}_by_{}", mapper.table(), audited_type),
            audited_type,
            feed,
            translator,
            emitter: CurrentStateEmitter::new(store, mapper, settings),
        }
    }
}

#[async_trait]
impl<A: Entity, M: RecordMapper> EtlJob for CrossEntityEtl<A, M> {
    fn name(&self) -> &str {
        &self.name
    }

    fn entity_type(&self) -> Option<&EntityType> {
        Some(&self.audited_type)
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
            .changes_in_revision_range(&self.audited_type, interval)
            .await?;
        if changes.is_empty() {
            return Ok(outcome);
        }

        let owners = self.translator.translate(&changes).await?;
        let ids = EntityIdSet::upserts(owners);
        self.emitter
            .emit(&ids, interval.etl_date(), streams, &mut outcome)
            .await?;

        let skipped = outcome.skipped_ids();
        crate::log_skipped_ids!(self.name, skipped, outcome.first_error.as_deref());
        Ok(outcome)
    }

    /// Re-emits the owning entities with ids in `[start, end]`
    ///
    /// Backfill only upserts: ids missing from current state are still
    /// tombstoned by the lookup-miss rule, but audited deletes are ignored.
    async fn backfill(
        &self,
        start: EntityId,
        end: EntityId,
        streams: &mut StreamSet,
    ) -> Result<JobOutcome> {
        validate_range(start, end)?;
        let mut outcome = JobOutcome::new(&self.name);
        let ids = EntityIdSet::upserts(self.emitter.store().ids_in_range(start, end).await?);
        let etl_date = streams.etl_date();
        self.emitter.emit(&ids, etl_date, streams, &mut outcome).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryAuditStore, MemoryStore};
    use crate::core::etl::entity::tests::{at, batch, etl_date, rev, Batch, BatchMapper};
    use crate::domain::change::ChangeKind;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    struct Starter {
        id: EntityId,
        batch_id: EntityId,
    }

    impl Entity for Starter {
        fn entity_id(&self) -> EntityId {
            self.id
        }
    }

    fn id(value: i64) -> EntityId {
        EntityId::new(value).unwrap()
    }

    fn starter(value: i64, batch_id: i64) -> Starter {
        Starter {
            id: id(value),
            batch_id: id(batch_id),
        }
    }

    struct Fixture {
        starters: Arc<MemoryStore<Starter>>,
        batches: Arc<MemoryStore<Batch>>,
    }

    fn fixture() -> Fixture {
        Fixture {
            starters: Arc::new(MemoryStore::new(
                EntityType::new("LabBatchStartingVessel").unwrap(),
            )),
            batches: Arc::new(MemoryStore::new(EntityType::new("LabBatch").unwrap())),
        }
    }

    fn graph_etl(fixture: &Fixture) -> CrossEntityEtl<Starter, BatchMapper> {
        let translator = GraphTranslator::new(|s: &Starter| vec![s.batch_id]);
        CrossEntityEtl::new(
            fixture.starters.entity_type().clone(),
            fixture.starters.clone(),
            Arc::new(translator),
            fixture.batches.clone(),
            BatchMapper,
            EtlSettings::default(),
        )
    }

    async fn run_lines(etl: &CrossEntityEtl<Starter, BatchMapper>) -> (JobOutcome, String) {
        let dir = TempDir::new().unwrap();
        let interval = RevisionInterval::new(rev(1), rev(5), etl_date()).unwrap();
        let mut streams = StreamSet::new(dir.path(), etl_date());
        let outcome = etl.run(&interval, &mut streams).await.unwrap();
        streams.commit_all().unwrap();
        let content = std::fs::read_to_string(dir.path().join("20240301120000_lab_batch.dat"))
            .unwrap_or_default();
        (outcome, content)
    }

    #[tokio::test]
    async fn test_audited_delete_becomes_owner_modify() {
        let fixture = fixture();
        fixture.batches.put(batch(20, "B20"));
        fixture
            .starters
            .apply(starter(1, 20), ChangeKind::Added, rev(2), at(1));
        fixture
            .starters
            .apply(starter(1, 20), ChangeKind::Deleted, rev(3), at(2));

        let (outcome, content) = run_lines(&graph_etl(&fixture)).await;

        assert_eq!(outcome.deleted, 0);
        assert_eq!(content, "20240301120000,F,20,B20,\n");
    }

    #[tokio::test]
    async fn test_missing_owner_follows_lookup_miss_rule() {
        let fixture = fixture();
        fixture
            .starters
            .apply(starter(1, 21), ChangeKind::Modified, rev(2), at(1));

        let (outcome, content) = run_lines(&graph_etl(&fixture)).await;

        assert_eq!(outcome.reclassified, 1);
        assert_eq!(content, "20240301120000,T,21,\n");
    }

    #[tokio::test]
    async fn test_audit_column_translation_in_chunks() {
        let fixture = fixture();
        fixture.batches.put(batch(20, "B20"));
        fixture.batches.put(batch(30, "B30"));
        fixture
            .starters
            .apply(starter(1, 20), ChangeKind::Deleted, rev(2), at(1));
        fixture
            .starters
            .apply(starter(2, 30), ChangeKind::Deleted, rev(3), at(2));

        let audit = Arc::new(MemoryAuditStore::new());
        audit.associate("lab_batch_starting_vessel_aud", id(1), id(20));
        audit.associate("lab_batch_starting_vessel_aud", id(2), id(30));

        let translator = AuditColumnTranslator::new(
            audit,
            AssociationQuery::new("lab_batch_starting_vessel_aud", "id", "lab_batch"),
        )
        .with_chunk_size(1);
        let etl = CrossEntityEtl::new(
            fixture.starters.entity_type().clone(),
            fixture.starters.clone(),
            Arc::new(translator),
            fixture.batches.clone(),
            BatchMapper,
            EtlSettings::default(),
        );

        let (_, content) = run_lines(&etl).await;
        assert_eq!(
            content,
            "20240301120000,F,20,B20,\n20240301120000,F,30,B30,\n"
        );
    }

    #[tokio::test]
    async fn test_backfill_never_deletes() {
        let fixture = fixture();
        fixture.batches.put(batch(20, "B20"));
        fixture
            .batches
            .apply(batch(21, "B21"), ChangeKind::Deleted, rev(2), at(1));

        let etl = graph_etl(&fixture);
        let dir = TempDir::new().unwrap();
        let mut streams = StreamSet::new(dir.path(), etl_date());
        let outcome = etl.backfill(id(1), id(100), &mut streams).await.unwrap();

        assert_eq!(outcome.deleted, 0);
        assert_eq!(outcome.upserted, 1);
        assert_eq!(etl.name(), "lab_batch_by_LabBatchStartingVessel");
    }
}
