// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Re-extraction of event facts after manual data corrections
//!
//! A fixup note is audited at the same revision as the subjects it corrected.
//! Each corrected subject yields seeds from its audited snapshots; the seeds
//! name vessels, and every event downstream of those vessels is re-emitted.

use crate::adapters::store::{AuditStore, ChangeFeed, EntityStore, SubjectChange};
use crate::core::ancestry::events::{EventContext, EventFactMapper};
use crate::core::ancestry::traversal::{AllEventsCollector, AncestryTraversal};
use crate::core::etl::entity::{EtlSettings, RecordMapper};
use crate::core::etl::job::{EtlJob, JobOutcome};
use crate::core::record::{DenormalizedRecord, StreamSet};
use crate::domain::change::{ChangeKind, EtlDate, RevisionInterval};
use crate::domain::fixup::{FixupNote, FixupSeed};
use crate::domain::ids::{EntityId, EntityType, Revision, VesselId};
use crate::domain::lab::LabEvent;
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Audited entity type of fixup notes
pub const FIXUP_NOTE_TYPE: &str = "FixupNote";

/// Job name used in logs and summaries
pub const FIXUP_JOB: &str = "fixup";

/// Facts derived from an event, written to the derived stream
pub trait DerivedFactMapper: Send + Sync {
    /// Records tagged for the derived stream
    fn records(
        &self,
        context: &EventContext,
        etl_date: EtlDate,
        event: &LabEvent,
    ) -> Result<Vec<DenormalizedRecord>>;
}

/// Reconstructs and re-emits the facts a correction invalidated
///
/// Fixups never write tombstones. A fixup whose audit trail is unusable is
/// skipped and the others still run; a failing audit store aborts the job.
pub struct FixupReconciler {
    entity_type: EntityType,
    feed: Arc<dyn ChangeFeed<FixupNote>>,
    audit: Arc<dyn AuditStore>,
    events: Arc<dyn EntityStore<LabEvent>>,
    mapper: Arc<EventFactMapper>,
    derived: Option<Arc<dyn DerivedFactMapper>>,
    settings: EtlSettings,
}

impl FixupReconciler {
    pub fn new(
        entity_type: EntityType,
        feed: Arc<dyn ChangeFeed<FixupNote>>,
        audit: Arc<dyn AuditStore>,
        events: Arc<dyn EntityStore<LabEvent>>,
        mapper: Arc<EventFactMapper>,
        settings: EtlSettings,
    ) -> Self {
        Self {
            entity_type,
            feed,
            audit,
            events,
            mapper,
            derived: None,
            settings,
        }
    }

    /// Also re-emit derived facts for every refreshed event
    pub fn with_derived(mut self, derived: Arc<dyn DerivedFactMapper>) -> Self {
        self.derived = Some(derived);
        self
    }

    /// Seeds of every subject corrected at `revision`
    pub async fn seeds_at(&self, revision: Revision) -> Result<Vec<FixupSeed>> {
        let mut seeds = Vec::new();
        for change in self.audit.changes_at_revision(revision).await? {
            seeds.extend(self.seeds_of(&change).await?);
        }
        Ok(seeds)
    }

    /// Current and preceding snapshots of one corrected subject
    ///
    /// An addition only has a current snapshot and a deletion only a
    /// preceding one.
    async fn seeds_of(&self, change: &SubjectChange) -> Result<Vec<FixupSeed>> {
        match change.kind {
            ChangeKind::Added => Ok(vec![change.seed.clone()]),
            ChangeKind::Modified => {
                let mut seeds = vec![change.seed.clone()];
                seeds.extend(self.preceding_snapshot(change).await?);
                Ok(seeds)
            }
            ChangeKind::Deleted => Ok(self.preceding_snapshot(change).await?.into_iter().collect()),
        }
    }

    async fn preceding_snapshot(&self, change: &SubjectChange) -> Result<Option<FixupSeed>> {
        let kind = change.seed.kind();
        let id = change.seed.subject_id();
        let revisions = self.audit.revisions_of(kind, id).await?;
        let Some(preceding) = revisions.into_iter().filter(|r| *r < change.revision).max() else {
            tracing::debug!(subject = %kind, id = %id, "No audited snapshot before the fixup");
            return Ok(None);
        };
        self.audit.snapshot_at(kind, id, preceding).await
    }

    /// Current lab events downstream of `vessels`, ascending by id
    pub async fn events_downstream(
        &self,
        context: &EventContext,
        vessels: &[VesselId],
    ) -> Result<Vec<LabEvent>> {
        let mut collector = AllEventsCollector::new();
        AncestryTraversal::new(&context.graph).descendants_of(vessels, &mut collector);
        let ids: Vec<EntityId> = collector.into_events().into_iter().map(EntityId::from).collect();

        let mut events = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.settings.lookup_batch_size.max(1)) {
            events.extend(self.events.find_by_ids(chunk).await?);
        }
        events.sort_by_key(|event| event.id);
        if events.len() < ids.len() {
            tracing::debug!(
                expected = ids.len(),
                found = events.len(),
                "Downstream events missing from current state"
            );
        }
        Ok(events)
    }

    fn event_records(
        &self,
        context: &EventContext,
        etl_date: EtlDate,
        event: &LabEvent,
    ) -> Result<Vec<DenormalizedRecord>> {
        let mut records = self.mapper.records(context, etl_date, event)?;
        if let Some(derived) = &self.derived {
            records.extend(derived.records(context, etl_date, event)?);
        }
        Ok(records)
    }

    fn write(&self, streams: &mut StreamSet, record: &DenormalizedRecord) -> Result<()> {
        if record.tag().is_some() {
            streams.write_tagged(record)
        } else {
            streams.write(self.mapper.table(), record)
        }
    }
}

#[async_trait]
impl EtlJob for FixupReconciler {
    fn name(&self) -> &str {
        FIXUP_JOB
    }

    async fn run(
        &self,
        interval: &RevisionInterval,
        streams: &mut StreamSet,
    ) -> Result<JobOutcome> {
        let mut outcome = JobOutcome::new(FIXUP_JOB);
        if interval.is_empty() {
            return Ok(outcome);
        }

        let notes = self
            .feed
            .changes_in_revision_range(&self.entity_type, interval)
            .await?;

        let mut vessels = BTreeSet::new();
        for note in notes.iter().filter(|n| n.kind != ChangeKind::Deleted) {
            match self.seeds_at(note.revision).await {
                Ok(seeds) => {
                    tracing::debug!(
                        fixup_id = %note.entity_id(),
                        revision = %note.revision,
                        seeds = seeds.len(),
                        "Fixup seeds loaded"
                    );
                    vessels.extend(seeds.iter().flat_map(FixupSeed::touched_vessels));
                }
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        fixup_id = %note.entity_id(),
                        revision = %note.revision,
                        error = %e,
                        "Skipping fixup, audit trail could not be loaded"
                    );
                    outcome.add_skipped(note.entity_id(), &e);
                }
            }
        }

        if vessels.is_empty() {
            let skipped = outcome.skipped_ids();
            crate::log_skipped_ids!(FIXUP_JOB, skipped, outcome.first_error.as_deref());
            return Ok(outcome);
        }

        let context = self.mapper.context().await?;
        let vessels: Vec<VesselId> = vessels.into_iter().collect();
        let events = self.events_downstream(&context, &vessels).await?;
        let etl_date = interval.etl_date();

        for event in &events {
            match self.event_records(&context, etl_date, event) {
                Ok(records) => {
                    for record in &records {
                        self.write(streams, record)?;
                    }
                    outcome.add_records(records.len());
                    outcome.add_upserted();
                }
                Err(e) if e.is_systemic() => return Err(e),
                Err(e) => {
                    tracing::warn!(event_id = %event.id, error = %e, "Skipping refreshed event");
                    outcome.add_skipped(event.id.into(), &e);
                }
            }
        }

        let skipped = outcome.skipped_ids();
        crate::log_skipped_ids!(FIXUP_JOB, skipped, outcome.first_error.as_deref());
        tracing::info!(
            fixups = notes.len(),
            vessels = vessels.len(),
            events = events.len(),
            records = outcome.records,
            "Fixups reconciled"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{
        MemoryAuditStore, MemoryGraphStore, MemoryStore, MemoryWorkflowSource,
    };
    use crate::core::ancestry::events::tests::{eid, library_config, library_graph, vid};
    use crate::core::record::StreamTag;
    use crate::core::workflow::WorkflowConfigProvider;
    use crate::domain::fixup::SubjectKind;
    use chrono::{TimeZone, Utc};
    use std::num::NonZeroUsize;
    use tempfile::TempDir;

    fn rev(value: i64) -> Revision {
        Revision::new(value).unwrap()
    }

    fn id(value: i64) -> EntityId {
        EntityId::new(value).unwrap()
    }

    fn etl_date() -> EtlDate {
        "20240301120000".parse().unwrap()
    }

    fn starting_vessel(vessel: i64) -> FixupSeed {
        FixupSeed::BatchStartingVessel {
            id: id(3),
            batch_id: id(40),
            vessel: vid(vessel),
        }
    }

    struct SequencingFacts;

    impl DerivedFactMapper for SequencingFacts {
        fn records(
            &self,
            _context: &EventContext,
            etl_date: EtlDate,
            event: &LabEvent,
        ) -> Result<Vec<DenormalizedRecord>> {
            Ok(vec![DenormalizedRecord::upsert(etl_date)
                .id(event.id.into())
                .text(Some(event.event_type.as_str()))
                .tagged(StreamTag::Derived)])
        }
    }

    struct Fixture {
        notes: Arc<MemoryStore<FixupNote>>,
        audit: Arc<MemoryAuditStore>,
        reconciler: FixupReconciler,
    }

    fn fixture() -> Fixture {
        let graph = library_graph();
        let events = Arc::new(MemoryStore::new(EntityType::new("LabEvent").unwrap()));
        for event in graph.events() {
            events.put(event.clone());
        }
        let provider = Arc::new(WorkflowConfigProvider::new(
            Arc::new(MemoryWorkflowSource::new(library_config())),
            NonZeroUsize::new(32).unwrap(),
        ));
        let mapper = Arc::new(EventFactMapper::new(
            Arc::new(MemoryGraphStore::new(graph)),
            provider,
        ));
        let notes = Arc::new(MemoryStore::new(EntityType::new(FIXUP_NOTE_TYPE).unwrap()));
        let audit = Arc::new(MemoryAuditStore::new());
        let reconciler = FixupReconciler::new(
            notes.entity_type().clone(),
            notes.clone(),
            audit.clone(),
            events,
            mapper,
            EtlSettings::default(),
        );
        Fixture {
            notes,
            audit,
            reconciler,
        }
    }

    fn note(fixture: &Fixture, note_id: i64, revision: i64) {
        fixture.notes.apply(
            FixupNote {
                id: id(note_id),
                reason: "GPLIM-1".to_string(),
            },
            ChangeKind::Added,
            rev(revision),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
        );
    }

    async fn run(reconciler: &FixupReconciler, dir: &TempDir) -> JobOutcome {
        let interval = RevisionInterval::new(rev(4), rev(10), etl_date()).unwrap();
        let mut streams = StreamSet::new(dir.path(), etl_date());
        let outcome = reconciler.run(&interval, &mut streams).await.unwrap();
        streams.commit_all().unwrap();
        outcome
    }

    fn read(dir: &TempDir, table: &str) -> Vec<String> {
        std::fs::read_to_string(dir.path().join(format!("20240301120000_{table}.dat")))
            .map(|content| content.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_modified_starting_vessel_refreshes_downstream_event() {
        let fixture = fixture();
        // batch 40 started at unknown vessel 9, then was corrected to vessel 2
        fixture.audit.record(ChangeKind::Added, rev(2), starting_vessel(9));
        fixture.audit.record(ChangeKind::Modified, rev(5), starting_vessel(2));
        note(&fixture, 1, 5);

        let dir = TempDir::new().unwrap();
        let outcome = run(&fixture.reconciler, &dir).await;

        let events = read(&dir, StreamTag::Event.table());
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("20240301120000,F,30,"));
        assert!(events[0].ends_with(",E,"));
        assert_eq!(read(&dir, StreamTag::Ancestry.table()).len(), 1);
        assert_eq!(outcome.upserted, 1);
        assert_eq!(outcome.deleted, 0);
    }

    #[tokio::test]
    async fn test_preceding_snapshot_is_followed() {
        let fixture = fixture();
        fixture.audit.record(ChangeKind::Added, rev(2), starting_vessel(1));
        fixture.audit.record(ChangeKind::Deleted, rev(6), starting_vessel(1));
        note(&fixture, 1, 6);

        let seeds = fixture.reconciler.seeds_at(rev(6)).await.unwrap();
        assert_eq!(seeds, vec![starting_vessel(1)]);

        let dir = TempDir::new().unwrap();
        let outcome = run(&fixture.reconciler, &dir).await;
        let ids: Vec<String> = read(&dir, StreamTag::Event.table())
            .iter()
            .map(|line| line.split(',').nth(2).unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["20", "30"]);
        assert_eq!(outcome.upserted, 2);
    }

    #[tokio::test]
    async fn test_added_subject_uses_current_snapshot_only() {
        let fixture = fixture();
        fixture.audit.record(ChangeKind::Added, rev(5), starting_vessel(2));

        let seeds = fixture.reconciler.seeds_at(rev(5)).await.unwrap();
        assert_eq!(seeds, vec![starting_vessel(2)]);
    }

    #[tokio::test]
    async fn test_broken_trail_skips_only_that_fixup() {
        let fixture = fixture();
        fixture.audit.record(ChangeKind::Added, rev(2), starting_vessel(9));
        fixture.audit.record(ChangeKind::Modified, rev(5), starting_vessel(2));
        fixture.audit.break_trail(SubjectKind::BatchStartingVessel, id(3));
        fixture.audit.record(
            ChangeKind::Added,
            rev(7),
            FixupSeed::LabEvent {
                event_id: eid(20),
                vessels: vec![vid(1), vid(2)],
            },
        );
        note(&fixture, 1, 5);
        note(&fixture, 2, 7);

        let dir = TempDir::new().unwrap();
        let outcome = run(&fixture.reconciler, &dir).await;
        assert_eq!(outcome.skipped_ids(), vec![id(1)]);
        assert_eq!(read(&dir, StreamTag::Event.table()).len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_audit_store_aborts() {
        let fixture = fixture();
        fixture.audit.record(ChangeKind::Modified, rev(5), starting_vessel(2));
        note(&fixture, 1, 5);
        fixture.audit.set_unavailable(true);

        let dir = TempDir::new().unwrap();
        let interval = RevisionInterval::new(rev(4), rev(10), etl_date()).unwrap();
        let mut streams = StreamSet::new(dir.path(), etl_date());
        let err = fixture
            .reconciler
            .run(&interval, &mut streams)
            .await
            .unwrap_err();
        assert!(err.is_systemic());
        streams.abort_all();
        assert!(read(&dir, StreamTag::Event.table()).is_empty());
    }

    #[tokio::test]
    async fn test_derived_facts_are_demultiplexed() {
        let fixture = fixture();
        fixture.audit.record(ChangeKind::Added, rev(5), starting_vessel(2));
        note(&fixture, 1, 5);
        let reconciler = fixture.reconciler.with_derived(Arc::new(SequencingFacts));

        let dir = TempDir::new().unwrap();
        run(&reconciler, &dir).await;
        assert_eq!(
            read(&dir, StreamTag::Derived.table()),
            vec!["20240301120000,F,30,PondRegistration,S,".to_string()]
        );
        assert_eq!(read(&dir, StreamTag::Event.table()).len(), 1);
    }

    #[tokio::test]
    async fn test_no_fixups_writes_nothing() {
        let fixture = fixture();
        let dir = TempDir::new().unwrap();
        let outcome = run(&fixture.reconciler, &dir).await;
        assert_eq!(outcome.records, 0);
        assert!(read(&dir, StreamTag::Event.table()).is_empty());
    }
}
