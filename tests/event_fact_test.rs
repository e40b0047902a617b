//! Event facts, library ancestry and fixups through the run coordinator
//!
//! Lab events of the library fixture are exported by the event fact ETL; a
//! later correction of a batch starting vessel is reconciled by the fixup job.

mod common;

use chrono::Duration;
use common::{
    at, eid, etl_date, id, library_config, library_events, library_graph, now, read_lines,
    read_lines_at, rev, sample, transfer_event, vid,
};
use datawh::adapters::filesystem::FileStateStorage;
use datawh::adapters::memory::{
    MemoryAuditStore, MemoryGraphStore, MemoryRevisionClock, MemoryStore, MemoryWorkflowSource,
};
use datawh::core::ancestry::{
    AllEventsCollector, AncestryTraversal, ClassificationCollector, EventFactEtl, EventFactMapper,
    TransferGraph, LAB_EVENT_TYPE,
};
use datawh::core::etl::EtlSettings;
use datawh::core::fixup::{FixupReconciler, FIXUP_NOTE_TYPE};
use datawh::core::record::StreamTag;
use datawh::core::run::{RunCoordinator, RunOutcome};
use datawh::core::state::StateManager;
use datawh::core::workflow::WorkflowConfigProvider;
use datawh::domain::{
    ChangeKind, EntityType, EtlDate, EtlError, FixupNote, FixupSeed, LabEvent, SampleInstance,
    Vessel,
};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tempfile::TempDir;

const ANCESTRY_LINE: &str =
    "20240301120000,F,20,2,Shearing,20240102000000,30,3,PondRegistration,20240103000000,A,";

struct Lab {
    events: Arc<MemoryStore<LabEvent>>,
    notes: Arc<MemoryStore<FixupNote>>,
    audit: Arc<MemoryAuditStore>,
    clock: Arc<MemoryRevisionClock>,
    graph: Arc<MemoryGraphStore>,
    provider: Arc<WorkflowConfigProvider>,
}

impl Lab {
    fn new() -> Self {
        Self {
            events: Arc::new(MemoryStore::new(EntityType::new(LAB_EVENT_TYPE).unwrap())),
            notes: Arc::new(MemoryStore::new(EntityType::new(FIXUP_NOTE_TYPE).unwrap())),
            audit: Arc::new(MemoryAuditStore::new()),
            clock: Arc::new(MemoryRevisionClock::new()),
            graph: Arc::new(MemoryGraphStore::new(library_graph())),
            provider: Arc::new(WorkflowConfigProvider::new(
                Arc::new(MemoryWorkflowSource::new(library_config())),
                NonZeroUsize::new(64).unwrap(),
            )),
        }
    }

    fn mapper(&self) -> EventFactMapper {
        EventFactMapper::new(self.graph.clone(), self.provider.clone())
    }

    fn event_etl(&self) -> EventFactEtl {
        EventFactEtl::new(
            self.events.entity_type().clone(),
            self.events.clone(),
            self.events.clone(),
            self.mapper(),
            EtlSettings::default(),
        )
    }

    fn coordinator(&self, dir: &TempDir) -> RunCoordinator {
        let state = Arc::new(StateManager::new_with_storage(Arc::new(
            FileStateStorage::new(dir.path()),
        )));
        let fixups = FixupReconciler::new(
            self.notes.entity_type().clone(),
            self.notes.clone(),
            self.audit.clone(),
            self.events.clone(),
            Arc::new(self.mapper()),
            EtlSettings::default(),
        );
        RunCoordinator::new(self.clock.clone(), state, Some(dir.path().to_path_buf()))
            .with_job(Arc::new(self.event_etl()))
            .with_job(Arc::new(fixups))
    }

    /// Events 20, 30 and 40 are added at revisions 2, 3 and 4
    fn seed_events(&self) {
        for (offset, event) in library_events().into_iter().enumerate() {
            let revision = 2 + offset as i64;
            self.events
                .apply(event, ChangeKind::Added, rev(revision), at(offset as u32));
        }
        self.clock.commit(rev(4), at(3));
    }
}

fn completed(outcome: RunOutcome) -> datawh::core::etl::RunSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::NotRun(reason) => panic!("run did not happen: {reason}"),
    }
}

#[tokio::test]
async fn test_events_are_exported_with_ancestry() {
    let dir = TempDir::new().unwrap();
    let lab = Lab::new();
    lab.seed_events();
    let coordinator = lab.coordinator(&dir);
    coordinator.state().initialize(rev(1)).await.unwrap();

    let summary = completed(coordinator.run_incremental(now()).await.unwrap());

    let events = read_lines(dir.path(), StreamTag::Event.table());
    let ids: Vec<&str> = events
        .iter()
        .map(|line| line.split(',').nth(2).unwrap())
        .collect();
    assert_eq!(ids, vec!["20", "30", "40"]);
    assert!(events.iter().all(|line| line.ends_with(",P7-A1,E,")));
    assert!(events[1].contains(",PondRegistration,100,101,SM-1,LCSET-1,BAY1,3,,20240103000000,"));

    assert_eq!(
        read_lines(dir.path(), StreamTag::Ancestry.table()),
        vec![ANCESTRY_LINE.to_string()]
    );
    assert_eq!(summary.record_count, 4);
    assert_eq!(summary.total_skipped(), 0);
}

#[tokio::test]
async fn test_deleted_event_is_tombstoned() {
    let dir = TempDir::new().unwrap();
    let lab = Lab::new();
    lab.seed_events();
    let coordinator = lab.coordinator(&dir);
    coordinator.state().initialize(rev(4)).await.unwrap();

    let removed = library_events().pop().unwrap();
    lab.events
        .apply(removed, ChangeKind::Deleted, rev(5), at(10));
    lab.clock.commit(rev(5), at(10));

    completed(coordinator.run_incremental(now()).await.unwrap());
    assert_eq!(
        read_lines(dir.path(), StreamTag::Event.table()),
        vec!["20240301120000,T,40,".to_string()]
    );
    assert!(read_lines(dir.path(), StreamTag::Ancestry.table()).is_empty());
}

#[tokio::test]
async fn test_fixup_refreshes_downstream_events() {
    let dir = TempDir::new().unwrap();
    let lab = Lab::new();
    lab.seed_events();
    let coordinator = lab.coordinator(&dir);
    coordinator.state().initialize(rev(4)).await.unwrap();

    // The starting vessel of batch 7 is corrected from tube 1 to tube 3
    let starting_vessel = |vessel| FixupSeed::BatchStartingVessel {
        id: id(11),
        batch_id: id(7),
        vessel: vid(vessel),
    };
    lab.audit
        .record(ChangeKind::Added, rev(2), starting_vessel(1));
    lab.audit
        .record(ChangeKind::Modified, rev(6), starting_vessel(3));
    lab.notes.apply(
        FixupNote {
            id: id(1),
            reason: "wrong starting tube".to_string(),
        },
        ChangeKind::Added,
        rev(6),
        at(20),
    );
    lab.clock.commit(rev(6), at(20));

    let later = now() + Duration::hours(1);
    let summary = completed(coordinator.run_incremental(later).await.unwrap());
    let later_date = EtlDate::new(later);

    // Both snapshots are followed: everything downstream of tubes 1 and 3
    let ids: Vec<String> = read_lines_at(dir.path(), later_date, StreamTag::Event.table())
        .iter()
        .map(|line| line.split(',').nth(2).unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["20", "30", "40"]);
    assert_eq!(
        read_lines_at(dir.path(), later_date, StreamTag::Ancestry.table()).len(),
        1
    );
    assert!(read_lines_at(dir.path(), later_date, StreamTag::Event.table())
        .iter()
        .all(|line| line.contains(",F,")));
    assert_eq!(summary.total_skipped(), 0);
    assert_eq!(
        coordinator.state().load_watermark().await.unwrap().unwrap().revision,
        rev(6)
    );
}

#[tokio::test]
async fn test_audit_store_outage_keeps_watermark() {
    let dir = TempDir::new().unwrap();
    let lab = Lab::new();
    lab.seed_events();
    let coordinator = lab.coordinator(&dir);
    coordinator.state().initialize(rev(4)).await.unwrap();

    lab.audit.record(
        ChangeKind::Modified,
        rev(6),
        FixupSeed::BucketEntry {
            id: id(12),
            vessel: vid(2),
        },
    );
    lab.notes.apply(
        FixupNote {
            id: id(2),
            reason: "bucket fix".to_string(),
        },
        ChangeKind::Added,
        rev(6),
        at(20),
    );
    lab.clock.commit(rev(6), at(20));
    lab.audit.set_unavailable(true);

    let err = coordinator.run_incremental(now()).await.unwrap_err();
    assert!(err.is_systemic());
    assert!(read_lines(dir.path(), StreamTag::Event.table()).is_empty());
    assert_eq!(
        coordinator.state().load_watermark().await.unwrap().unwrap().revision,
        rev(4)
    );
}

#[tokio::test]
async fn test_diagnose_reports_facts_and_rejections() {
    let lab = Lab::new();
    lab.seed_events();

    // Tube 5 holds a sample that was never accessioned
    let keyless = SampleInstance {
        sample_key: None,
        ..sample("SM-2")
    };
    let sheared = transfer_event(50, "Shearing", 5, 4, 5);
    lab.graph.replace(TransferGraph::new(
        (1..=4)
            .map(|i| Vessel::tube(vid(i), format!("T{i}")).with_sample(sample("SM-1")))
            .chain([Vessel::tube(vid(5), "T5").with_sample(keyless)]),
        library_events().into_iter().chain([sheared.clone()]),
    ));
    lab.events.put(sheared);

    let etl = lab.event_etl();

    let pond = etl.diagnose(eid(30)).await.unwrap();
    assert_eq!(pond.exported().count(), 1);
    assert!(pond.reject_reasons().is_empty());
    assert_eq!(
        pond.ancestry()
            .map(|fact| fact.to_record(etl_date()).to_string())
            .collect::<Vec<_>>(),
        vec![ANCESTRY_LINE.to_string()]
    );

    let rejected = etl.diagnose(eid(50)).await.unwrap();
    assert_eq!(rejected.exported().count(), 0);
    assert_eq!(rejected.reject_reasons().len(), 1);
    assert!(rejected.reject_reasons()[0].contains("no sample key"));

    let err = etl.diagnose(eid(99)).await.unwrap_err();
    assert!(matches!(err, EtlError::MissingRelated(_)));
}

#[test]
fn test_walks_over_the_library_graph() {
    let graph = library_graph();
    let traversal = AncestryTraversal::new(&graph);
    let catch = graph.event(eid(40)).unwrap();

    let mut shearing = ClassificationCollector::new(["Shearing"]);
    traversal.ancestors_of(catch, &mut shearing);
    assert_eq!(
        shearing.found().keys().copied().collect::<Vec<_>>(),
        vec![eid(20)]
    );

    // The pond registration is nearer, so the shearing behind it is not reported
    let mut nearest = ClassificationCollector::new(["Shearing", "PondRegistration"]);
    traversal.ancestors_of(catch, &mut nearest);
    assert_eq!(
        nearest.into_found().into_keys().collect::<Vec<_>>(),
        vec![eid(30)]
    );

    let mut downstream = AllEventsCollector::new();
    traversal.descendants_of(&[vid(1)], &mut downstream);
    assert_eq!(
        downstream.into_events().into_iter().collect::<Vec<_>>(),
        vec![eid(20), eid(30), eid(40)]
    );

    let mut tail = AllEventsCollector::new();
    traversal.descendants_of(&[vid(3)], &mut tail);
    assert_eq!(
        tail.into_events().into_iter().collect::<Vec<_>>(),
        vec![eid(40)]
    );
}
