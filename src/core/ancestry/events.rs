// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Event facts and the library ancestry attached to them
//!
//! An event produces one fact per sample instance in each vessel it acts on.
//! Positioned containers are expanded into their member vessels; anonymous
//! containers are expanded into their positions. Facts that cannot be
//! exported carry a reject reason and are left out of the event stream.

use crate::adapters::store::GraphStore;
use crate::core::ancestry::facts::{build_facts, AncestryFact};
use crate::core::ancestry::graph::TransferGraph;
use crate::core::ancestry::traversal::{AncestryTraversal, ClassificationCollector};
use crate::core::etl::entity::{EntityEtl, RecordMapper};
use crate::core::record::{DenormalizedRecord, StreamTag};
use crate::core::workflow::{WorkflowConfigDenorm, WorkflowConfigProvider, WorkflowConfigResolver};
use crate::domain::change::EtlDate;
use crate::domain::errors::EtlError;
use crate::domain::ids::{EntityId, EventId, VesselId};
use crate::domain::lab::{LabEvent, SampleInstance, Vessel, VesselKind};
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Audited entity type of lab events
pub const LAB_EVENT_TYPE: &str = "LabEvent";

/// Batch name written for samples that were never bucketed
pub const NO_BATCH: &str = "NONE";

/// ETL of lab events into event facts and library ancestry
pub type EventFactEtl = EntityEtl<EventFactMapper>;

/// One sample instance of one vessel, as seen by an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFact {
    pub event_id: EventId,
    pub vessel_id: Option<VesselId>,
    pub vessel_label: Option<String>,
    pub position: Option<String>,
    pub sample_key: Option<String>,
    pub order_id: Option<EntityId>,
    pub order_sample_id: Option<EntityId>,
    pub batch_name: String,
    pub molecular_index: Option<String>,
    /// Workflow of the sample's latest batch
    pub workflow_name: Option<String>,
    /// Date the workflow lookup was made for
    pub workflow_date: DateTime<Utc>,
    pub workflow: Option<WorkflowConfigDenorm>,
    pub reject_reason: Option<String>,
    pub ancestry: Vec<AncestryFact>,
}

impl EventFact {
    fn rejected(
        event: &LabEvent,
        vessel: Option<&Vessel>,
        position: Option<&str>,
        reason: String,
    ) -> Self {
        Self {
            event_id: event.id,
            vessel_id: vessel.map(|v| v.id),
            vessel_label: vessel.map(|v| v.label.clone()),
            position: position.map(str::to_string),
            sample_key: None,
            order_id: None,
            order_sample_id: None,
            batch_name: NO_BATCH.to_string(),
            molecular_index: None,
            workflow_name: None,
            workflow_date: event.date,
            workflow: None,
            reject_reason: Some(reason),
            ancestry: Vec::new(),
        }
    }

    /// True when the fact is written to the event stream
    pub fn can_etl(&self) -> bool {
        self.reject_reason.is_none()
    }

    /// Event stream record
    pub fn to_record(&self, event: &LabEvent, etl_date: EtlDate) -> DenormalizedRecord {
        DenormalizedRecord::upsert(etl_date)
            .id(EntityId::from(self.event_id))
            .number(self.workflow.as_ref().map(|w| w.workflow_id))
            .number(self.workflow.as_ref().map(|w| w.process_id))
            .text(Some(&event.event_type))
            .opt_id(self.order_id)
            .opt_id(self.order_sample_id)
            .text(self.sample_key.as_deref())
            .text(Some(&self.batch_name))
            .text(event.location.as_deref())
            .number(self.vessel_id)
            .text(self.position.as_deref())
            .timestamp(Some(event.date))
            .text(event.program.as_deref())
            .text(self.molecular_index.as_deref())
            .tagged(StreamTag::Event)
    }

    fn sort_key(&self) -> (bool, &str) {
        match self.sample_key.as_deref() {
            Some(key) if !key.is_empty() => (false, key),
            _ => (true, ""),
        }
    }
}

/// Everything known about how one event is exported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDiagnosis {
    pub event: LabEvent,
    pub facts: Vec<EventFact>,
}

impl EventDiagnosis {
    /// Facts written to the event stream
    pub fn exported(&self) -> impl Iterator<Item = &EventFact> {
        self.facts.iter().filter(|f| f.can_etl())
    }

    /// Reject reasons, one per rejected fact
    pub fn reject_reasons(&self) -> Vec<&str> {
        self.facts
            .iter()
            .filter_map(|f| f.reject_reason.as_deref())
            .collect()
    }

    /// Ancestry facts of every exported fact
    pub fn ancestry(&self) -> impl Iterator<Item = &AncestryFact> {
        self.exported().flat_map(|f| f.ancestry.iter())
    }
}

/// Snapshot shared by all events of one run
pub struct EventContext {
    pub graph: Arc<TransferGraph>,
    pub resolver: Arc<WorkflowConfigResolver>,
}

/// Maps a lab event to its event facts and library ancestry
pub struct EventFactMapper {
    graph: Arc<dyn GraphStore>,
    provider: Arc<WorkflowConfigProvider>,
}

impl EventFactMapper {
    pub fn new(graph: Arc<dyn GraphStore>, provider: Arc<WorkflowConfigProvider>) -> Self {
        Self { graph, provider }
    }
}

#[async_trait]
impl RecordMapper for EventFactMapper {
    type Entity = LabEvent;
    type Context = EventContext;

    fn table(&self) -> &str {
        StreamTag::Event.table()
    }

    async fn context(&self) -> Result<EventContext> {
        Ok(EventContext {
            graph: self.graph.transfer_graph().await?,
            resolver: self.provider.refresh().await?,
        })
    }

    fn records(
        &self,
        context: &EventContext,
        etl_date: EtlDate,
        event: &LabEvent,
    ) -> Result<Vec<DenormalizedRecord>> {
        let facts = event_facts(&context.graph, &context.resolver, event)?;
        let mut records = Vec::new();
        for fact in &facts {
            if let Some(reason) = &fact.reject_reason {
                tracing::debug!(event_id = %event.id, reason = %reason, "Event fact rejected");
                continue;
            }
            records.push(fact.to_record(event, etl_date));
            records.extend(fact.ancestry.iter().map(|a| a.to_record(etl_date)));
        }
        Ok(records)
    }
}

impl EntityEtl<EventFactMapper> {
    /// Facts, reject reasons and ancestry of one event, without writing output
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::MissingRelated`] when the event is not in the
    /// current state.
    pub async fn diagnose(&self, event_id: EventId) -> Result<EventDiagnosis> {
        let event = self
            .current_state(event_id.into())
            .await?
            .ok_or_else(|| EtlError::MissingRelated(format!("lab event {event_id}")))?;
        let context = self.mapper().context().await?;
        let facts = event_facts(&context.graph, &context.resolver, &event)?;
        Ok(EventDiagnosis { event, facts })
    }
}

/// Builds the facts of `event`, sorted by sample key with keyless facts last
///
/// # Errors
///
/// Returns [`EtlError::MissingRelated`] when a vessel the event acts on is not
/// in the graph.
pub fn event_facts(
    graph: &TransferGraph,
    resolver: &WorkflowConfigResolver,
    event: &LabEvent,
) -> Result<Vec<EventFact>> {
    let vessels = event.target_vessels();
    if vessels.is_empty() {
        return Ok(vec![EventFact::rejected(
            event,
            None,
            None,
            format!("Skipping lab event {}: no event vessels", event.id),
        )]);
    }

    let mut facts = Vec::new();
    let mut ancestry_done = BTreeSet::new();
    for vessel_id in vessels {
        let vessel = find_vessel(graph, event, vessel_id)?;
        match &vessel.kind {
            VesselKind::Tube => {
                let samples: Vec<&SampleInstance> = vessel.samples.iter().collect();
                let mut tube_facts = vessel_facts(resolver, event, vessel, None, &samples);
                attach_ancestry(
                    graph,
                    resolver,
                    event,
                    vessel.id,
                    &mut tube_facts,
                    &mut ancestry_done,
                );
                facts.extend(tube_facts);
            }
            VesselKind::Container { positions } => {
                let members = vessel.kind.contained_vessels();
                if members.is_empty() {
                    let mut container_facts = Vec::new();
                    if positions.is_empty() {
                        let samples: Vec<&SampleInstance> = vessel.samples.iter().collect();
                        container_facts
                            .extend(vessel_facts(resolver, event, vessel, None, &samples));
                    }
                    for position in positions.keys() {
                        let samples: Vec<&SampleInstance> = vessel
                            .samples
                            .iter()
                            .filter(|s| s.position.as_deref() == Some(position.as_str()))
                            .collect();
                        container_facts.extend(vessel_facts(
                            resolver,
                            event,
                            vessel,
                            Some(position),
                            &samples,
                        ));
                    }
                    attach_ancestry(
                        graph,
                        resolver,
                        event,
                        vessel.id,
                        &mut container_facts,
                        &mut ancestry_done,
                    );
                    facts.extend(container_facts);
                } else {
                    for (position, member_id) in members {
                        let member = find_vessel(graph, event, member_id)?;
                        let samples: Vec<&SampleInstance> = member.samples.iter().collect();
                        let mut member_facts =
                            vessel_facts(resolver, event, member, Some(position), &samples);
                        attach_ancestry(
                            graph,
                            resolver,
                            event,
                            member.id,
                            &mut member_facts,
                            &mut ancestry_done,
                        );
                        facts.extend(member_facts);
                    }
                }
            }
        }
    }

    facts.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    Ok(facts)
}

fn find_vessel<'g>(graph: &'g TransferGraph, event: &LabEvent, id: VesselId) -> Result<&'g Vessel> {
    graph
        .vessel(id)
        .ok_or_else(|| EtlError::MissingRelated(format!("vessel {id} of lab event {}", event.id)))
}

fn vessel_facts(
    resolver: &WorkflowConfigResolver,
    event: &LabEvent,
    vessel: &Vessel,
    position: Option<&str>,
    samples: &[&SampleInstance],
) -> Vec<EventFact> {
    let location = match position {
        Some(position) => format!("vessel {} position {position}", vessel.label),
        None => format!("vessel {}", vessel.label),
    };
    if samples.is_empty() {
        return vec![EventFact::rejected(
            event,
            Some(vessel),
            position,
            format!("Skipping lab event {}, {location}: no sample instances", event.id),
        )];
    }

    samples
        .iter()
        .map(|sample| {
            let batch = sample.latest_batch();
            let workflow_name = batch.and_then(|b| b.workflow.clone());
            let workflow_date = batch.map(|b| b.created).unwrap_or(event.date);
            let workflow = resolver
                .lookup(&event.event_type, workflow_name.as_deref(), workflow_date)
                .cloned();

            let reject_reason = if sample.sample_key.is_none() {
                Some(format!("Skipping lab event {}, {location}: no sample key", event.id))
            } else if workflow.is_none() && resolver.requires_context(&event.event_type) {
                Some(format!(
                    "Skipping lab event {}, {location}: no workflow match for {} in {}",
                    event.id,
                    event.event_type,
                    workflow_name.as_deref().unwrap_or("no workflow")
                ))
            } else {
                None
            };

            EventFact {
                event_id: event.id,
                vessel_id: Some(vessel.id),
                vessel_label: Some(vessel.label.clone()),
                position: position.map(str::to_string),
                sample_key: sample.sample_key.clone(),
                order_id: sample.order_id,
                order_sample_id: sample.order_sample_id,
                batch_name: batch
                    .map(|b| b.name.clone())
                    .unwrap_or_else(|| NO_BATCH.to_string()),
                molecular_index: sample.molecular_index.clone(),
                workflow_name,
                workflow_date,
                workflow,
                reject_reason,
                ancestry: Vec::new(),
            }
        })
        .collect()
}

/// Attaches ancestry to the first exportable fact of `vessel_id`
///
/// Ancestry is built at most once per vessel of an event, using the workflow
/// of the first fact that can be exported.
fn attach_ancestry(
    graph: &TransferGraph,
    resolver: &WorkflowConfigResolver,
    event: &LabEvent,
    vessel_id: VesselId,
    facts: &mut [EventFact],
    done: &mut BTreeSet<VesselId>,
) {
    if done.contains(&vessel_id) {
        return;
    }
    let Some(first) = facts.iter_mut().find(|f| f.can_etl()) else {
        return;
    };
    let Some(workflow_name) = first
        .workflow
        .as_ref()
        .map(|w| w.workflow_name.clone())
        .or_else(|| first.workflow_name.clone())
    else {
        return;
    };
    done.insert(vessel_id);

    let context = resolver.step_context(&workflow_name, &event.event_type, first.workflow_date);
    if !context.applies() {
        return;
    }
    let targets = context.nearest_ancestor_event_types();
    if targets.is_empty() {
        return;
    }

    let mut collector = ClassificationCollector::new(targets);
    AncestryTraversal::new(graph).ancestors_at(event, vessel_id, &mut collector);
    first.ancestry = build_facts(graph, event, vessel_id, &collector.into_found());
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::lab::{BatchRef, Transfer};
    use crate::domain::workflow::{
        ProcessDef, ProcessVersion, StepDef, StepEvent, WorkflowConfig, WorkflowDef,
        WorkflowVersion,
    };
    use crate::core::workflow::stable_hash;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::num::NonZeroUsize;

    pub(crate) fn vid(value: i64) -> VesselId {
        VesselId::new(value).unwrap()
    }

    pub(crate) fn eid(value: i64) -> EventId {
        EventId::new(value).unwrap()
    }

    pub(crate) fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn step(name: &str, ancestry_etl: bool, event_type: &str, needs_batch: bool) -> StepDef {
        StepDef {
            name: name.to_string(),
            ancestry_etl,
            events: vec![StepEvent {
                event_type: event_type.to_string(),
                needs_order_context: false,
                needs_batch_context: needs_batch,
            }],
        }
    }

    /// "Exome" runs the "Library" process: Shear, then Pond, then Catch
    pub(crate) fn library_config() -> WorkflowConfig {
        WorkflowConfig {
            workflows: vec![WorkflowDef {
                name: "Exome".to_string(),
                versions: vec![WorkflowVersion {
                    version: "1".to_string(),
                    effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                    processes: vec!["Library".to_string()],
                }],
            }],
            processes: vec![ProcessDef {
                name: "Library".to_string(),
                versions: vec![ProcessVersion {
                    version: "1".to_string(),
                    effective_date: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
                    steps: vec![
                        step("Shear", true, "Shearing", false),
                        step("Pond", true, "PondRegistration", true),
                        step("Catch", false, "CatchRegistration", true),
                    ],
                }],
            }],
        }
    }

    pub(crate) fn resolver() -> WorkflowConfigResolver {
        WorkflowConfigResolver::new(library_config(), NonZeroUsize::new(32).unwrap())
    }

    pub(crate) fn sample(key: Option<&str>) -> SampleInstance {
        SampleInstance {
            sample_key: key.map(str::to_string),
            order_id: Some(EntityId::new(100).unwrap()),
            order_sample_id: Some(EntityId::new(101).unwrap()),
            batches: vec![BatchRef {
                id: EntityId::new(7).unwrap(),
                name: "LCSET-1".to_string(),
                created: day(1),
                workflow: Some("Exome".to_string()),
            }],
            molecular_index: Some("P7-A1".to_string()),
            position: None,
        }
    }

    pub(crate) fn transfer_event(
        id: i64,
        event_type: &str,
        d: u32,
        from: i64,
        to: i64,
    ) -> LabEvent {
        LabEvent {
            id: eid(id),
            event_type: event_type.to_string(),
            library_type: None,
            location: Some("BAY1".to_string()),
            program: None,
            date: day(d),
            in_place_vessel: None,
            transfers: vec![Transfer {
                source: vid(from),
                target: vid(to),
            }],
        }
    }

    /// Tube 1 is sheared into tube 2 (event 20), then pond-registered into tube 3 (event 30)
    pub(crate) fn library_graph() -> TransferGraph {
        TransferGraph::new(
            vec![
                Vessel::tube(vid(1), "T1").with_sample(sample(Some("SM-1"))),
                Vessel::tube(vid(2), "T2").with_sample(sample(Some("SM-1"))),
                Vessel::tube(vid(3), "T3").with_sample(sample(Some("SM-1"))),
            ],
            vec![
                transfer_event(20, "Shearing", 2, 1, 2),
                transfer_event(30, "PondRegistration", 3, 2, 3),
            ],
        )
    }

    fn etl_date() -> EtlDate {
        "20240301120000".parse().unwrap()
    }

    #[test]
    fn test_event_record_layout_and_ancestry() {
        let graph = library_graph();
        let resolver = resolver();
        let event = graph.event(eid(30)).unwrap().clone();

        let facts = event_facts(&graph, &resolver, &event).unwrap();
        assert_eq!(facts.len(), 1);
        let fact = &facts[0];
        assert!(fact.can_etl());

        let wf = stable_hash(&["Exome", "1"]);
        let proc = stable_hash(&["Library", "1"]);
        assert_eq!(
            fact.to_record(&event, etl_date()).render(),
            format!(
                "20240301120000,F,30,{wf},{proc},PondRegistration,100,101,SM-1,LCSET-1,BAY1,3,,20240103000000,,P7-A1,E,"
            )
        );

        assert_eq!(fact.ancestry.len(), 1);
        assert_eq!(
            fact.ancestry[0].to_record(etl_date()).render(),
            "20240301120000,F,20,2,Shearing,20240102000000,30,3,PondRegistration,20240103000000,A,"
        );
    }

    #[test]
    fn test_step_without_ancestry_flag_has_no_ancestry() {
        let graph = TransferGraph::new(
            (1..=4).map(|i| {
                Vessel::tube(vid(i), format!("T{i}")).with_sample(sample(Some("SM-1")))
            }),
            vec![
                transfer_event(20, "Shearing", 2, 1, 2),
                transfer_event(30, "PondRegistration", 3, 2, 3),
                transfer_event(40, "CatchRegistration", 4, 3, 4),
            ],
        );
        let event = graph.event(eid(40)).unwrap().clone();

        let facts = event_facts(&graph, &resolver(), &event).unwrap();
        assert_eq!(facts.len(), 1);
        assert!(facts[0].can_etl());
        assert!(facts[0].ancestry.is_empty());
    }

    #[test]
    fn test_facts_sorted_with_keyless_last() {
        let graph = TransferGraph::new(
            vec![
                Vessel::tube(vid(1), "T1"),
                Vessel::tube(vid(2), "T2")
                    .with_sample(sample(None))
                    .with_sample(sample(Some("SM-9")))
                    .with_sample(sample(Some("SM-2"))),
            ],
            vec![transfer_event(20, "Shearing", 2, 1, 2)],
        );
        let event = graph.event(eid(20)).unwrap().clone();

        let facts = event_facts(&graph, &resolver(), &event).unwrap();
        let keys: Vec<Option<&str>> = facts.iter().map(|f| f.sample_key.as_deref()).collect();
        assert_eq!(keys, vec![Some("SM-2"), Some("SM-9"), None]);
        assert!(facts[2].reject_reason.as_deref().unwrap().contains("no sample key"));
    }

    #[test]
    fn test_rejections() {
        let graph = TransferGraph::new(
            vec![Vessel::tube(vid(1), "T1"), Vessel::tube(vid(2), "T2")],
            vec![transfer_event(20, "Shearing", 2, 1, 2)],
        );
        let event = graph.event(eid(20)).unwrap().clone();
        let facts = event_facts(&graph, &resolver(), &event).unwrap();
        assert_eq!(facts.len(), 1);
        assert!(facts[0]
            .reject_reason
            .as_deref()
            .unwrap()
            .contains("no sample instances"));

        let no_vessels = LabEvent {
            transfers: vec![],
            ..event.clone()
        };
        let facts = event_facts(&graph, &resolver(), &no_vessels).unwrap();
        assert!(facts[0]
            .reject_reason
            .as_deref()
            .unwrap()
            .contains("no event vessels"));
    }

    #[test]
    fn test_unmatched_event_rejected_only_when_context_needed() {
        let mut unbucketed = sample(Some("SM-1"));
        unbucketed.batches.clear();
        let graph = TransferGraph::new(
            vec![
                Vessel::tube(vid(1), "T1"),
                Vessel::tube(vid(2), "T2").with_sample(unbucketed),
            ],
            vec![
                transfer_event(20, "PondRegistration", 2, 1, 2),
                transfer_event(21, "UnknownEvent", 2, 1, 2),
            ],
        );
        let resolver = resolver();

        // "PondRegistration" has a single row, which matches regardless of workflow
        let pond = event_facts(&graph, &resolver, graph.event(eid(20)).unwrap()).unwrap();
        assert!(pond[0].can_etl());
        assert_eq!(pond[0].batch_name, NO_BATCH);

        let unknown = event_facts(&graph, &resolver, graph.event(eid(21)).unwrap()).unwrap();
        assert!(unknown[0].can_etl());
        assert!(unknown[0].workflow.is_none());
    }

    #[test]
    fn test_positioned_container_expands_to_members() {
        let positions = BTreeMap::from([
            ("A01".to_string(), Some(vid(11))),
            ("A02".to_string(), Some(vid(12))),
        ]);
        let graph = TransferGraph::new(
            vec![
                Vessel::tube(vid(1), "T1"),
                Vessel::container(vid(10), "RACK10", positions),
                Vessel::tube(vid(11), "T11").with_sample(sample(Some("SM-2"))),
                Vessel::tube(vid(12), "T12").with_sample(sample(Some("SM-1"))),
            ],
            vec![transfer_event(20, "Shearing", 2, 1, 10)],
        );
        let event = graph.event(eid(20)).unwrap().clone();

        let facts = event_facts(&graph, &resolver(), &event).unwrap();
        let rows: Vec<(Option<VesselId>, Option<&str>)> = facts
            .iter()
            .map(|f| (f.vessel_id, f.position.as_deref()))
            .collect();
        assert_eq!(rows, vec![(Some(vid(12)), Some("A02")), (Some(vid(11)), Some("A01"))]);
    }

    #[test]
    fn test_anonymous_container_expands_to_positions() {
        let positions = BTreeMap::from([("A01".to_string(), None), ("B01".to_string(), None)]);
        let mut in_a01 = sample(Some("SM-1"));
        in_a01.position = Some("A01".to_string());
        let graph = TransferGraph::new(
            vec![
                Vessel::tube(vid(1), "T1"),
                Vessel::container(vid(10), "PLATE10", positions).with_sample(in_a01),
            ],
            vec![transfer_event(20, "Shearing", 2, 1, 10)],
        );
        let event = graph.event(eid(20)).unwrap().clone();

        let facts = event_facts(&graph, &resolver(), &event).unwrap();
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].position.as_deref(), Some("A01"));
        assert!(facts[0].can_etl());
        assert_eq!(facts[1].position.as_deref(), Some("B01"));
        assert!(facts[1]
            .reject_reason
            .as_deref()
            .unwrap()
            .contains("no sample instances"));
    }

    #[test]
    fn test_missing_vessel_is_recoverable() {
        let graph = TransferGraph::new(vec![], vec![transfer_event(20, "Shearing", 2, 1, 2)]);
        let event = graph.event(eid(20)).unwrap().clone();
        let err = event_facts(&graph, &resolver(), &event).unwrap_err();
        assert!(matches!(err, EtlError::MissingRelated(_)));
        assert!(!err.is_systemic());
    }
}
