// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Ancestry facts and container disambiguation

use crate::core::ancestry::graph::TransferGraph;
use crate::core::record::{DenormalizedRecord, StreamTag};
use crate::domain::change::EtlDate;
use crate::domain::ids::{EntityId, EventId, VesselId};
use crate::domain::lab::{LabEvent, VesselKind};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// One edge of the library ancestry table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AncestryFact {
    pub ancestor_event_id: EventId,
    pub ancestor_vessel_id: VesselId,
    pub ancestor_classification: String,
    pub ancestor_timestamp: DateTime<Utc>,
    pub child_event_id: EventId,
    pub child_vessel_id: VesselId,
    pub child_classification: String,
    pub child_timestamp: DateTime<Utc>,
}

impl AncestryFact {
    /// Ancestry stream record
    pub fn to_record(&self, etl_date: EtlDate) -> DenormalizedRecord {
        DenormalizedRecord::upsert(etl_date)
            .id(EntityId::from(self.ancestor_event_id))
            .number(Some(self.ancestor_vessel_id))
            .text(Some(&self.ancestor_classification))
            .timestamp(Some(self.ancestor_timestamp))
            .id(EntityId::from(self.child_event_id))
            .number(Some(self.child_vessel_id))
            .text(Some(&self.child_classification))
            .timestamp(Some(self.child_timestamp))
            .tagged(StreamTag::Ancestry)
    }
}

/// Vessels an ancestor event contributes facts for
///
/// A tube stands for itself. A container whose positions are all empty stands
/// for itself. Any other container is replaced by its occupied positions,
/// minus vessels the traversal already collected for the same event, so a tube
/// reached both directly and through its rack is reported once.
pub fn ancestor_vessels(
    graph: &TransferGraph,
    collected: &BTreeSet<VesselId>,
) -> BTreeSet<VesselId> {
    let mut vessels = BTreeSet::new();
    for &id in collected {
        match graph.vessel(id) {
            Some(vessel)
                if matches!(vessel.kind, VesselKind::Container { .. })
                    && !vessel.kind.is_anonymous_container() =>
            {
                for (_, member) in vessel.kind.contained_vessels() {
                    if !collected.contains(&member) {
                        vessels.insert(member);
                    }
                }
            }
            _ => {
                vessels.insert(id);
            }
        }
    }
    vessels
}

/// Builds the facts linking `child` at `child_vessel` to the ancestors found
pub fn build_facts(
    graph: &TransferGraph,
    child: &LabEvent,
    child_vessel: VesselId,
    found: &BTreeMap<EventId, BTreeSet<VesselId>>,
) -> Vec<AncestryFact> {
    let mut facts = Vec::new();
    for (&ancestor_id, collected) in found {
        let Some(ancestor) = graph.event(ancestor_id) else {
            continue;
        };
        for vessel in ancestor_vessels(graph, collected) {
            facts.push(AncestryFact {
                ancestor_event_id: ancestor.id,
                ancestor_vessel_id: vessel,
                ancestor_classification: ancestor.library_name().to_string(),
                ancestor_timestamp: ancestor.date,
                child_event_id: child.id,
                child_vessel_id: child_vessel,
                child_classification: child.library_name().to_string(),
                child_timestamp: child.date,
            });
        }
    }
    facts
}
