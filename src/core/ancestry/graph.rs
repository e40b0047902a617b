// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Arena of vessels and lab events with adjacency lists
//!
//! The graph is built once from a snapshot and never mutated. Nodes are keyed
//! by their stable ids; edges are stored as id lists so a malformed snapshot
//! with cycles cannot create reference cycles.

use crate::domain::ids::{EventId, VesselId};
use crate::domain::lab::{LabEvent, Vessel};
use std::collections::{BTreeMap, BTreeSet};

/// Transfer edge as seen from one end
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    /// Event that performed the transfer
    pub event: EventId,
    /// Vessel at the other end of the transfer
    pub vessel: VesselId,
}

/// Immutable transfer graph snapshot
#[derive(Debug, Default)]
pub struct TransferGraph {
    vessels: BTreeMap<VesselId, Vessel>,
    events: BTreeMap<EventId, LabEvent>,
    incoming: BTreeMap<VesselId, Vec<Edge>>,
    outgoing: BTreeMap<VesselId, Vec<Edge>>,
    in_place: BTreeMap<VesselId, Vec<EventId>>,
    containers_of: BTreeMap<VesselId, BTreeSet<VesselId>>,
}

impl TransferGraph {
    /// Builds the graph and its indexes
    pub fn new(
        vessels: impl IntoIterator<Item = Vessel>,
        events: impl IntoIterator<Item = LabEvent>,
    ) -> Self {
        let mut graph = Self::default();

        for vessel in vessels {
            for (_, member) in vessel.kind.contained_vessels() {
                graph
                    .containers_of
                    .entry(member)
                    .or_default()
                    .insert(vessel.id);
            }
            graph.vessels.insert(vessel.id, vessel);
        }

        for event in events {
            if let Some(vessel) = event.in_place_vessel {
                graph.in_place.entry(vessel).or_default().push(event.id);
            }
            for transfer in &event.transfers {
                graph.incoming.entry(transfer.target).or_default().push(Edge {
                    event: event.id,
                    vessel: transfer.source,
                });
                graph.outgoing.entry(transfer.source).or_default().push(Edge {
                    event: event.id,
                    vessel: transfer.target,
                });
            }
            graph.events.insert(event.id, event);
        }

        for edges in graph.incoming.values_mut().chain(graph.outgoing.values_mut()) {
            edges.sort();
            edges.dedup();
        }
        for events in graph.in_place.values_mut() {
            events.sort();
            events.dedup();
        }

        tracing::debug!(
            vessels = graph.vessels.len(),
            events = graph.events.len(),
            "Built transfer graph"
        );
        graph
    }

    pub fn vessel(&self, id: VesselId) -> Option<&Vessel> {
        self.vessels.get(&id)
    }

    pub fn event(&self, id: EventId) -> Option<&LabEvent> {
        self.events.get(&id)
    }

    pub fn events(&self) -> impl Iterator<Item = &LabEvent> {
        self.events.values()
    }

    /// Transfers into `vessel`; each edge names the source vessel
    pub fn incoming(&self, vessel: VesselId) -> &[Edge] {
        self.incoming.get(&vessel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Transfers out of `vessel`; each edge names the target vessel
    pub fn outgoing(&self, vessel: VesselId) -> &[Edge] {
        self.outgoing.get(&vessel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Events applied to `vessel` without a transfer
    pub fn in_place(&self, vessel: VesselId) -> &[EventId] {
        self.in_place.get(&vessel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Containers holding `vessel` at some position
    pub fn containers_of(&self, vessel: VesselId) -> impl Iterator<Item = VesselId> + '_ {
        self.containers_of
            .get(&vessel)
            .into_iter()
            .flat_map(|containers| containers.iter().copied())
    }

    /// Vessels occupying positions of `container`
    pub fn members_of(&self, container: VesselId) -> Vec<VesselId> {
        self.vessel(container)
            .map(|v| {
                v.kind
                    .contained_vessels()
                    .into_iter()
                    .map(|(_, member)| member)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn vessel_count(&self) -> usize {
        self.vessels.len()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}
