// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Ancestor and descendant walks over the transfer graph
//!
//! A walk visits `(event, vessel)` pairs. Toward ancestors, the events at a
//! vessel are the transfers into it and the in-place events on it, newest
//! first and no later than the event the walk came from. Toward descendants,
//! they are the transfers out of it and its in-place events, no earlier than
//! the event the walk came from. The visitor decides at each pair whether the
//! walk continues past it.
//!
//! A tube also carries the events of the containers holding it. A container
//! reached through a transfer also carries the events of its positioned members.
//! Visited pairs and expanded vessels are tracked, so the walk terminates even
//! on a graph with cycles.

use crate::core::ancestry::graph::TransferGraph;
use crate::domain::ids::{EventId, VesselId};
use crate::domain::lab::{LabEvent, Vessel};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Direction of a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward the events that produced a vessel
    Ancestors,
    /// Toward the events that consumed a vessel
    Descendants,
}

/// What the walk does after a visit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitDecision {
    /// Keep walking past this event
    Continue,
    /// Do not walk past this event, and skip older (or newer) events on the
    /// same vessel
    StopBranch,
}

/// Callback invoked once per visited `(event, vessel)` pair
pub trait TraversalVisitor {
    fn visit(&mut self, event: &LabEvent, vessel: &Vessel) -> VisitDecision;
}

#[derive(Debug, Clone, Copy)]
struct Frontier {
    vessel: VesselId,
    bound: Option<DateTime<Utc>>,
    via_transfer: bool,
}

/// Walks a [`TransferGraph`]
#[derive(Debug, Clone, Copy)]
pub struct AncestryTraversal<'g> {
    graph: &'g TransferGraph,
}

impl<'g> AncestryTraversal<'g> {
    pub fn new(graph: &'g TransferGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &'g TransferGraph {
        self.graph
    }

    /// Walks toward the ancestors of `event`
    ///
    /// A transfer event starts at its source vessels, an in-place event at its
    /// own vessel.
    pub fn ancestors_of<V: TraversalVisitor>(&self, event: &LabEvent, visitor: &mut V) {
        let starts: Vec<Frontier> = if event.transfers.is_empty() {
            event
                .in_place_vessel
                .into_iter()
                .map(|vessel| Frontier {
                    vessel,
                    bound: Some(event.date),
                    via_transfer: false,
                })
                .collect()
        } else {
            let sources: BTreeSet<VesselId> = event.transfers.iter().map(|t| t.source).collect();
            sources
                .into_iter()
                .map(|vessel| Frontier {
                    vessel,
                    bound: Some(event.date),
                    via_transfer: true,
                })
                .collect()
        };
        self.walk(Direction::Ancestors, starts, Some(event.id), visitor);
    }

    /// Walks toward the ancestors of `vessel` as it was at `event`
    ///
    /// Starts at the vessel itself, so only the transfers of `event` that led
    /// into `vessel` (or into a container holding it) are followed.
    pub fn ancestors_at<V: TraversalVisitor>(
        &self,
        event: &LabEvent,
        vessel: VesselId,
        visitor: &mut V,
    ) {
        let start = Frontier {
            vessel,
            bound: Some(event.date),
            via_transfer: true,
        };
        self.walk(Direction::Ancestors, vec![start], Some(event.id), visitor);
    }

    /// Walks toward every event downstream of `vessels`
    pub fn descendants_of<V: TraversalVisitor>(&self, vessels: &[VesselId], visitor: &mut V) {
        let starts: Vec<Frontier> = vessels
            .iter()
            .map(|&vessel| Frontier {
                vessel,
                bound: None,
                via_transfer: true,
            })
            .collect();
        self.walk(Direction::Descendants, starts, None, visitor);
    }

    fn walk<V: TraversalVisitor>(
        &self,
        direction: Direction,
        starts: Vec<Frontier>,
        origin: Option<EventId>,
        visitor: &mut V,
    ) {
        let mut visited: BTreeSet<(EventId, VesselId)> = BTreeSet::new();
        let mut expanded: BTreeSet<VesselId> = BTreeSet::new();
        let mut stack = starts;
        stack.reverse();

        while let Some(frontier) = stack.pop() {
            let Some(vessel) = self.graph.vessel(frontier.vessel) else {
                tracing::debug!(vessel = %frontier.vessel, "Vessel not in transfer graph");
                continue;
            };

            if expanded.insert(vessel.id) {
                for container in self.graph.containers_of(vessel.id) {
                    stack.push(Frontier {
                        vessel: container,
                        bound: frontier.bound,
                        via_transfer: false,
                    });
                }
                if frontier.via_transfer {
                    for member in self.graph.members_of(vessel.id) {
                        stack.push(Frontier {
                            vessel: member,
                            bound: frontier.bound,
                            via_transfer: false,
                        });
                    }
                }
            }

            for (event, next) in self.candidates(direction, vessel.id, frontier.bound) {
                if !visited.insert((event.id, vessel.id)) {
                    continue;
                }
                // the origin is walked through but never visited
                let decision = if Some(event.id) == origin {
                    VisitDecision::Continue
                } else {
                    visitor.visit(event, vessel)
                };
                match decision {
                    VisitDecision::StopBranch => break,
                    VisitDecision::Continue => {
                        for beyond in next {
                            stack.push(Frontier {
                                vessel: beyond,
                                bound: Some(event.date),
                                via_transfer: true,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Events at `vessel` in walk order, each with the vessels beyond it
    fn candidates(
        &self,
        direction: Direction,
        vessel: VesselId,
        bound: Option<DateTime<Utc>>,
    ) -> Vec<(&'g LabEvent, Vec<VesselId>)> {
        let edges = match direction {
            Direction::Ancestors => self.graph.incoming(vessel),
            Direction::Descendants => self.graph.outgoing(vessel),
        };

        let mut by_event: BTreeMap<EventId, Vec<VesselId>> = BTreeMap::new();
        for edge in edges {
            by_event.entry(edge.event).or_default().push(edge.vessel);
        }
        for &event in self.graph.in_place(vessel) {
            by_event.entry(event).or_default();
        }

        let mut candidates: Vec<(&'g LabEvent, Vec<VesselId>)> = by_event
            .into_iter()
            .filter_map(|(id, next)| self.graph.event(id).map(|event| (event, next)))
            .filter(|(event, _)| match (direction, bound) {
                (_, None) => true,
                (Direction::Ancestors, Some(bound)) => event.date <= bound,
                (Direction::Descendants, Some(bound)) => event.date >= bound,
            })
            .collect();

        match direction {
            Direction::Ancestors => {
                candidates.sort_by(|(a, _), (b, _)| b.date.cmp(&a.date).then(b.id.cmp(&a.id)))
            }
            Direction::Descendants => {
                candidates.sort_by(|(a, _), (b, _)| a.date.cmp(&b.date).then(a.id.cmp(&b.id)))
            }
        }
        candidates
    }
}

/// Collects the nearest events of the target classifications
///
/// A match stops its branch, so an older event of the same classification
/// behind it is never reported.
#[derive(Debug, Default)]
pub struct ClassificationCollector {
    targets: BTreeSet<String>,
    found: BTreeMap<EventId, BTreeSet<VesselId>>,
}

impl ClassificationCollector {
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            found: BTreeMap::new(),
        }
    }

    /// Matched events and the vessels they were found at
    pub fn found(&self) -> &BTreeMap<EventId, BTreeSet<VesselId>> {
        &self.found
    }

    pub fn into_found(self) -> BTreeMap<EventId, BTreeSet<VesselId>> {
        self.found
    }
}

impl TraversalVisitor for ClassificationCollector {
    fn visit(&mut self, event: &LabEvent, vessel: &Vessel) -> VisitDecision {
        if self.targets.contains(&event.event_type) {
            self.found.entry(event.id).or_default().insert(vessel.id);
            VisitDecision::StopBranch
        } else {
            VisitDecision::Continue
        }
    }
}

/// Collects every visited event
#[derive(Debug, Default)]
pub struct AllEventsCollector {
    events: BTreeSet<EventId>,
}

impl AllEventsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visited events in ascending id order
    pub fn into_events(self) -> BTreeSet<EventId> {
        self.events
    }
}

impl TraversalVisitor for AllEventsCollector {
    fn visit(&mut self, event: &LabEvent, _vessel: &Vessel) -> VisitDecision {
        self.events.insert(event.id);
        VisitDecision::Continue
    }
}
