// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Transfer graph, ancestry walks and the event fact ETL

pub mod events;
pub mod facts;
pub mod graph;
pub mod traversal;

pub use events::{
    event_facts, EventContext, EventDiagnosis, EventFact, EventFactEtl, EventFactMapper,
    LAB_EVENT_TYPE, NO_BATCH,
};
pub use facts::{ancestor_vessels, build_facts, AncestryFact};
pub use graph::{Edge, TransferGraph};
pub use traversal::{
    AllEventsCollector, AncestryTraversal, ClassificationCollector, Direction, TraversalVisitor,
    VisitDecision,
};
