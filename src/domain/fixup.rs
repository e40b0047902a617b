// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Manual data corrections and the subjects they touch

use crate::domain::change::Entity;
use crate::domain::ids::{EntityId, EventId, VesselId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audited record of a manual data correction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixupNote {
    pub id: EntityId,
    /// Ticket or free-text justification
    #[serde(default)]
    pub reason: String,
}

impl Entity for FixupNote {
    fn entity_id(&self) -> EntityId {
        self.id
    }
}

/// Entity types a correction can touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    LabEvent,
    Sample,
    BatchStartingVessel,
    OrderSample,
    BucketEntry,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubjectKind::LabEvent => "LabEvent",
            SubjectKind::Sample => "Sample",
            SubjectKind::BatchStartingVessel => "BatchStartingVessel",
            SubjectKind::OrderSample => "OrderSample",
            SubjectKind::BucketEntry => "BucketEntry",
        };
        write!(f, "{name}")
    }
}

/// Snapshot of a corrected subject, resolved to the vessels it implies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subject", rename_all = "snake_case")]
pub enum FixupSeed {
    /// A lab event; touches its in-place vessel and transfer vessels
    LabEvent {
        event_id: EventId,
        vessels: Vec<VesselId>,
    },
    /// A sample; touches the vessels it sits in
    Sample {
        sample_id: EntityId,
        vessels: Vec<VesselId>,
    },
    /// Link between a lab batch and one of its starting vessels
    BatchStartingVessel {
        id: EntityId,
        batch_id: EntityId,
        vessel: VesselId,
    },
    /// Product order sample; touches the vessels of its sample
    OrderSample {
        id: EntityId,
        sample_vessels: Vec<VesselId>,
    },
    /// Bucket entry for one vessel
    BucketEntry { id: EntityId, vessel: VesselId },
}

impl FixupSeed {
    /// Kind of subject this seed was taken from
    pub fn kind(&self) -> SubjectKind {
        match self {
            FixupSeed::LabEvent { .. } => SubjectKind::LabEvent,
            FixupSeed::Sample { .. } => SubjectKind::Sample,
            FixupSeed::BatchStartingVessel { .. } => SubjectKind::BatchStartingVessel,
            FixupSeed::OrderSample { .. } => SubjectKind::OrderSample,
            FixupSeed::BucketEntry { .. } => SubjectKind::BucketEntry,
        }
    }

    /// Primary key of the subject
    pub fn subject_id(&self) -> EntityId {
        match self {
            FixupSeed::LabEvent { event_id, .. } => (*event_id).into(),
            FixupSeed::Sample { sample_id, .. } => *sample_id,
            FixupSeed::BatchStartingVessel { id, .. }
            | FixupSeed::OrderSample { id, .. }
            | FixupSeed::BucketEntry { id, .. } => *id,
        }
    }

    /// Vessels the subject touches
    pub fn touched_vessels(&self) -> Vec<VesselId> {
        match self {
            FixupSeed::LabEvent { vessels, .. } | FixupSeed::Sample { vessels, .. } => {
                vessels.clone()
            }
            FixupSeed::OrderSample { sample_vessels, .. } => sample_vessels.clone(),
            FixupSeed::BatchStartingVessel { vessel, .. }
            | FixupSeed::BucketEntry { vessel, .. } => vec![*vessel],
        }
    }
}
