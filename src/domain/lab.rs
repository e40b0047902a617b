// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Lab entities consumed by the event and ancestry ETL
//!
//! Only the identifiers, relationships and accessors the ETL needs are modeled
//! here. Vessel kinds are resolved once, when the entity is loaded, into the
//! [`VesselKind`] variant type.

use crate::domain::change::Entity;
use crate::domain::ids::{EntityId, EventId, VesselId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// What a vessel is, as far as traversal is concerned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VesselKind {
    /// A single tube
    Tube,
    /// A plate, rack or flowcell
    ///
    /// Each position either holds its own vessel (a tube in a rack) or is an
    /// anonymous member such as a plate well (`None`).
    Container {
        #[serde(default)]
        positions: BTreeMap<String, Option<VesselId>>,
    },
}

impl VesselKind {
    /// True for containers whose members are all anonymous
    pub fn is_anonymous_container(&self) -> bool {
        match self {
            VesselKind::Tube => false,
            VesselKind::Container { positions } => positions.values().all(Option::is_none),
        }
    }

    /// Vessels held at occupied positions, by position name
    pub fn contained_vessels(&self) -> Vec<(&str, VesselId)> {
        match self {
            VesselKind::Tube => Vec::new(),
            VesselKind::Container { positions } => positions
                .iter()
                .filter_map(|(position, vessel)| vessel.map(|v| (position.as_str(), v)))
                .collect(),
        }
    }
}

/// Lab batch a sample was bucketed into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRef {
    /// Batch primary key
    pub id: EntityId,
    /// Batch name, e.g. "LCSET-1234"
    pub name: String,
    /// When the batch was created
    pub created: DateTime<Utc>,
    /// Workflow the batch runs under
    #[serde(default)]
    pub workflow: Option<String>,
}

/// A sample as it sits in a vessel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleInstance {
    /// Sample key, e.g. "SM-1234"
    #[serde(default)]
    pub sample_key: Option<String>,
    /// Product order the sample belongs to
    #[serde(default)]
    pub order_id: Option<EntityId>,
    /// Product order sample link
    #[serde(default)]
    pub order_sample_id: Option<EntityId>,
    /// Batches the sample was added to, newest last
    #[serde(default)]
    pub batches: Vec<BatchRef>,
    /// Molecular index (barcode) name
    #[serde(default)]
    pub molecular_index: Option<String>,
    /// Position within an anonymous container
    #[serde(default)]
    pub position: Option<String>,
}

impl SampleInstance {
    /// Most recently created batch, if any
    pub fn latest_batch(&self) -> Option<&BatchRef> {
        self.batches.iter().max_by_key(|b| b.created)
    }
}

/// A vessel node of the transfer graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vessel {
    /// Vessel primary key
    pub id: VesselId,
    /// Barcode or label
    pub label: String,
    /// Tube or container
    #[serde(flatten)]
    pub kind: VesselKind,
    /// Samples in this vessel
    #[serde(default)]
    pub samples: Vec<SampleInstance>,
}

impl Vessel {
    /// Creates a tube
    pub fn tube(id: VesselId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            kind: VesselKind::Tube,
            samples: Vec::new(),
        }
    }

    /// Creates a container from its positions
    pub fn container(
        id: VesselId,
        label: impl Into<String>,
        positions: BTreeMap<String, Option<VesselId>>,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            kind: VesselKind::Container { positions },
            samples: Vec::new(),
        }
    }

    /// Adds a sample instance
    pub fn with_sample(mut self, sample: SampleInstance) -> Self {
        self.samples.push(sample);
        self
    }
}

/// Movement of material from one vessel to another during an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Transfer {
    /// Source vessel
    pub source: VesselId,
    /// Target vessel
    pub target: VesselId,
}

/// A lab event: an in-place operation on one vessel or a set of transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabEvent {
    /// Event primary key
    pub id: EventId,
    /// Event classification, e.g. "ShearingTransfer"
    pub event_type: String,
    /// Library name the event produces, when different from the event type
    #[serde(default)]
    pub library_type: Option<String>,
    /// Where the event happened
    #[serde(default)]
    pub location: Option<String>,
    /// Robot program
    #[serde(default)]
    pub program: Option<String>,
    /// When the event happened
    pub date: DateTime<Utc>,
    /// Vessel for in-place events
    #[serde(default)]
    pub in_place_vessel: Option<VesselId>,
    /// Transfers performed by the event
    #[serde(default)]
    pub transfers: Vec<Transfer>,
}

impl LabEvent {
    /// Vessels the event acts on: transfer targets, or the in-place vessel
    pub fn target_vessels(&self) -> Vec<VesselId> {
        if self.transfers.is_empty() {
            return self.in_place_vessel.into_iter().collect();
        }
        let targets: BTreeSet<VesselId> = self.transfers.iter().map(|t| t.target).collect();
        targets.into_iter().collect()
    }

    /// Every vessel the event touches, sources included
    pub fn touched_vessels(&self) -> BTreeSet<VesselId> {
        let mut vessels: BTreeSet<VesselId> = self.in_place_vessel.into_iter().collect();
        for transfer in &self.transfers {
            vessels.insert(transfer.source);
            vessels.insert(transfer.target);
        }
        vessels
    }

    /// Name used for the event in ancestry facts
    pub fn library_name(&self) -> &str {
        self.library_type.as_deref().unwrap_or(&self.event_type)
    }
}

impl Entity for LabEvent {
    fn entity_id(&self) -> EntityId {
        self.id.into()
    }
}
