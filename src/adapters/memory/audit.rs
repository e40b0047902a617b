// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! In-memory audit trail, transfer graph and workflow configuration sources

use crate::adapters::store::{
    AssociationQuery, AuditStore, GraphStore, SubjectChange, WorkflowConfigSource,
};
use crate::core::ancestry::graph::TransferGraph;
use crate::domain::change::ChangeKind;
use crate::domain::errors::{EtlError, StoreError};
use crate::domain::fixup::{FixupSeed, SubjectKind};
use crate::domain::ids::{EntityId, Revision};
use crate::domain::workflow::WorkflowConfig;
use crate::domain::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type SubjectKey = (SubjectKind, EntityId);

#[derive(Default)]
struct Trail {
    changes: Vec<SubjectChange>,
    snapshots: BTreeMap<(SubjectKind, EntityId, Revision), FixupSeed>,
    associations: BTreeMap<String, Vec<(EntityId, EntityId)>>,
    broken: BTreeSet<SubjectKey>,
    unavailable: bool,
}

/// Audit trail of correctable subjects
#[derive(Default)]
pub struct MemoryAuditStore {
    trail: Mutex<Trail>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit a subject change
    ///
    /// Snapshots are kept for adds and modifications. A delete carries the
    /// last known state in its seed but stores no snapshot, the way an audit
    /// table stores an empty row for a removal.
    pub fn record(&self, kind: ChangeKind, revision: Revision, seed: FixupSeed) {
        let mut trail = self.lock();
        if kind != ChangeKind::Deleted {
            trail
                .snapshots
                .insert((seed.kind(), seed.subject_id(), revision), seed.clone());
        }
        trail.changes.push(SubjectChange {
            kind,
            revision,
            seed,
        });
    }

    /// Record that `key` belonged to `owner` in `audit_table`
    pub fn associate(&self, audit_table: &str, key: EntityId, owner: EntityId) {
        self.lock()
            .associations
            .entry(audit_table.to_string())
            .or_default()
            .push((key, owner));
    }

    /// Make the audit trail of one subject fail to load
    pub fn break_trail(&self, kind: SubjectKind, id: EntityId) {
        self.lock().broken.insert((kind, id));
    }

    /// Make every audit query fail as if the store were down
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    fn lock(&self) -> MutexGuard<'_, Trail> {
        self.trail.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn changes_at_revision(&self, revision: Revision) -> Result<Vec<SubjectChange>> {
        let trail = self.lock();
        if trail.unavailable {
            return Err(StoreError::Unavailable("audit store".to_string()).into());
        }
        Ok(trail
            .changes
            .iter()
            .filter(|change| change.revision == revision)
            .cloned()
            .collect())
    }

    async fn revisions_of(&self, kind: SubjectKind, id: EntityId) -> Result<Vec<Revision>> {
        let trail = self.lock();
        if trail.unavailable {
            return Err(StoreError::Unavailable("audit store".to_string()).into());
        }
        if trail.broken.contains(&(kind, id)) {
            return Err(EtlError::AuditTrail(format!("audit trail of {kind} {id}")));
        }

        let revisions: BTreeSet<Revision> = trail
            .changes
            .iter()
            .filter(|change| change.seed.kind() == kind && change.seed.subject_id() == id)
            .map(|change| change.revision)
            .collect();
        Ok(revisions.into_iter().collect())
    }

    async fn snapshot_at(
        &self,
        kind: SubjectKind,
        id: EntityId,
        revision: Revision,
    ) -> Result<Option<FixupSeed>> {
        Ok(self.lock().snapshots.get(&(kind, id, revision)).cloned())
    }

    async fn associated_ids(
        &self,
        query: &AssociationQuery,
        ids: &[EntityId],
    ) -> Result<BTreeSet<EntityId>> {
        let trail = self.lock();
        let rows = trail.associations.get(&query.audit_table).ok_or_else(|| {
            StoreError::QueryFailed(format!("unknown audit table {}", query.audit_table))
        })?;

        Ok(rows
            .iter()
            .filter(|(key, _)| ids.contains(key))
            .map(|&(_, owner)| owner)
            .collect())
    }
}

/// Holds the current transfer graph snapshot
pub struct MemoryGraphStore {
    graph: Mutex<Arc<TransferGraph>>,
}

impl MemoryGraphStore {
    pub fn new(graph: TransferGraph) -> Self {
        Self {
            graph: Mutex::new(Arc::new(graph)),
        }
    }

    pub fn replace(&self, graph: TransferGraph) {
        *self.graph.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(graph);
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn transfer_graph(&self) -> Result<Arc<TransferGraph>> {
        Ok(Arc::clone(
            &self.graph.lock().unwrap_or_else(PoisonError::into_inner),
        ))
    }
}

/// Holds the current workflow configuration
pub struct MemoryWorkflowSource {
    config: Mutex<WorkflowConfig>,
    loads: AtomicUsize,
}

impl MemoryWorkflowSource {
    pub fn new(config: WorkflowConfig) -> Self {
        Self {
            config: Mutex::new(config),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn replace(&self, config: WorkflowConfig) {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Number of times the configuration was loaded
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowConfigSource for MemoryWorkflowSource {
    async fn load(&self) -> Result<WorkflowConfig> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
