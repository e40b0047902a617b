// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Storage collaborator traits
//!
//! This module defines the traits the backing store must implement for datawh
//! to read audited changes and current entity state, and for the run
//! coordinator to persist its bookkeeping.

use crate::core::ancestry::graph::TransferGraph;
use crate::core::state::watermark::Watermark;
use crate::domain::change::{ChangeKind, ChangeRecord, Entity, EtlDate, RevisionInterval};
use crate::domain::fixup::{FixupSeed, SubjectKind};
use crate::domain::ids::{EntityId, EntityType, Revision};
use crate::domain::workflow::WorkflowConfig;
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Revision-numbered change feed for one kind of audited entity
#[async_trait]
pub trait ChangeFeed<E: Entity>: Send + Sync {
    /// Fetch every audited change of `entity_type` in `(last, current]`
    ///
    /// # Returns
    ///
    /// Change records ordered by revision ascending.
    ///
    /// # Errors
    ///
    /// Returns a store error if the revision store is unavailable.
    async fn changes_in_revision_range(
        &self,
        entity_type: &EntityType,
        interval: &RevisionInterval,
    ) -> Result<Vec<ChangeRecord<E>>>;

    /// Ids in `[start, end]` that the audit trail records as deleted
    ///
    /// Used by backfill, which works on id ranges instead of revisions.
    async fn deleted_ids_in_range(
        &self,
        entity_type: &EntityType,
        start: EntityId,
        end: EntityId,
    ) -> Result<Vec<EntityId>>;
}

/// Point-in-time lookup of current entity state
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Look up one entity by id
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` when the entity does not exist.
    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>>;

    /// Look up several entities at once
    ///
    /// Ids that do not exist are simply absent from the result.
    async fn find_by_ids(&self, ids: &[EntityId]) -> Result<Vec<E>>;

    /// Ids of existing entities in `[start, end]`, ascending
    async fn ids_in_range(&self, start: EntityId, end: EntityId) -> Result<Vec<EntityId>>;
}

/// Maps wall-clock time onto the audit timeline
#[async_trait]
pub trait RevisionClock: Send + Sync {
    /// Newest revision committed at or before `as_of`
    async fn current_revision_number(&self, as_of: DateTime<Utc>) -> Result<Revision>;
}

/// Secondary query against an audit table, keyed by a foreign-key column
///
/// Used when an audited edge entity has been deleted and its in-memory
/// relationship to the owning entity is gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationQuery {
    /// Audit table to query, e.g. "ledger_entry_aud"
    pub audit_table: String,
    /// Column holding the audited entity's id
    pub key_column: String,
    /// Column holding the owning entity's id
    pub owner_column: String,
}

impl AssociationQuery {
    /// Creates a new association query
    pub fn new(
        audit_table: impl Into<String>,
        key_column: impl Into<String>,
        owner_column: impl Into<String>,
    ) -> Self {
        Self {
            audit_table: audit_table.into(),
            key_column: key_column.into(),
            owner_column: owner_column.into(),
        }
    }
}

/// One audited change of a correctable subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectChange {
    pub kind: ChangeKind,
    pub revision: Revision,
    pub seed: FixupSeed,
}

/// Direct access to the audit trail
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Every correctable subject changed at exactly `revision`
    async fn changes_at_revision(&self, revision: Revision) -> Result<Vec<SubjectChange>>;

    /// Revisions at which a subject was audited, ascending
    async fn revisions_of(&self, kind: SubjectKind, id: EntityId) -> Result<Vec<Revision>>;

    /// Snapshot of a subject as audited at `revision`
    async fn snapshot_at(
        &self,
        kind: SubjectKind,
        id: EntityId,
        revision: Revision,
    ) -> Result<Option<FixupSeed>>;

    /// Owner ids associated with `ids` through `query`
    async fn associated_ids(
        &self,
        query: &AssociationQuery,
        ids: &[EntityId],
    ) -> Result<BTreeSet<EntityId>>;
}

/// Source of the current transfer graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Current vessels, events and transfers
    async fn transfer_graph(&self) -> Result<Arc<TransferGraph>>;
}

/// Source of the hierarchical workflow configuration
#[async_trait]
pub trait WorkflowConfigSource: Send + Sync {
    /// Load the current configuration
    async fn load(&self) -> Result<WorkflowConfig>;
}

/// Run bookkeeping persistence
///
/// Holds the watermark, the workflow configuration hash and the ready markers
/// that tell downstream loaders a run's streams are complete.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Load the watermark of the last successful run
    ///
    /// # Returns
    ///
    /// Returns `Ok(None)` when no run has ever completed.
    ///
    /// # Errors
    ///
    /// Returns an error if the watermark exists but cannot be read or parsed.
    async fn load_watermark(&self) -> Result<Option<Watermark>>;

    /// Persist the watermark
    async fn save_watermark(&self, watermark: &Watermark) -> Result<()>;

    /// Load the aggregate hash of the last exported workflow configuration
    async fn load_config_hash(&self) -> Result<Option<String>>;

    /// Persist the aggregate workflow configuration hash
    async fn save_config_hash(&self, hash: &str) -> Result<()>;

    /// Signal that every stream of the run is closed
    async fn mark_ready(&self, etl_date: &EtlDate) -> Result<()>;

    /// Runs whose ready marker is present, oldest first
    async fn ready_markers(&self) -> Result<Vec<EtlDate>>;
}
