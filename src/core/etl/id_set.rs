// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Deduplicated change kinds per entity id

use crate::domain::change::{ChangeKind, ChangeRecord, Entity};
use crate::domain::ids::EntityId;
use std::collections::BTreeMap;

/// Latest change kind per id within one interval
///
/// A delete is final for the interval: once an id is deleted, later adds or
/// modifications of the same id do not bring it back. Ids iterate in
/// ascending order.
///
/// # Examples
///
/// ```
/// use datawh::core::etl::EntityIdSet;
/// use datawh::domain::{ChangeKind, EntityId};
///
/// let id = EntityId::new(5).unwrap();
/// let mut set = EntityIdSet::new();
/// set.insert(id, ChangeKind::Modified);
/// set.insert(id, ChangeKind::Deleted);
/// assert_eq!(set.to_delete(), vec![id]);
/// assert!(set.to_upsert().is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityIdSet {
    kinds: BTreeMap<EntityId, ChangeKind>,
}

impl EntityIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the set from change records in revision order
    pub fn from_changes<E: Entity>(changes: &[ChangeRecord<E>]) -> Self {
        let mut set = Self::new();
        for change in changes {
            set.insert(change.entity_id(), change.kind);
        }
        set
    }

    /// Builds a set where every id is modified
    pub fn upserts(ids: impl IntoIterator<Item = EntityId>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id, ChangeKind::Modified);
        }
        set
    }

    /// Records a change; a delete always wins
    pub fn insert(&mut self, id: EntityId, kind: ChangeKind) {
        match self.kinds.get(&id) {
            Some(ChangeKind::Deleted) => {}
            _ => {
                self.kinds.insert(id, kind);
            }
        }
    }

    /// Ids to tombstone, ascending
    pub fn to_delete(&self) -> Vec<EntityId> {
        self.ids_where(|kind| kind == ChangeKind::Deleted)
    }

    /// Ids to look up and emit, ascending
    pub fn to_upsert(&self) -> Vec<EntityId> {
        self.ids_where(|kind| kind != ChangeKind::Deleted)
    }

    pub fn kind(&self, id: EntityId) -> Option<ChangeKind> {
        self.kinds.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    fn ids_where(&self, predicate: impl Fn(ChangeKind) -> bool) -> Vec<EntityId> {
        self.kinds
            .iter()
            .filter(|&(_, &kind)| predicate(kind))
            .map(|(&id, _)| id)
            .collect()
    }
}
