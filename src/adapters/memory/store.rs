// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! In-memory change feed, entity store and revision clock

use crate::adapters::store::{ChangeFeed, EntityStore, RevisionClock};
use crate::domain::change::{ChangeKind, ChangeRecord, Entity, RevisionInterval};
use crate::domain::errors::StoreError;
use crate::domain::ids::{EntityId, EntityType, Revision};
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Contents<E> {
    current: BTreeMap<EntityId, E>,
    changes: Vec<ChangeRecord<E>>,
    hidden_once: BTreeSet<EntityId>,
}

/// Audit log and current state of one entity type
///
/// Serves both [`ChangeFeed`] and [`EntityStore`]. The store can be switched
/// to an unavailable state to exercise systemic failure handling.
pub struct MemoryStore<E> {
    entity_type: EntityType,
    contents: Mutex<Contents<E>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl<E: Entity> MemoryStore<E> {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            contents: Mutex::new(Contents {
                current: BTreeMap::new(),
                changes: Vec::new(),
                hidden_once: BTreeSet::new(),
            }),
            unavailable: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    /// Replace the current state of an entity without auditing it
    pub fn put(&self, entity: E) {
        self.lock().current.insert(entity.entity_id(), entity);
    }

    /// Remove an entity from current state without auditing it
    pub fn remove(&self, id: EntityId) {
        self.lock().current.remove(&id);
    }

    /// Append a change to the audit log without touching current state
    pub fn record(&self, change: ChangeRecord<E>) {
        self.lock().changes.push(change);
    }

    /// Audit a change and apply it to current state
    pub fn apply(&self, entity: E, kind: ChangeKind, revision: Revision, at: DateTime<Utc>) {
        let mut contents = self.lock();
        let id = entity.entity_id();
        match kind {
            ChangeKind::Deleted => {
                contents.current.remove(&id);
            }
            ChangeKind::Added | ChangeKind::Modified => {
                contents.current.insert(id, entity.clone());
            }
        }
        contents
            .changes
            .push(ChangeRecord::new(entity, kind, revision, at));
    }

    /// Omit `id` from the next batched lookup that asks for it
    pub fn hide_once(&self, id: EntityId) {
        self.lock().hidden_once.insert(id);
    }

    /// Make every call fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of ids requested through lookups so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Contents<E>> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "{} store is unavailable",
                self.entity_type
            ))
            .into());
        }
        Ok(())
    }

    fn check_type(&self, entity_type: &EntityType) -> Result<()> {
        if entity_type != &self.entity_type {
            return Err(StoreError::UnknownEntityType(entity_type.to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl<E: Entity> ChangeFeed<E> for MemoryStore<E> {
    async fn changes_in_revision_range(
        &self,
        entity_type: &EntityType,
        interval: &RevisionInterval,
    ) -> Result<Vec<ChangeRecord<E>>> {
        self.check_available()?;
        self.check_type(entity_type)?;

        let mut changes: Vec<ChangeRecord<E>> = self
            .lock()
            .changes
            .iter()
            .filter(|change| interval.contains(change.revision))
            .cloned()
            .collect();
        changes.sort_by_key(|change| change.revision);
        Ok(changes)
    }

    async fn deleted_ids_in_range(
        &self,
        entity_type: &EntityType,
        start: EntityId,
        end: EntityId,
    ) -> Result<Vec<EntityId>> {
        self.check_available()?;
        self.check_type(entity_type)?;

        let ids: BTreeSet<EntityId> = self
            .lock()
            .changes
            .iter()
            .filter(|change| change.kind == ChangeKind::Deleted)
            .map(|change| change.entity_id())
            .filter(|id| (start..=end).contains(id))
            .collect();
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for MemoryStore<E> {
    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>> {
        self.check_available()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().current.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[EntityId]) -> Result<Vec<E>> {
        self.check_available()?;
        self.lookups.fetch_add(ids.len(), Ordering::SeqCst);

        let mut contents = self.lock();
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if contents.hidden_once.remove(id) {
                continue;
            }
            if let Some(entity) = contents.current.get(id) {
                found.push(entity.clone());
            }
        }
        Ok(found)
    }

    async fn ids_in_range(&self, start: EntityId, end: EntityId) -> Result<Vec<EntityId>> {
        self.check_available()?;
        Ok(self
            .lock()
            .current
            .range(start..=end)
            .map(|(&id, _)| id)
            .collect())
    }
}

/// Revision clock backed by a list of committed revisions
#[derive(Default)]
pub struct MemoryRevisionClock {
    commits: Mutex<Vec<(DateTime<Utc>, Revision)>>,
    unavailable: AtomicBool,
}

impl MemoryRevisionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `revision` was committed at `at`
    pub fn commit(&self, revision: Revision, at: DateTime<Utc>) {
        self.commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((at, revision));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl RevisionClock for MemoryRevisionClock {
    async fn current_revision_number(&self, as_of: DateTime<Utc>) -> Result<Revision> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("revision store is unavailable".to_string()).into());
        }

        let newest = self
            .commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(at, _)| *at <= as_of)
            .map(|&(_, revision)| revision)
            .max();

        match newest {
            Some(revision) => Ok(revision),
            None => Revision::new(0).map_err(|e| StoreError::QueryFailed(e).into()),
        }
    }
}
