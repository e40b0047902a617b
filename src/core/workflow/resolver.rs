// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Date-scoped lookup over the flattened workflow configuration
//!
//! One resolver is built per configuration version. Lookup results, misses
//! included, are memoized in a bounded LRU cache owned by the resolver, so a
//! configuration change starts from an empty cache.

use crate::core::workflow::flatten::{flatten, WorkflowConfigDenorm};
use crate::core::workflow::hash::aggregate_hash;
use crate::domain::workflow::{StepDef, WorkflowConfig};
use chrono::{DateTime, Utc};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

/// Default number of memoized lookups
pub const DEFAULT_LOOKUP_CACHE_SIZE: usize = 4096;

type LookupKey = (String, Option<String>, DateTime<Utc>);

/// Steps of a workflow up to and including the one holding an event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketedStepContext {
    steps: Vec<StepDef>,
}

impl BucketedStepContext {
    pub fn new(steps: Vec<StepDef>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[StepDef] {
        &self.steps
    }

    /// Step holding the event, if the event was found
    pub fn current_step(&self) -> Option<&StepDef> {
        self.steps.last()
    }

    /// True when the event's own step is flagged for ancestry
    pub fn applies(&self) -> bool {
        self.current_step().map(|s| s.ancestry_etl).unwrap_or(false)
    }

    /// Event types of the nearest earlier step flagged for ancestry
    pub fn nearest_ancestor_event_types(&self) -> Vec<String> {
        let Some((_, earlier)) = self.steps.split_last() else {
            return Vec::new();
        };
        earlier
            .iter()
            .rev()
            .find(|step| step.ancestry_etl)
            .map(|step| step.events.iter().map(|e| e.event_type.clone()).collect())
            .unwrap_or_default()
    }
}

/// Flattened configuration with memoized lookups
#[derive(Debug)]
pub struct WorkflowConfigResolver {
    config: WorkflowConfig,
    rows: Vec<WorkflowConfigDenorm>,
    by_event: HashMap<String, Vec<usize>>,
    hash: String,
    cache: Mutex<LruCache<LookupKey, Option<usize>>>,
}

impl WorkflowConfigResolver {
    /// Flattens `config` and indexes the rows by event name
    pub fn new(config: WorkflowConfig, cache_size: NonZeroUsize) -> Self {
        let config = config.normalized();
        let rows = flatten(&config);
        let hash = aggregate_hash(rows.iter().map(|r| r.id));

        let mut by_event: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, row) in rows.iter().enumerate() {
            by_event.entry(row.event_name.clone()).or_default().push(index);
        }
        for indexes in by_event.values_mut() {
            indexes.sort_by(|&a, &b| rows[b].effective_date.cmp(&rows[a].effective_date));
        }

        tracing::debug!(rows = rows.len(), hash = %hash, "Built workflow configuration resolver");

        Self {
            config,
            rows,
            by_event,
            hash,
            cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Aggregate hash of all row ids
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Flattened rows in walk order
    pub fn rows(&self) -> &[WorkflowConfigDenorm] {
        &self.rows
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Row for `event_name` effective at `event_date`
    ///
    /// Among rows of the event, picks the latest one of `workflow_name` that is
    /// effective on or before `event_date`. When nothing matches and the event
    /// has exactly one row, that row is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use datawh::core::workflow::WorkflowConfigResolver;
    /// use datawh::domain::WorkflowConfig;
    /// use std::num::NonZeroUsize;
    ///
    /// let resolver = WorkflowConfigResolver::new(
    ///     WorkflowConfig::default(),
    ///     NonZeroUsize::new(16).unwrap(),
    /// );
    /// assert!(resolver.lookup("SAMPLE_RECEIPT", None, chrono::Utc::now()).is_none());
    /// ```
    pub fn lookup(
        &self,
        event_name: &str,
        workflow_name: Option<&str>,
        event_date: DateTime<Utc>,
    ) -> Option<&WorkflowConfigDenorm> {
        let key: LookupKey = (
            event_name.to_string(),
            workflow_name.map(str::to_string),
            event_date,
        );

        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied();
        let index = match cached {
            Some(index) => index,
            None => {
                let index = self.find(event_name, workflow_name, event_date);
                self.cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .put(key, index);
                index
            }
        };
        index.map(|i| &self.rows[i])
    }

    fn find(
        &self,
        event_name: &str,
        workflow_name: Option<&str>,
        event_date: DateTime<Utc>,
    ) -> Option<usize> {
        let candidates = self.by_event.get(event_name)?;

        let matched = workflow_name.and_then(|workflow| {
            candidates.iter().copied().find(|&i| {
                let row = &self.rows[i];
                row.workflow_name == workflow && row.effective_date <= event_date
            })
        });

        match (matched, candidates.as_slice()) {
            (Some(index), _) => Some(index),
            (None, [only]) => Some(*only),
            (None, _) => None,
        }
    }

    /// True when some step expecting `event_name` needs order or batch context
    pub fn requires_context(&self, event_name: &str) -> bool {
        self.by_event.get(event_name).is_some_and(|indexes| {
            indexes.iter().any(|&i| {
                let row = &self.rows[i];
                row.needs_order_context || row.needs_batch_context
            })
        })
    }

    /// Number of memoized lookups
    pub fn cached_lookups(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Steps leading to `event_name` in the workflow version effective at `date`
    ///
    /// Processes of the workflow version are walked in order, each at its
    /// version effective at `date`. The context ends at the first step holding
    /// the event and is empty when the event is not part of the workflow.
    pub fn step_context(
        &self,
        workflow_name: &str,
        event_name: &str,
        date: DateTime<Utc>,
    ) -> BucketedStepContext {
        let Some(workflow_version) = self
            .config
            .workflow(workflow_name)
            .and_then(|w| w.effective_version(date))
        else {
            return BucketedStepContext::default();
        };

        let mut steps = Vec::new();
        for process_name in &workflow_version.processes {
            let Some(process_version) = self
                .config
                .process(process_name)
                .and_then(|p| p.effective_version(date))
            else {
                continue;
            };
            for step in &process_version.steps {
                steps.push(step.clone());
                if step.has_event(event_name) {
                    return BucketedStepContext::new(steps);
                }
            }
        }
        BucketedStepContext::default()
    }
}
