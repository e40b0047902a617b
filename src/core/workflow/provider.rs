// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Holds the resolver for the current workflow configuration

use crate::adapters::store::WorkflowConfigSource;
use crate::core::workflow::flatten::flatten;
use crate::core::workflow::hash::aggregate_hash;
use crate::core::workflow::resolver::WorkflowConfigResolver;
use crate::domain::workflow::WorkflowConfig;
use crate::domain::Result;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Rebuilds the resolver only when the configuration changed
///
/// A rebuild starts a fresh lookup cache. As long as the aggregate hash of the
/// loaded configuration stays the same, the existing resolver and its cache
/// are kept.
pub struct WorkflowConfigProvider {
    source: Arc<dyn WorkflowConfigSource>,
    cache_size: NonZeroUsize,
    current: RwLock<Option<Arc<WorkflowConfigResolver>>>,
}

impl WorkflowConfigProvider {
    pub fn new(source: Arc<dyn WorkflowConfigSource>, cache_size: NonZeroUsize) -> Self {
        Self {
            source,
            cache_size,
            current: RwLock::new(None),
        }
    }

    /// Load the configuration and swap in a new resolver if its hash changed
    pub async fn refresh(&self) -> Result<Arc<WorkflowConfigResolver>> {
        let config = self.source.load().await?;
        let hash = config_hash(&config);

        let mut current = self.current.write().await;
        if let Some(resolver) = current.as_ref() {
            if resolver.hash() == hash {
                tracing::debug!(hash = %hash, "Workflow configuration unchanged");
                return Ok(Arc::clone(resolver));
            }
        }

        let resolver = Arc::new(WorkflowConfigResolver::new(config, self.cache_size));
        tracing::info!(
            hash = %resolver.hash(),
            rows = resolver.rows().len(),
            "Workflow configuration loaded"
        );
        *current = Some(Arc::clone(&resolver));
        Ok(resolver)
    }

    /// The resolver in use, loading it on first access
    pub async fn current(&self) -> Result<Arc<WorkflowConfigResolver>> {
        if let Some(resolver) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(resolver));
        }
        self.refresh().await
    }
}

/// Aggregate hash of a configuration without building a resolver
pub fn config_hash(config: &WorkflowConfig) -> String {
    let rows = flatten(&config.clone().normalized());
    aggregate_hash(rows.iter().map(|row| row.id))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::memory::MemoryWorkflowSource;
    use crate::domain::workflow::{
        ProcessDef, ProcessVersion, StepDef, StepEvent, WorkflowDef, WorkflowVersion,
    };
    use chrono::{TimeZone, Utc};

    pub(crate) fn receipt_config(process_version: &str) -> WorkflowConfig {
        WorkflowConfig {
            workflows: vec![WorkflowDef {
                name: "Intake Only".to_string(),
                versions: vec![WorkflowVersion {
                    version: "1".to_string(),
                    effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
                    processes: vec!["Receipt".to_string()],
                }],
            }],
            processes: vec![ProcessDef {
                name: "Receipt".to_string(),
                versions: vec![ProcessVersion {
                    version: process_version.to_string(),
                    effective_date: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
                    steps: vec![StepDef {
                        name: "Receive".to_string(),
                        ancestry_etl: false,
                        events: vec![StepEvent {
                            event_type: "SAMPLE_RECEIPT".to_string(),
                            needs_order_context: false,
                            needs_batch_context: false,
                        }],
                    }],
                }],
            }],
        }
    }

    fn provider(source: Arc<MemoryWorkflowSource>) -> WorkflowConfigProvider {
        WorkflowConfigProvider::new(source, NonZeroUsize::new(8).unwrap())
    }

    #[tokio::test]
    async fn test_unchanged_configuration_keeps_resolver() {
        let source = Arc::new(MemoryWorkflowSource::new(receipt_config("1")));
        let provider = provider(source.clone());

        let first = provider.refresh().await.unwrap();
        first.lookup("SAMPLE_RECEIPT", None, Utc::now());
        let second = provider.refresh().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.cached_lookups(), 1);
        assert_eq!(source.load_count(), 2);
    }

    #[tokio::test]
    async fn test_changed_configuration_rebuilds() {
        let source = Arc::new(MemoryWorkflowSource::new(receipt_config("1")));
        let provider = provider(source.clone());

        let first = provider.refresh().await.unwrap();
        source.replace(receipt_config("2"));
        let second = provider.refresh().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.hash(), second.hash());
        assert_eq!(second.cached_lookups(), 0);
    }

    #[tokio::test]
    async fn test_current_loads_once() {
        let source = Arc::new(MemoryWorkflowSource::new(receipt_config("1")));
        let provider = provider(source.clone());

        provider.current().await.unwrap();
        provider.current().await.unwrap();
        assert_eq!(source.load_count(), 1);
    }

    #[test]
    fn test_config_hash_matches_resolver() {
        let config = receipt_config("1");
        let resolver = WorkflowConfigResolver::new(config.clone(), NonZeroUsize::new(1).unwrap());
        assert_eq!(config_hash(&config), resolver.hash());
    }
}
