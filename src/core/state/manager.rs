// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! State manager for run bookkeeping
//!
//! This module provides the StateManager for loading the watermark and
//! committing the results of a successful run.

use crate::adapters::store::StateStorage;
use crate::core::state::watermark::Watermark;
use crate::domain::change::EtlDate;
use crate::domain::ids::Revision;
use crate::domain::Result;
use std::sync::Arc;

/// What a successful run needs to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommit {
    /// New watermark, or `None` for runs that must not move it
    pub watermark: Option<Revision>,
    /// New workflow configuration hash, if the configuration was exported
    pub config_hash: Option<String>,
    /// Run timestamp for the ready marker
    pub etl_date: EtlDate,
    /// Records written by the run; no ready marker when zero
    pub record_count: usize,
}

/// State manager for run bookkeeping
pub struct StateManager {
    storage: Arc<dyn StateStorage + Send + Sync>,
}

impl StateManager {
    /// Create a new StateManager with a state storage backend
    pub fn new_with_storage(storage: Arc<dyn StateStorage + Send + Sync>) -> Self {
        Self { storage }
    }

    /// Load the watermark of the last successful run
    pub async fn load_watermark(&self) -> Result<Option<Watermark>> {
        self.storage.load_watermark().await
    }

    /// Load the last exported workflow configuration hash
    pub async fn load_config_hash(&self) -> Result<Option<String>> {
        self.storage.load_config_hash().await
    }

    /// Runs whose ready marker is present
    pub async fn ready_markers(&self) -> Result<Vec<EtlDate>> {
        self.storage.ready_markers().await
    }

    /// Seed the watermark before the first incremental run
    pub async fn initialize(&self, revision: Revision) -> Result<()> {
        tracing::info!(revision = %revision, "Initializing watermark");
        self.storage.save_watermark(&Watermark::new(revision)).await
    }

    /// Persist everything a successful run produced
    ///
    /// The watermark is written before the configuration hash: a failure in
    /// between re-exports identical configuration rows on the next run instead
    /// of losing them.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the writes fails.
    pub async fn commit_run(&self, commit: &RunCommit) -> Result<()> {
        if let Some(revision) = commit.watermark {
            self.storage.save_watermark(&Watermark::new(revision)).await?;
        }

        if let Some(hash) = &commit.config_hash {
            self.storage.save_config_hash(hash).await?;
        }

        if commit.record_count > 0 {
            self.storage.mark_ready(&commit.etl_date).await?;
        }

        tracing::info!(
            etl_date = %commit.etl_date,
            watermark = ?commit.watermark.map(|r| r.value()),
            config_hash_updated = commit.config_hash.is_some(),
            record_count = commit.record_count,
            "Committed run state"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::filesystem::FileStateStorage;
    use std::str::FromStr;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> StateManager {
        StateManager::new_with_storage(Arc::new(FileStateStorage::new(dir.path())))
    }

    #[tokio::test]
    async fn test_commit_run_writes_all_state() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let etl_date = EtlDate::from_str("20240102030405").unwrap();

        manager
            .commit_run(&RunCommit {
                watermark: Some(Revision::new(12).unwrap()),
                config_hash: Some("abc".to_string()),
                etl_date,
                record_count: 3,
            })
            .await
            .unwrap();

        let watermark = manager.load_watermark().await.unwrap().unwrap();
        assert_eq!(watermark.revision.value(), 12);
        assert_eq!(manager.load_config_hash().await.unwrap().as_deref(), Some("abc"));
        assert_eq!(manager.ready_markers().await.unwrap(), vec![etl_date]);
    }

    #[tokio::test]
    async fn test_commit_run_without_records_or_watermark() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        manager
            .commit_run(&RunCommit {
                watermark: None,
                config_hash: None,
                etl_date: EtlDate::now(),
                record_count: 0,
            })
            .await
            .unwrap();

        assert!(manager.load_watermark().await.unwrap().is_none());
        assert!(manager.ready_markers().await.unwrap().is_empty());
    }
}
