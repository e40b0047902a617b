// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! File-backed run state
//!
//! Layout inside the data file directory:
//!
//! - `last_etl_run`: the watermark revision, a single integer
//! - `last_wf_config_hash`: aggregate hash of the last exported workflow configuration
//! - `<etl_date>_is_ready`: one empty-ish marker per completed run

use crate::adapters::store::StateStorage;
use crate::core::state::watermark::Watermark;
use crate::domain::change::EtlDate;
use crate::domain::errors::EtlError;
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Watermark file name
pub const LAST_ETL_FILE: &str = "last_etl_run";

/// Workflow configuration hash file name
pub const LAST_WF_CONFIG_HASH_FILE: &str = "last_wf_config_hash";

/// Suffix of ready marker files
pub const READY_FILE_SUFFIX: &str = "_is_ready";

/// State storage in plain files next to the data files
#[derive(Debug, Clone)]
pub struct FileStateStorage {
    dir: PathBuf,
}

impl FileStateStorage {
    /// Create storage rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the state files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_optional(&self, name: &str) -> Result<Option<String>> {
        let path = self.dir.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "State file not present");
                Ok(None)
            }
            Err(e) => Err(EtlError::State(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Write through a temporary file so readers never see a torn value
    async fn write_atomic(&self, name: &str, content: &str) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        tokio::fs::write(&tmp, content).await.map_err(|e| {
            EtlError::State(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            EtlError::State(format!("Failed to replace {}: {e}", path.display()))
        })?;
        Ok(())
    }
}

#[async_trait]
impl StateStorage for FileStateStorage {
    async fn load_watermark(&self) -> Result<Option<Watermark>> {
        let Some(content) = self.read_optional(LAST_ETL_FILE).await? else {
            return Ok(None);
        };
        let mut watermark = Watermark::parse(&content)?;

        if let Ok(metadata) = tokio::fs::metadata(self.dir.join(LAST_ETL_FILE)).await {
            if let Ok(modified) = metadata.modified() {
                watermark = watermark.with_recorded_at(DateTime::<Utc>::from(modified));
            }
        }
        Ok(Some(watermark))
    }

    async fn save_watermark(&self, watermark: &Watermark) -> Result<()> {
        self.write_atomic(LAST_ETL_FILE, &watermark.render()).await
    }

    async fn load_config_hash(&self) -> Result<Option<String>> {
        Ok(self
            .read_optional(LAST_WF_CONFIG_HASH_FILE)
            .await?
            .map(|content| content.trim().to_string())
            .filter(|hash| !hash.is_empty()))
    }

    async fn save_config_hash(&self, hash: &str) -> Result<()> {
        self.write_atomic(LAST_WF_CONFIG_HASH_FILE, hash).await
    }

    async fn mark_ready(&self, etl_date: &EtlDate) -> Result<()> {
        self.write_atomic(&format!("{etl_date}{READY_FILE_SUFFIX}"), " ")
            .await
    }

    async fn ready_markers(&self) -> Result<Vec<EtlDate>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            EtlError::State(format!("Failed to list {}: {e}", self.dir.display()))
        })?;

        let mut markers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(prefix) = name.strip_suffix(READY_FILE_SUFFIX) {
                match EtlDate::from_str(prefix) {
                    Ok(date) => markers.push(date),
                    Err(e) => {
                        tracing::warn!(file = %name, error = %e, "Ignoring malformed ready marker")
                    }
                }
            }
        }
        markers.sort();
        Ok(markers)
    }
}
