// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Status command implementation
//!
//! This module implements the `status` command for displaying the
//! watermark, workflow configuration hash, ready markers and any data
//! files left behind by an interrupted run.

use crate::adapters::filesystem::{FileStateStorage, PARTIAL_SUFFIX};
use crate::config::load_config;
use crate::core::state::StateManager;
use clap::Args;
use std::path::Path;
use std::sync::Arc;

/// Arguments for the status command
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Number of most recent ready markers to show
    #[arg(long, default_value_t = 10)]
    pub markers: usize,
}

impl StatusArgs {
    /// Execute the status command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Checking run status");

        println!("📊 Run Status");
        println!();

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {}", e);
                return Ok(2);
            }
        };

        let Some(dir) = config.etl.datafile_path() else {
            println!("❌ etl.datafile_dir is not configured");
            return Ok(2);
        };

        if !dir.is_dir() {
            println!("❌ Data file directory does not exist: {}", dir.display());
            return Ok(5);
        }

        let state = StateManager::new_with_storage(Arc::new(FileStateStorage::new(&dir)));

        let watermark = match state.load_watermark().await {
            Ok(w) => w,
            Err(e) => {
                println!("❌ Failed to load watermark");
                println!("   Error: {}", e);
                return Ok(5);
            }
        };
        let config_hash = state.load_config_hash().await?;
        let markers = state.ready_markers().await?;
        let partials = partial_files(&dir).await?;

        println!("Data file directory: {}", dir.display());
        match watermark {
            Some(w) => {
                let recorded = w
                    .recorded_at
                    .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                println!("Watermark: revision {} (written {})", w.revision, recorded);
            }
            None => {
                println!("Watermark: not initialized");
                println!("Incremental runs are refused until a watermark is seeded.");
            }
        }
        println!(
            "Workflow config hash: {}",
            config_hash.as_deref().unwrap_or("none")
        );
        println!();

        if markers.is_empty() {
            println!("No completed runs found.");
        } else {
            println!(
                "Ready markers ({} total, showing up to {}):",
                markers.len(),
                self.markers
            );
            for marker in markers.iter().rev().take(self.markers) {
                println!("  ✅ {}", marker);
            }
        }

        if !partials.is_empty() {
            println!();
            println!("⚠️  Pending data files from an interrupted run:");
            for name in &partials {
                println!("  {}", name);
            }
        }

        println!();
        Ok(0)
    }
}

/// Names of data files still carrying the partial suffix, sorted
async fn partial_files(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(PARTIAL_SUFFIX) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::RunCommit;
    use crate::domain::{EtlDate, Revision};
    use std::io::Write;
    use std::str::FromStr;
    use tempfile::{NamedTempFile, TempDir};

    fn config_for(dir: &Path) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[etl]\ndatafile_dir = \"{}\"\n\n[logging]\nlocal_enabled = false",
            dir.display()
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn test_partial_files_listed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("20240101000000_lab_batch.dat.partial"), "x").unwrap();
        std::fs::write(dir.path().join("20240101000000_lab_batch.dat"), "x").unwrap();

        let partials = partial_files(dir.path()).await.unwrap();
        assert_eq!(partials, vec!["20240101000000_lab_batch.dat.partial"]);
    }

    #[tokio::test]
    async fn test_status_reads_committed_state() {
        let dir = TempDir::new().unwrap();
        let state = StateManager::new_with_storage(Arc::new(FileStateStorage::new(dir.path())));
        state
            .commit_run(&RunCommit {
                watermark: Some(Revision::new(7).unwrap()),
                config_hash: Some("abc".to_string()),
                etl_date: EtlDate::from_str("20240101000000").unwrap(),
                record_count: 1,
            })
            .await
            .unwrap();

        let config = config_for(dir.path());
        let args = StatusArgs { markers: 10 };
        let code = args
            .execute(&config.path().to_string_lossy())
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_status_exit_codes() {
        let args = StatusArgs { markers: 10 };

        let mut unset = NamedTempFile::new().unwrap();
        writeln!(unset, "[logging]\nlocal_enabled = false").unwrap();
        assert_eq!(args.execute(&unset.path().to_string_lossy()).await.unwrap(), 2);

        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let config = config_for(&missing);
        assert_eq!(args.execute(&config.path().to_string_lossy()).await.unwrap(), 5);
    }
}
