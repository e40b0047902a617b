// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the datawh configuration file.

use crate::config::load_config;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as part of loading
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        match &config.etl.datafile_dir {
            Some(dir) => println!("  Data File Directory: {dir}"),
            None => println!("  Data File Directory: (not set, runs will be refused)"),
        }
        println!("  Lookup Batch Size: {}", config.etl.lookup_batch_size);
        println!("  Lookup Miss Retries: {}", config.etl.lookup_miss_retries);
        println!("  Workflow Cache Size: {}", config.workflow.lookup_cache_size);
        if config.logging.local_enabled {
            println!(
                "  File Logging: {} ({})",
                config.logging.local_path, config.logging.local_rotation
            );
        } else {
            println!("  File Logging: disabled");
        }
        println!();
        Ok(0)
    }
}
