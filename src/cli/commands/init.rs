// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "datawh.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing datawh configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2);
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your settings", self.output);
                println!("  2. Set etl.datafile_dir or export DATAWH_ETL_DATAFILE_DIR");
                println!("  3. Validate configuration: datawh validate-config");
                println!("  4. Check run state: datawh status");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(5)
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# datawh configuration file

[application]
log_level = "info"

[etl]
datafile_dir = "/data/datawh"
lookup_batch_size = 500
lookup_miss_retries = 1

[workflow]
lookup_cache_size = 4096

[logging]
local_enabled = true
local_path = "/var/log/datawh"
local_rotation = "daily"
local_max_size_mb = 100
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# datawh configuration file
#
# Every setting has a default. Values may reference environment variables
# with ${VAR_NAME}, and any key can be overridden with DATAWH_<SECTION>_<KEY>.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# ============================================================================
# Run Settings
# ============================================================================
[etl]
# Directory receiving data files, the watermark file, the workflow
# configuration hash and ready markers. Runs are refused while unset.
datafile_dir = "/data/datawh"

# Ids per batched current-state lookup (1-10000)
lookup_batch_size = 500

# Individual retries of ids a batched lookup did not return (0-10)
lookup_miss_retries = 1

# ============================================================================
# Workflow Configuration Lookup
# ============================================================================
[workflow]
# Memoized (process, step, event type, date) lookups kept per
# configuration version
lookup_cache_size = 4096

# ============================================================================
# Logging Configuration
# ============================================================================
[logging]
# Enable local file logging
local_enabled = true

# Local log directory
local_path = "/var/log/datawh"

# Log rotation (daily, hourly or never)
local_rotation = "daily"

# Maximum log file size in MB
local_max_size_mb = 100
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::TempDir;

    #[test]
    fn test_generated_configs_are_valid() {
        for content in [
            InitArgs::generate_minimal_config(),
            InitArgs::generate_config_with_examples(),
        ] {
            let config = parse_config(&content).unwrap();
            assert_eq!(config.etl.datafile_dir.as_deref(), Some("/data/datawh"));
        }
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("datawh.toml");
        fs::write(&output, "# existing").unwrap();

        let args = InitArgs {
            output: output.to_string_lossy().into_owned(),
            with_examples: false,
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 2);
        assert_eq!(fs::read_to_string(&output).unwrap(), "# existing");

        let forced = InitArgs { force: true, ..args };
        assert_eq!(forced.execute().await.unwrap(), 0);
        assert!(fs::read_to_string(&output).unwrap().contains("[etl]"));
    }
}
