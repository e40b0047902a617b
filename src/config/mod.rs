// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Configuration management for datawh.
//!
//! # Overview
//!
//! datawh uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `DATAWH_<SECTION>_<KEY>` environment overrides
//! - Default values for every setting
//! - Per-section validation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use datawh::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("datawh.toml")?;
//!
//! if let Some(dir) = &config.etl.datafile_dir {
//!     println!("Data files go to {}", dir);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level
//! - [`EtlConfig`] - Data file directory and current-state lookup tuning
//! - [`WorkflowSettings`] - Workflow lookup cache size
//! - [`LoggingConfig`] - Local file logging
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [etl]
//! datafile_dir = "${DATAWH_DATA_DIR}"
//! lookup_batch_size = 500
//! lookup_miss_retries = 1
//!
//! [workflow]
//! lookup_cache_size = 4096
//!
//! [logging]
//! local_enabled = true
//! local_path = "/var/log/datawh"
//! local_rotation = "daily"
//! ```

pub mod loader;
pub mod schema;

pub use loader::{load_config, parse_config};
pub use schema::{ApplicationConfig, DatawhConfig, EtlConfig, LoggingConfig, WorkflowSettings};
