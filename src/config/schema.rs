// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Configuration schema types
//!
//! This module defines the configuration structure for datawh. Every section
//! has defaults, so an empty file is a valid configuration that simply has no
//! data file directory and therefore never runs.

use crate::core::etl::entity::{DEFAULT_LOOKUP_BATCH_SIZE, DEFAULT_LOOKUP_MISS_RETRIES};
use crate::core::workflow::DEFAULT_LOOKUP_CACHE_SIZE;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Main datawh configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatawhConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Run and lookup settings
    #[serde(default)]
    pub etl: EtlConfig,

    /// Workflow configuration lookup settings
    #[serde(default)]
    pub workflow: WorkflowSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DatawhConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.etl.validate()?;
        self.workflow.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Directory receiving data files, the watermark and ready markers
    ///
    /// Runs are refused while this is unset.
    #[serde(default)]
    pub datafile_dir: Option<String>,

    /// Ids per batched current-state lookup
    #[serde(default = "default_lookup_batch_size")]
    pub lookup_batch_size: usize,

    /// Individual retries of an id a batched lookup did not return
    #[serde(default = "default_lookup_miss_retries")]
    pub lookup_miss_retries: u32,
}

impl EtlConfig {
    /// Data file directory as a path
    pub fn datafile_path(&self) -> Option<PathBuf> {
        self.datafile_dir.as_ref().map(PathBuf::from)
    }

    fn validate(&self) -> Result<(), String> {
        if self
            .datafile_dir
            .as_deref()
            .is_some_and(|dir| dir.trim().is_empty())
        {
            return Err("etl.datafile_dir must not be empty when set".to_string());
        }

        if self.lookup_batch_size == 0 || self.lookup_batch_size > 10_000 {
            return Err(format!(
                "etl.lookup_batch_size must be between 1 and 10000, got {}",
                self.lookup_batch_size
            ));
        }

        if self.lookup_miss_retries > 10 {
            return Err(format!(
                "etl.lookup_miss_retries must be at most 10, got {}",
                self.lookup_miss_retries
            ));
        }

        Ok(())
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            datafile_dir: None,
            lookup_batch_size: default_lookup_batch_size(),
            lookup_miss_retries: default_lookup_miss_retries(),
        }
    }
}

/// Workflow configuration lookup settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Memoized lookups kept per configuration version
    #[serde(default = "default_lookup_cache_size")]
    pub lookup_cache_size: usize,
}

impl WorkflowSettings {
    /// Cache size, falling back to the default when zero
    pub fn cache_size(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.lookup_cache_size)
            .or_else(|| NonZeroUsize::new(DEFAULT_LOOKUP_CACHE_SIZE))
            .unwrap_or(NonZeroUsize::MIN)
    }

    fn validate(&self) -> Result<(), String> {
        if self.lookup_cache_size == 0 {
            return Err("workflow.lookup_cache_size must be > 0".to_string());
        }
        Ok(())
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            lookup_cache_size: default_lookup_cache_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    /// Maximum log file size in MB
    #[serde(default = "default_local_max_size_mb")]
    pub local_max_size_mb: usize,
}

impl LoggingConfig {
    /// Console-only logging, used before the configuration is loaded
    pub fn console_only() -> Self {
        Self {
            local_enabled: false,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_max_size_mb == 0 {
            return Err("logging.local_max_size_mb must be > 0".to_string());
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path must be set when local logging is enabled".to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
            local_max_size_mb: default_local_max_size_mb(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_lookup_batch_size() -> usize {
    DEFAULT_LOOKUP_BATCH_SIZE
}

fn default_lookup_miss_retries() -> u32 {
    DEFAULT_LOOKUP_MISS_RETRIES
}

fn default_lookup_cache_size() -> usize {
    DEFAULT_LOOKUP_CACHE_SIZE
}

fn default_local_path() -> String {
    "/var/log/datawh".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_local_max_size_mb() -> usize {
    100
}
