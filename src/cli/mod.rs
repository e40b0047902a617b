// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! CLI interface and argument parsing
//!
//! This module provides the operator command-line interface using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// datawh - revision-driven warehouse ETL
#[derive(Parser, Debug)]
#[command(name = "datawh")]
#[command(version, about, long_about = None)]
#[command(author = "Datawh Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "datawh.toml", env = "DATAWH_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "DATAWH_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show the watermark, ready markers and pending data files
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
