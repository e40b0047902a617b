// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Filesystem adapters: data files and run state files

pub mod datafile;
pub mod state;

pub use datafile::{DataFile, PARTIAL_SUFFIX};
pub use state::{FileStateStorage, LAST_ETL_FILE, LAST_WF_CONFIG_HASH_FILE, READY_FILE_SUFFIX};
