// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! CLI command implementations

pub mod init;
pub mod status;
pub mod validate;
