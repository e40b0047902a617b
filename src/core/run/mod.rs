// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Single-flight run coordination

pub mod coordinator;

pub use coordinator::{NotRunReason, RunCoordinator, RunOutcome};
