// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! In-memory implementations of the storage traits
//!
//! Used by the test suite and by embedders that already hold snapshots of the
//! source data in memory.

pub mod audit;
pub mod store;

pub use audit::{MemoryAuditStore, MemoryGraphStore, MemoryWorkflowSource};
pub use store::{MemoryRevisionClock, MemoryStore};
