// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Revision-interval ETL engine
//!
//! This module provides the generic machinery every ETL job is built from:
//!
//! - [`EntityIdSet`] - deduplicated change kinds per id, deletes winning
//! - [`EntityEtl`] - current-state emission for one entity type
//! - [`CrossEntityEtl`] - emission driven by changes to another entity type
//! - [`StatusEtl`] - current state plus a status history stream
//! - [`RunSummary`] - aggregated outcome of a run

pub mod cross;
pub mod entity;
pub mod id_set;
pub mod job;
pub mod status;
pub mod summary;

pub use cross::{AuditColumnTranslator, CrossEntityEtl, GraphTranslator, IdTranslator};
pub use entity::{CurrentStateEmitter, EntityEtl, EntityPreview, EtlSettings, RecordMapper};
pub use id_set::EntityIdSet;
pub use job::{EtlJob, JobOutcome};
pub use status::{StatusEtl, StatusMapper};
pub use summary::{RunError, RunErrorType, RunSummary};
