// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Domain models and types for datawh.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`EntityId`], [`Revision`], [`VesselId`], [`EventId`])
//! - **Change records** ([`ChangeRecord`], [`ChangeKind`], [`RevisionInterval`])
//! - **Lab graph entities** ([`Vessel`], [`LabEvent`], [`SampleInstance`])
//! - **Workflow configuration** ([`WorkflowConfig`])
//! - **Correction subjects** ([`FixupSeed`])
//! - **Error types** ([`EtlError`], [`StoreError`]) and the [`Result`] alias
//!
//! # Type Safety
//!
//! ```rust
//! use datawh::domain::{EntityId, Revision};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let id = EntityId::new(5)?;
//! let revision = Revision::new(12)?;
//!
//! // This won't compile - ids of different kinds do not mix
//! // let wrong: EntityId = revision;
//! # Ok(())
//! # }
//! ```

pub mod change;
pub mod errors;
pub mod fixup;
pub mod ids;
pub mod lab;
pub mod result;
pub mod workflow;

pub use change::{ChangeKind, ChangeRecord, Entity, EtlDate, RevisionInterval};
pub use errors::{EtlError, SkippedEntity, StoreError};
pub use fixup::{FixupNote, FixupSeed, SubjectKind};
pub use ids::{EntityId, EntityType, EventId, Revision, VesselId};
pub use lab::{BatchRef, LabEvent, SampleInstance, Transfer, Vessel, VesselKind};
pub use result::Result;
pub use workflow::{
    ProcessDef, ProcessVersion, StepDef, StepEvent, WorkflowConfig, WorkflowDef, WorkflowVersion,
};
