// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Storage abstraction layer
//!
//! The versioned datastore is an external collaborator. This module defines the
//! trait seams through which datawh reads it.

pub mod traits;

pub use traits::{
    AssociationQuery, AuditStore, ChangeFeed, EntityStore, GraphStore, RevisionClock,
    StateStorage, SubjectChange, WorkflowConfigSource,
};
