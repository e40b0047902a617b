// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Domain error types
//!
//! This module defines the error hierarchy for datawh. Errors are split into two
//! families that drive run behavior:
//!
//! - **Recoverable** errors concern one entity's data (a missing related entity,
//!   a malformed optional field). The offending id is logged and skipped.
//! - **Systemic** errors mean the backing store or the output sink is failing.
//!   The run stops at the first one and the watermark is left untouched.

use super::ids::EntityId;
use thiserror::Error;

/// Main datawh error type
#[derive(Debug, Error)]
pub enum EtlError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Storage collaborator errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A single entity could not be transformed
    #[error("Transform error: {0}")]
    Transform(String),

    /// An entity refers to another entity that does not exist
    #[error("Missing related entity: {0}")]
    MissingRelated(String),

    /// The audit history of one corrected subject is unusable
    #[error("Audit trail error: {0}")]
    AuditTrail(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Watermark and run-state file errors
    #[error("State management error: {0}")]
    State(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl EtlError {
    /// Returns true when the error means the run itself cannot continue
    ///
    /// Store failures, I/O failures on the output streams and state-file
    /// failures are systemic. Everything raised while transforming a single
    /// entity is recoverable and only causes that entity to be skipped.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            EtlError::Store(_)
                | EtlError::Io(_)
                | EtlError::State(_)
                | EtlError::Configuration(_)
                | EtlError::Other(_)
        )
    }
}

/// Errors reported by the storage collaborator
///
/// These never expose the backing store's own error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The revision store or entity store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A query against the store failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The store did not answer in time
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// The requested entity type is not known to the store
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),
}

/// Detail about one entity that was skipped during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntity {
    /// Entity id that was skipped
    pub entity_id: EntityId,

    /// Why the entity was skipped
    pub reason: String,
}

impl SkippedEntity {
    /// Creates a new skipped entity detail
    pub fn new(entity_id: EntityId, reason: impl Into<String>) -> Self {
        Self {
            entity_id,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        EtlError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        EtlError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for EtlError {
    fn from(err: toml::de::Error) -> Self {
        EtlError::Configuration(format!("TOML parse error: {err}"))
    }
}
