// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Workflow configuration: flattening, hashing and date-scoped lookup

pub mod etl;
pub mod flatten;
pub mod hash;
pub mod provider;
pub mod resolver;

pub use etl::WorkflowConfigEtl;
pub use flatten::{flatten, WorkflowConfigDenorm, WORKFLOW_CONFIG_TABLE};
pub use hash::{aggregate_hash, stable_hash};
pub use provider::{config_hash, WorkflowConfigProvider};
pub use resolver::{BucketedStepContext, WorkflowConfigResolver, DEFAULT_LOOKUP_CACHE_SIZE};
