// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! # datawh - Revision-driven warehouse ETL
//!
//! datawh incrementally exports lab-tracking data to delimited data files for
//! a warehouse loader. Every committed change in the source store carries a
//! revision number; each run handles exactly the revisions above the last
//! successful run's watermark.
//!
//! ## Overview
//!
//! This library provides:
//! - **Change feeds** that read audited changes for a revision interval
//! - **Entity ETL** jobs that emit current state or delete markers per id
//! - **Cross-entity** and **status** jobs for dependent and history tables
//! - **Workflow configuration** flattening, hashing and date-scoped lookup
//! - **Ancestry** walks over the vessel transfer graph for event facts
//! - **Fixup** reconciliation that refreshes facts after manual corrections
//! - **Run coordination** with a single-flight guard and an atomic watermark
//!
//! ## Architecture
//!
//! - [`cli`] - Operator commands
//! - [`core`] - ETL engine, workflow, ancestry, fixup and run coordination
//! - [`adapters`] - Store seams, in-memory stores and file output
//! - [`domain`] - Identifiers, change records, lab entities and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datawh::adapters::filesystem::FileStateStorage;
//! use datawh::adapters::memory::{MemoryRevisionClock, MemoryStore};
//! use datawh::config::load_config;
//! use datawh::core::etl::{EntityEtl, EtlSettings};
//! use datawh::core::run::RunCoordinator;
//! use datawh::core::state::StateManager;
//! use std::sync::Arc;
//!
//! # async fn example<M: datawh::core::etl::RecordMapper + 'static>(
//! #     store: Arc<MemoryStore<M::Entity>>,
//! #     mapper: M,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("datawh.toml")?;
//! let dir = config.etl.datafile_path();
//!
//! let state = Arc::new(StateManager::new_with_storage(Arc::new(
//!     FileStateStorage::new(dir.clone().unwrap_or_default()),
//! )));
//! let job = EntityEtl::new(
//!     store.entity_type().clone(),
//!     store.clone(),
//!     store,
//!     mapper,
//!     EtlSettings::from_config(&config.etl),
//! );
//! let coordinator = RunCoordinator::new(Arc::new(MemoryRevisionClock::new()), state, dir)
//!     .with_job(Arc::new(job));
//!
//! let outcome = coordinator.run_incremental(chrono::Utc::now()).await?;
//! println!("{:?}", outcome.record_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`domain::Result`]. Errors are split into
//! systemic failures, which abort the run without moving the watermark, and
//! per-entity failures, which skip the entity and let the run continue:
//!
//! ```rust
//! use datawh::domain::EtlError;
//!
//! assert!(EtlError::Io("disk full".to_string()).is_systemic());
//! assert!(!EtlError::Transform("no batch name".to_string()).is_systemic());
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
