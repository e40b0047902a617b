// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Core ETL logic for datawh.
//!
//! # Modules
//!
//! - [`record`] - Record encoding and per-run output streams
//! - [`etl`] - Entity, cross-entity and status ETL jobs
//! - [`workflow`] - Workflow configuration flattening and lookup
//! - [`ancestry`] - Transfer graph walks, event facts and library ancestry
//! - [`fixup`] - Re-extraction after manual data corrections
//! - [`run`] - Single-flight run coordination
//! - [`state`] - Watermark and run-state bookkeeping
//!
//! # Run Workflow
//!
//! 1. **Guard**: Acquire the single-flight guard, or report "busy"
//! 2. **Interval**: Read the watermark and the current revision
//! 3. **Jobs**: Each job turns its changes into records on the run's streams
//! 4. **Commit**: Publish every stream, then persist the watermark and the
//!    configuration hash
//! 5. **Ready**: Write the ready marker when the run produced records
//!
//! # Example
//!
//! ```rust,no_run
//! use datawh::adapters::filesystem::FileStateStorage;
//! use datawh::adapters::memory::MemoryRevisionClock;
//! use datawh::core::run::RunCoordinator;
//! use datawh::core::state::StateManager;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = Arc::new(StateManager::new_with_storage(Arc::new(
//!     FileStateStorage::new("/var/datawh"),
//! )));
//! let coordinator = RunCoordinator::new(
//!     Arc::new(MemoryRevisionClock::new()),
//!     state,
//!     Some("/var/datawh".into()),
//! );
//!
//! let outcome = coordinator.run_incremental(chrono::Utc::now()).await?;
//! println!("Records: {:?}", outcome.record_count());
//! # Ok(())
//! # }
//! ```

pub mod ancestry;
pub mod etl;
pub mod fixup;
pub mod record;
pub mod run;
pub mod state;
pub mod workflow;
