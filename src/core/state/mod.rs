// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! State management and watermark tracking

pub mod manager;
pub mod watermark;

pub use manager::{RunCommit, StateManager};
pub use watermark::Watermark;
