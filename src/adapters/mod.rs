// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Storage collaborators for datawh.
//!
//! - [`store`] - Traits the backing revision store implements
//! - [`filesystem`] - Data files, watermark and ready markers on local disk
//! - [`memory`] - In-memory store used by tests and embedding applications
//!
//! # Design Pattern
//!
//! The core never talks to a database directly. It reads audited changes and
//! current state through the [`store`] traits, so a backing store only has to
//! implement them, and tests run against [`memory`].

pub mod filesystem;
pub mod memory;
pub mod store;
