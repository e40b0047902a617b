// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Reconciliation of manual data corrections

pub mod reconciler;

pub use reconciler::{DerivedFactMapper, FixupReconciler, FIXUP_JOB, FIXUP_NOTE_TYPE};
