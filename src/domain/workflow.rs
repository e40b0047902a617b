// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Hierarchical, date-versioned workflow configuration
//!
//! A workflow has versions; each workflow version names the processes it runs;
//! each process has versions; each process version is an ordered list of steps;
//! each step lists the event types that can occur in it.
//!
//! Version lists are sorted once, newest first, by [`WorkflowConfig::normalized`].
//! Everything downstream relies on that order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root of the workflow configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow definitions
    #[serde(default)]
    pub workflows: Vec<WorkflowDef>,
    /// Process definitions referenced by workflow versions
    #[serde(default)]
    pub processes: Vec<ProcessDef>,
}

impl WorkflowConfig {
    /// Returns the configuration with every version list sorted newest first
    pub fn normalized(mut self) -> Self {
        for workflow in &mut self.workflows {
            workflow
                .versions
                .sort_by(|a, b| b.effective_date.cmp(&a.effective_date));
        }
        for process in &mut self.processes {
            process
                .versions
                .sort_by(|a, b| b.effective_date.cmp(&a.effective_date));
        }
        self
    }

    /// Finds a process definition by name
    pub fn process(&self, name: &str) -> Option<&ProcessDef> {
        self.processes.iter().find(|p| p.name == name)
    }

    /// Finds a workflow definition by name
    pub fn workflow(&self, name: &str) -> Option<&WorkflowDef> {
        self.workflows.iter().find(|w| w.name == name)
    }
}

/// A named workflow with its versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<WorkflowVersion>,
}

impl WorkflowDef {
    /// Version in effect at `date`: the newest one that started on or before it
    pub fn effective_version(&self, date: DateTime<Utc>) -> Option<&WorkflowVersion> {
        self.versions
            .iter()
            .filter(|v| v.effective_date <= date)
            .max_by_key(|v| v.effective_date)
    }
}

/// One version of a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowVersion {
    pub version: String,
    pub effective_date: DateTime<Utc>,
    /// Process names, in execution order
    #[serde(default)]
    pub processes: Vec<String>,
}

/// A named process with its versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDef {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<ProcessVersion>,
}

impl ProcessDef {
    /// Version in effect at `date`
    pub fn effective_version(&self, date: DateTime<Utc>) -> Option<&ProcessVersion> {
        self.versions
            .iter()
            .filter(|v| v.effective_date <= date)
            .max_by_key(|v| v.effective_date)
    }
}

/// One version of a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessVersion {
    pub version: String,
    pub effective_date: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

/// One step of a process version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDef {
    pub name: String,
    /// Whether events in this step get library ancestry rows
    #[serde(default)]
    pub ancestry_etl: bool,
    #[serde(default)]
    pub events: Vec<StepEvent>,
}

impl StepDef {
    /// True when `event_type` occurs in this step
    pub fn has_event(&self, event_type: &str) -> bool {
        self.events.iter().any(|e| e.event_type == event_type)
    }
}

/// An event type expected in a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub event_type: String,
    #[serde(default)]
    pub needs_order_context: bool,
    #[serde(default)]
    pub needs_batch_context: bool,
}
