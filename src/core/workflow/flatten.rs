// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Flattening of the hierarchical workflow configuration
//!
//! Workflow versions and process versions are walked newest first. A workflow
//! version ends where the next newer one starts, and a process version that
//! only starts after its enclosing workflow version ended can never be
//! reached; such combinations are left out with a debug log.

use crate::core::record::DenormalizedRecord;
use crate::core::workflow::hash::stable_hash;
use crate::domain::change::{EtlDate, TIMESTAMP_FORMAT};
use crate::domain::workflow::{ProcessVersion, WorkflowConfig, WorkflowVersion};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Table the flattened rows are exported to
pub const WORKFLOW_CONFIG_TABLE: &str = "workflow_config";

/// One leaf of the configuration: workflow version, process version, step and event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfigDenorm {
    pub id: i64,
    pub workflow_id: i64,
    pub process_id: i64,
    pub effective_date: DateTime<Utc>,
    pub workflow_name: String,
    pub workflow_version: String,
    pub process_name: String,
    pub process_version: String,
    pub step_name: String,
    pub event_name: String,
    pub needs_order_context: bool,
    pub needs_batch_context: bool,
}

impl WorkflowConfigDenorm {
    #[allow(clippy::too_many_arguments)]
    fn new(
        effective_date: DateTime<Utc>,
        workflow_name: &str,
        workflow: &WorkflowVersion,
        process_name: &str,
        process: &ProcessVersion,
        step_name: &str,
        event_name: &str,
        needs_order_context: bool,
        needs_batch_context: bool,
    ) -> Self {
        let date = effective_date.format(TIMESTAMP_FORMAT).to_string();
        let id = stable_hash(&[
            date.as_str(),
            workflow_name,
            workflow.version.as_str(),
            process_name,
            process.version.as_str(),
            step_name,
            event_name,
            if needs_order_context { "true" } else { "false" },
            if needs_batch_context { "true" } else { "false" },
        ]);
        Self {
            id,
            workflow_id: stable_hash(&[workflow_name, workflow.version.as_str()]),
            process_id: stable_hash(&[process_name, process.version.as_str()]),
            effective_date,
            workflow_name: workflow_name.to_string(),
            workflow_version: workflow.version.clone(),
            process_name: process_name.to_string(),
            process_version: process.version.clone(),
            step_name: step_name.to_string(),
            event_name: event_name.to_string(),
            needs_order_context,
            needs_batch_context,
        }
    }

    /// Export record for the `workflow_config` table
    pub fn to_record(&self, etl_date: EtlDate) -> DenormalizedRecord {
        DenormalizedRecord::upsert(etl_date)
            .number(Some(self.id))
            .number(Some(self.workflow_id))
            .number(Some(self.process_id))
            .text(Some(&self.workflow_name))
            .text(Some(&self.workflow_version))
            .text(Some(&self.process_name))
            .text(Some(&self.process_version))
            .text(Some(&self.step_name))
            .text(Some(&self.event_name))
            .flag(self.needs_order_context)
            .flag(self.needs_batch_context)
            .timestamp(Some(self.effective_date))
    }
}

/// Flattens `config` into one row per reachable leaf
///
/// Rows come out in walk order; a leaf reachable twice with identical
/// identifying fields is kept once.
pub fn flatten(config: &WorkflowConfig) -> Vec<WorkflowConfigDenorm> {
    let mut rows = Vec::new();
    let mut seen = BTreeSet::new();

    for workflow in &config.workflows {
        let mut versions: Vec<&WorkflowVersion> = workflow.versions.iter().collect();
        versions.sort_by(|a, b| b.effective_date.cmp(&a.effective_date));

        let mut end_date: Option<DateTime<Utc>> = None;
        for workflow_version in versions {
            for process_name in &workflow_version.processes {
                let Some(process) = config.process(process_name) else {
                    tracing::debug!(
                        workflow = %workflow.name,
                        process = %process_name,
                        "Workflow references an undefined process"
                    );
                    continue;
                };

                let mut process_versions: Vec<&ProcessVersion> = process.versions.iter().collect();
                process_versions.sort_by(|a, b| b.effective_date.cmp(&a.effective_date));

                for process_version in process_versions {
                    if let Some(end) = end_date {
                        if process_version.effective_date > end {
                            tracing::debug!(
                                workflow = %workflow.name,
                                workflow_version = %workflow_version.version,
                                process = %process.name,
                                process_version = %process_version.version,
                                "Process version starts after its workflow version ended"
                            );
                            continue;
                        }
                    }

                    let effective_date = process_version
                        .effective_date
                        .max(workflow_version.effective_date);

                    for step in &process_version.steps {
                        for event in &step.events {
                            let row = WorkflowConfigDenorm::new(
                                effective_date,
                                &workflow.name,
                                workflow_version,
                                &process.name,
                                process_version,
                                &step.name,
                                &event.event_type,
                                event.needs_order_context,
                                event.needs_batch_context,
                            );
                            if seen.insert(row.id) {
                                rows.push(row);
                            }
                        }
                    }
                }
            }
            end_date = Some(workflow_version.effective_date);
        }
    }

    rows
}
