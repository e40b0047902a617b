// Datawh - Revision-driven warehouse ETL
// Copyright (c) 2025 Datawh Contributors
// Licensed under the MIT License

//! Export of the flattened workflow configuration

use crate::core::etl::job::{EtlJob, JobOutcome};
use crate::core::record::StreamSet;
use crate::core::state::StateManager;
use crate::core::workflow::flatten::WORKFLOW_CONFIG_TABLE;
use crate::core::workflow::provider::WorkflowConfigProvider;
use crate::domain::change::RevisionInterval;
use crate::domain::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Writes every configuration row when the aggregate hash changed
///
/// The configuration is not audited, so the job runs on every interval,
/// including empty ones. The new hash travels in the job outcome and is
/// persisted together with the watermark.
pub struct WorkflowConfigEtl {
    provider: Arc<WorkflowConfigProvider>,
    state: Arc<StateManager>,
}

impl WorkflowConfigEtl {
    pub fn new(provider: Arc<WorkflowConfigProvider>, state: Arc<StateManager>) -> Self {
        Self { provider, state }
    }
}

#[async_trait]
impl EtlJob for WorkflowConfigEtl {
    fn name(&self) -> &str {
        WORKFLOW_CONFIG_TABLE
    }

    async fn run(
        &self,
        interval: &RevisionInterval,
        streams: &mut StreamSet,
    ) -> Result<JobOutcome> {
        let mut outcome = JobOutcome::new(WORKFLOW_CONFIG_TABLE);
        let resolver = self.provider.refresh().await?;
        let persisted = self.state.load_config_hash().await?;

        if persisted.as_deref() == Some(resolver.hash()) {
            tracing::debug!(hash = %resolver.hash(), "Workflow configuration already exported");
            return Ok(outcome);
        }

        let etl_date = interval.etl_date();
        for row in resolver.rows() {
            streams.write(WORKFLOW_CONFIG_TABLE, &row.to_record(etl_date))?;
        }
        outcome.add_records(resolver.rows().len());
        outcome.config_hash = Some(resolver.hash().to_string());

        tracing::info!(
            rows = resolver.rows().len(),
            previous = ?persisted,
            hash = %resolver.hash(),
            "Exported workflow configuration"
        );
        Ok(outcome)
    }
}
