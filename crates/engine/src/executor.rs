// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage executor input

use crate::source::DeploySourceProvider;
use std::sync::Arc;
use tern_adapters::{LogPersister, NoOpLogPersister};
use tern_core::{AgentConfig, Deployment, MetadataStore, MetadataView, Stage};

/// Everything an executor gets for one stage execution
#[derive(Clone)]
pub struct ExecutorInput {
    /// Snapshot of the deployment when the stage started
    pub deployment: Deployment,
    /// The stage, with the status it had before this execution
    pub stage: Stage,
    pub metadata: MetadataStore,
    pub log: Arc<dyn LogPersister>,
    /// Source at the running commit. None for a first deployment.
    pub running_source: Option<Arc<dyn DeploySourceProvider>>,
    pub target_source: Arc<dyn DeploySourceProvider>,
    pub agent: Arc<AgentConfig>,
}

impl ExecutorInput {
    pub fn new(
        deployment: Deployment,
        stage: Stage,
        metadata: MetadataStore,
        target_source: Arc<dyn DeploySourceProvider>,
        agent: Arc<AgentConfig>,
    ) -> Self {
        Self {
            deployment,
            stage,
            metadata,
            log: Arc::new(NoOpLogPersister),
            running_source: None,
            target_source,
            agent,
        }
    }

    pub fn with_running_source(mut self, source: Arc<dyn DeploySourceProvider>) -> Self {
        self.running_source = Some(source);
        self
    }

    pub fn with_log(mut self, log: Arc<dyn LogPersister>) -> Self {
        self.log = log;
        self
    }

    /// Metadata partition private to this stage
    pub fn stage_metadata(&self) -> MetadataView<'_> {
        self.metadata.stage(&self.stage.id)
    }
}
