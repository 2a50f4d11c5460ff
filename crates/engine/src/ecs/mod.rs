// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ECS stage plugin: rollback and traffic routing

mod rollback;
mod traffic;

pub use rollback::RollbackError;
pub use traffic::TrafficRoutingError;

use crate::executor::ExecutorInput;
use crate::plugin::{BuildStagesRequest, PipelineStage, PluginError, StagePlugin};
use crate::source::{DeploySource, SourceError};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tern_adapters::{ClientRegistry, LogPersister, PlatformClient, PlatformError};
use tern_core::{
    AgentConfig, ApplicationConfig, DefinitionError, Deployment, EcsDeploymentInput, LoadBalancer,
    PlatformKind, PlatformProviderConfig, ServiceDefinition, StageStatus, StopContext, StopSignal,
    Stopped, TaskDefinition,
};
use thiserror::Error;

pub const STAGE_ROLLBACK: &str = "ROLLBACK";
pub const STAGE_TRAFFIC_ROUTING: &str = "ECS_TRAFFIC_ROUTING";

/// Shared metadata key holding the canary target group touched by traffic routing
pub const CANARY_TARGET_GROUP_ARN_KEY: &str = "canary-target-group-arn";

/// Errors common to ECS executors
#[derive(Debug, Error)]
pub enum EcsError {
    #[error("Malformed application configuration: missing ECS application spec")]
    MissingEcsSpec,
    #[error("Platform provider {0} was not found in the agent config")]
    ProviderNotFound(String),
    #[error("Platform provider {name} is of kind {kind:?}, expected ecs")]
    NotEcsProvider { name: String, kind: PlatformKind },
    #[error("Failed to load {what} from {path}: {source}")]
    LoadFile {
        what: &'static str,
        path: String,
        #[source]
        source: SourceError,
    },
    #[error("Failed to parse {what} {path}: {source}")]
    ParseDefinition {
        what: &'static str,
        path: String,
        #[source]
        source: DefinitionError,
    },
    #[error("Unable to create ECS client for the provider {provider}: {source}")]
    Client {
        provider: String,
        #[source]
        source: PlatformError,
    },
}

/// Executes ECS stages against clients from the registry
pub struct EcsPlugin {
    clients: Arc<ClientRegistry>,
}

impl EcsPlugin {
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self { clients }
    }
}

#[async_trait]
impl StagePlugin for EcsPlugin {
    fn name(&self) -> &'static str {
        "ecs"
    }

    fn fetch_defined_stages(&self) -> Vec<&'static str> {
        vec![STAGE_ROLLBACK, STAGE_TRAFFIC_ROUTING]
    }

    fn build_pipeline_sync_stages(
        &self,
        request: &BuildStagesRequest,
    ) -> Result<Vec<PipelineStage>, PluginError> {
        let mut stages = Vec::with_capacity(request.stages.len() + 1);
        for requested in &request.stages {
            match requested.name.as_str() {
                STAGE_TRAFFIC_ROUTING => {
                    traffic::primary_weight(&requested.config).map_err(|message| {
                        PluginError::InvalidOption {
                            stage: requested.name.clone(),
                            option: "primary",
                            message,
                        }
                    })?;
                    stages.push(PipelineStage::from_request(requested));
                }
                STAGE_ROLLBACK => return Err(PluginError::ReservedStage(requested.name.clone())),
                other => return Err(PluginError::UnsupportedStage(other.to_string())),
            }
        }

        if request.rollback {
            let mut rollback = PipelineStage::from_request(&crate::plugin::StageRequest::new(
                0,
                STAGE_ROLLBACK,
            ));
            rollback.rollback = true;
            stages.push(rollback);
        }
        Ok(stages)
    }

    async fn execute_stage(&self, input: &ExecutorInput, sig: &StopSignal) -> StageStatus {
        match input.stage.name.as_str() {
            STAGE_ROLLBACK => rollback::execute(input, &self.clients, sig).await,
            STAGE_TRAFFIC_ROUTING => traffic::execute(input, &self.clients, sig).await,
            other => {
                input
                    .log
                    .error(&format!("Unsupported stage {} for ECS application", other));
                StageStatus::Failure
            }
        }
    }
}

/// Run one platform call unless the stop signal fires first
pub(crate) async fn call<T, F>(ctx: &StopContext, fut: F) -> Result<T, PlatformError>
where
    F: Future<Output = Result<T, PlatformError>>,
{
    ctx.run(fut).await?
}

/// Whether an error chain was caused by the stop signal
pub(crate) fn is_stopped(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<Stopped>().is_some()
            || matches!(e.downcast_ref::<PlatformError>(), Some(PlatformError::Stopped(_)))
        {
            return true;
        }
        current = e.source();
    }
    false
}

/// Resolve the platform provider: the application override, else the
/// deployment's own provider. It must be an ECS provider.
pub(crate) fn find_platform_provider(
    agent: &AgentConfig,
    deployment: &Deployment,
    app: &ApplicationConfig,
) -> Result<PlatformProviderConfig, EcsError> {
    let name = app
        .platform_provider
        .as_deref()
        .unwrap_or(&deployment.platform_provider);
    let provider = agent
        .find_platform_provider(name)
        .ok_or_else(|| EcsError::ProviderNotFound(name.to_string()))?;
    if provider.kind != PlatformKind::Ecs {
        return Err(EcsError::NotEcsProvider {
            name: provider.name.clone(),
            kind: provider.kind,
        });
    }
    Ok(provider.clone())
}

pub(crate) fn ecs_input(app: &ApplicationConfig) -> Result<&EcsDeploymentInput, EcsError> {
    app.ecs
        .as_ref()
        .map(|spec| &spec.input)
        .ok_or(EcsError::MissingEcsSpec)
}

pub(crate) fn load_task_definition(
    source: &DeploySource,
    path: &str,
) -> Result<TaskDefinition, EcsError> {
    let what = "task definition";
    let data = source.read_file(path).map_err(|source| EcsError::LoadFile {
        what,
        path: path.to_string(),
        source,
    })?;
    TaskDefinition::from_json(data).map_err(|source| EcsError::ParseDefinition {
        what,
        path: path.to_string(),
        source,
    })
}

pub(crate) fn load_service_definition(
    source: &DeploySource,
    path: &str,
) -> Result<ServiceDefinition, EcsError> {
    let what = "service definition";
    let data = source.read_file(path).map_err(|source| EcsError::LoadFile {
        what,
        path: path.to_string(),
        source,
    })?;
    ServiceDefinition::from_json(data).map_err(|source| EcsError::ParseDefinition {
        what,
        path: path.to_string(),
        source,
    })
}

/// Primary and canary target groups of a revision
pub(crate) fn load_target_groups(
    input: &EcsDeploymentInput,
) -> (Option<LoadBalancer>, Option<LoadBalancer>) {
    match &input.target_groups {
        Some(groups) => (groups.primary.clone(), groups.canary.clone()),
        None => (None, None),
    }
}

pub(crate) fn client_for(
    clients: &ClientRegistry,
    provider: &PlatformProviderConfig,
) -> Result<Arc<dyn PlatformClient>, EcsError> {
    clients.client(provider).map_err(|source| EcsError::Client {
        provider: provider.name.clone(),
        source,
    })
}

/// Create the service if it does not exist yet, update it otherwise.
/// Applying an already-matching definition changes nothing.
pub(crate) async fn apply_service_definition(
    ctx: &StopContext,
    client: &dyn PlatformClient,
    def: &ServiceDefinition,
) -> Result<ServiceDefinition, PlatformError> {
    let exists = call(ctx, client.service_exists(&def.cluster, &def.service_name)).await?;
    if exists {
        call(ctx, client.update_service(def)).await
    } else {
        call(ctx, client.create_service(def)).await
    }
}

pub(crate) fn log_modified_rules(log: &dyn LogPersister, rules: &[String]) {
    log.info(&format!(
        "Modified {} listener rules: {}",
        rules.len(),
        rules.join(", ")
    ));
}

/// Outcome of an ECS executor after its error was logged
pub(crate) fn failed_status(err: &(dyn std::error::Error + 'static), sig: &StopSignal) -> StageStatus {
    if is_stopped(err) || sig.is_stopped() {
        StageStatus::Cancelled
    } else {
        StageStatus::Failure
    }
}

#[cfg(test)]
#[path = "ecs_tests.rs"]
mod tests;
