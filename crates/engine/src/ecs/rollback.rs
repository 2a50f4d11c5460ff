// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ECS rollback executor
//!
//! Restores the service to the running (pre-deployment) revision:
//! re-register its task definition, re-apply its service definition,
//! create a full-scale task set on the primary target group, promote it,
//! route all traffic back to primary and delete the task sets that were
//! serving before. Steps run strictly in order and the first failure
//! ends the stage. Nothing already done is reversed; when a step fails
//! after promotion the stage log says what is left behind.

use super::{
    apply_service_definition, call, client_for, ecs_input, failed_status, find_platform_provider,
    load_service_definition, load_target_groups, load_task_definition, log_modified_rules, EcsError,
    CANARY_TARGET_GROUP_ARN_KEY,
};
use crate::executor::ExecutorInput;
use crate::source::SourceError;
use tern_adapters::{ClientRegistry, ModifyListenersError, PlatformClient, PlatformError};
use tern_core::{
    LoadBalancer, RoutingError, StageStatus, StopContext, StopSignal, Stopped, TrafficRoutingConfig,
};
use thiserror::Error;

/// Task sets are recreated at the original steady-state scale
const FULL_SCALE: u32 = 100;

/// Why a rollback stopped, one variant per step
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("Unable to determine the last deployed commit to rollback. It seems this is the first deployment.")]
    NoRunningCommit,
    #[error("No deploy source is available for the running commit {0}")]
    NoRunningSource(String),
    #[error("Failed to prepare running deploy source data ({0})")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Ecs(#[from] EcsError),
    #[error("Failed to register new revision of ECS task definition {family}: {source}")]
    Register {
        family: String,
        #[source]
        source: PlatformError,
    },
    #[error("Unable to rollback ECS service {service} configuration to previous stage: {source}")]
    ApplyService {
        service: String,
        #[source]
        source: PlatformError,
    },
    #[error("Failed to determine current ECS PRIMARY/ACTIVE task sets of service {service} for rollback: {source}")]
    ListTaskSets {
        service: String,
        #[source]
        source: PlatformError,
    },
    #[error("Failed to create ECS task set for service {service}: {source}")]
    CreateTaskSet {
        service: String,
        #[source]
        source: PlatformError,
    },
    #[error("Failed to update PRIMARY ECS task set for service {service}: {source}")]
    Promote {
        service: String,
        #[source]
        source: PlatformError,
    },
    #[error("Invalid routing back to the PRIMARY target group: {0}")]
    Routing(#[from] RoutingError),
    #[error("Failed to get current active listeners: {0}")]
    Listeners(#[source] PlatformError),
    #[error("Failed to route traffic to PRIMARY/CANARY variants: {0}")]
    ModifyListeners(#[source] ModifyListenersError),
    #[error("Failed to remove previous ACTIVE task set {task_set}: {source}")]
    DeleteTaskSet {
        task_set: String,
        #[source]
        source: PlatformError,
    },
    #[error("{0}")]
    Stopped(#[from] Stopped),
}

impl RollbackError {
    /// Rules already modified when listener reconciliation failed
    pub fn modified_rules(&self) -> Option<&[String]> {
        match self {
            Self::ModifyListeners(e) => Some(&e.modified_rules),
            _ => None,
        }
    }
}

/// What has been changed so far, for reporting a partial rollback
#[derive(Debug, Default)]
struct Progress {
    promoted: Option<String>,
    /// Previous task sets not deleted yet
    remaining: Vec<String>,
}

impl Progress {
    fn describe(&self) -> Option<String> {
        let promoted = self.promoted.as_ref()?;
        if self.remaining.is_empty() {
            return Some(format!(
                "Task set {} was already promoted to PRIMARY and is serving production traffic",
                promoted
            ));
        }
        Some(format!(
            "Task set {} was already promoted to PRIMARY and is serving production traffic, \
             while previous task sets are still present: {}. Operator intervention is required",
            promoted,
            self.remaining.join(", ")
        ))
    }
}

pub(super) async fn execute(
    input: &ExecutorInput,
    clients: &ClientRegistry,
    sig: &StopSignal,
) -> StageStatus {
    let ctx = sig.context();
    let mut progress = Progress::default();
    match ensure_rollback(input, clients, &ctx, &mut progress).await {
        Ok(()) => StageStatus::Success,
        Err(e) => {
            input.log.error(&e.to_string());
            if let Some(rules) = e.modified_rules().filter(|r| !r.is_empty()) {
                log_modified_rules(input.log.as_ref(), rules);
            }
            if let Some(partial) = progress.describe() {
                input.log.error(&partial);
            }
            tracing::warn!(
                deployment_id = %input.deployment.id,
                error = %e,
                promoted = progress.promoted.is_some(),
                "rollback failed"
            );
            failed_status(&e, sig)
        }
    }
}

async fn ensure_rollback(
    input: &ExecutorInput,
    clients: &ClientRegistry,
    ctx: &StopContext,
    progress: &mut Progress,
) -> Result<(), RollbackError> {
    let log = input.log.as_ref();

    // Nothing to roll back to on the first deployment
    if !input.deployment.has_running_commit() {
        return Err(RollbackError::NoRunningCommit);
    }
    let provider = input.running_source.as_ref().ok_or_else(|| {
        RollbackError::NoRunningSource(input.deployment.running_commit_hash.clone())
    })?;
    let source = ctx.run(provider.get()).await??;

    let app = ecs_input(&source.app_config)?;
    let platform_provider =
        find_platform_provider(&input.agent, &input.deployment, &source.app_config)?;
    let task_definition = load_task_definition(&source, &app.task_definition_file)?;
    let service_definition = load_service_definition(&source, &app.service_definition_file)?;
    let (primary, canary) = load_target_groups(app);

    log.info(&format!(
        "Start rollback the ECS service and task family: {} and {} to original stage",
        service_definition.service_name, task_definition.family
    ));
    let client = client_for(clients, &platform_provider)?;

    // An old revision cannot be re-activated, so register it again
    let registered = call(ctx, client.register_task_definition(&task_definition))
        .await
        .map_err(|source| RollbackError::Register {
            family: task_definition.family.clone(),
            source,
        })?;

    let service = apply_service_definition(ctx, client.as_ref(), &service_definition)
        .await
        .map_err(|source| RollbackError::ApplyService {
            service: service_definition.service_name.clone(),
            source,
        })?;

    let previous = match call(ctx, client.get_service_task_sets(&service)).await {
        Ok(sets) => sets,
        // A service without task sets has nothing to replace
        Err(e) if e.is_not_found() => Vec::new(),
        Err(source) => {
            return Err(RollbackError::ListTaskSets {
                service: service.service_name.clone(),
                source,
            })
        }
    };

    let task_set = call(
        ctx,
        client.create_task_set(&service, &registered, primary.as_ref(), FULL_SCALE),
    )
    .await
    .map_err(|source| RollbackError::CreateTaskSet {
        service: service.service_name.clone(),
        source,
    })?;

    call(ctx, client.update_service_primary_task_set(&service, &task_set))
        .await
        .map_err(|source| RollbackError::Promote {
            service: service.service_name.clone(),
            source,
        })?;
    progress.promoted = Some(task_set.task_set_arn.clone());
    progress.remaining = previous.iter().map(|ts| ts.task_set_arn.clone()).collect();

    // Only progressive pipelines route through target groups
    if let Some(primary) = &primary {
        rollback_routing(input, ctx, client.as_ref(), primary, canary.as_ref()).await?;
    }

    log.info("Start deleting previous ACTIVE task sets");
    for ts in &previous {
        log.info(&format!("Deleting previous ACTIVE task set {}", ts.task_set_arn));
        call(ctx, client.delete_task_set(ts))
            .await
            .map_err(|source| RollbackError::DeleteTaskSet {
                task_set: ts.task_set_arn.clone(),
                source,
            })?;
        progress.remaining.retain(|arn| arn != &ts.task_set_arn);
    }

    log.success(&format!(
        "Rolled back the ECS service {} and task definition {} configuration to original stage",
        service_definition.service_name, task_definition.family
    ));
    Ok(())
}

async fn rollback_routing(
    input: &ExecutorInput,
    ctx: &StopContext,
    client: &dyn PlatformClient,
    primary: &LoadBalancer,
    canary: Option<&LoadBalancer>,
) -> Result<(), RollbackError> {
    let log = input.log.as_ref();
    let canary_arn = match canary {
        Some(canary) => canary.target_group_arn.clone(),
        // The canary group may have been introduced by the deployment being rolled back
        None => match input.metadata.shared().get(CANARY_TARGET_GROUP_ARN_KEY) {
            Some(arn) => {
                log.info(&format!(
                    "Successfully got canary target group ARN from metadata store, although it was not included in the last successful commit: {}",
                    arn
                ));
                arn
            }
            None => {
                log.info("Skip rolling back ELB listeners because it seems the deployment failed before updating them");
                return Ok(());
            }
        },
    };

    let routing = TrafficRoutingConfig::all_primary(&primary.target_group_arn, &canary_arn)?;

    let listeners = call(ctx, client.get_listener_arns(primary))
        .await
        .map_err(RollbackError::Listeners)?;

    let modified = client
        .modify_listeners(&listeners, &routing, ctx)
        .await
        .map_err(RollbackError::ModifyListeners)?;
    log_modified_rules(log, &modified);

    log.info(&format!(
        "Successfully rolled back ELB listeners of target groups {} (PRIMARY) and {} (CANARY)",
        primary.target_group_arn, canary_arn
    ));
    Ok(())
}

#[cfg(test)]
#[path = "rollback_tests.rs"]
mod tests;
