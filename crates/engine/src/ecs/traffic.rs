// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ECS traffic routing executor
//!
//! Shifts listener weights between the primary and canary target groups of
//! the target revision. The canary group is recorded in shared metadata
//! before any listener changes so a later rollback can find it.

use super::{
    call, client_for, ecs_input, failed_status, find_platform_provider, load_target_groups,
    log_modified_rules, EcsError, CANARY_TARGET_GROUP_ARN_KEY,
};
use crate::executor::ExecutorInput;
use crate::source::SourceError;
use tern_adapters::{ClientRegistry, ModifyListenersError, PlatformError};
use tern_core::{
    MetadataError, RoutingError, StageStatus, StopContext, StopSignal, Stopped,
    TrafficRoutingConfig, TOTAL_WEIGHT,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrafficRoutingError {
    #[error("Failed to prepare target deploy source data ({0})")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Ecs(#[from] EcsError),
    #[error("Primary and canary target groups are required for traffic routing")]
    MissingTargetGroups,
    #[error("Invalid traffic percentage: {0}")]
    InvalidPercentage(String),
    #[error("Invalid traffic routing: {0}")]
    Routing(#[from] RoutingError),
    #[error("Failed to store canary target group ARN to metadata store: {0}")]
    Metadata(#[from] MetadataError),
    #[error("Failed to get current active listeners: {0}")]
    Listeners(#[source] PlatformError),
    #[error("Failed to route traffic to PRIMARY/CANARY variants: {0}")]
    ModifyListeners(#[source] ModifyListenersError),
    #[error("{0}")]
    Stopped(#[from] Stopped),
}

impl TrafficRoutingError {
    pub fn modified_rules(&self) -> Option<&[String]> {
        match self {
            Self::ModifyListeners(e) => Some(&e.modified_rules),
            _ => None,
        }
    }
}

/// Weight of the primary group from the `primary` or `canary` option.
/// Without either option all traffic goes to primary.
pub(super) fn primary_weight(config: &serde_json::Value) -> Result<u32, String> {
    let percentage = |key: &str| -> Result<Option<u32>, String> {
        match config.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => match value.as_u64() {
                Some(p) if p <= u64::from(TOTAL_WEIGHT) => Ok(Some(p as u32)),
                _ => Err(format!("{} must be a percentage between 0 and 100, got {}", key, value)),
            },
        }
    };
    match (percentage("primary")?, percentage("canary")?) {
        (Some(primary), Some(canary)) if primary + canary != TOTAL_WEIGHT => Err(format!(
            "primary {} and canary {} must add up to {}",
            primary, canary, TOTAL_WEIGHT
        )),
        (Some(primary), _) => Ok(primary),
        (None, Some(canary)) => Ok(TOTAL_WEIGHT - canary),
        (None, None) => Ok(TOTAL_WEIGHT),
    }
}

pub(super) async fn execute(
    input: &ExecutorInput,
    clients: &ClientRegistry,
    sig: &StopSignal,
) -> StageStatus {
    let ctx = sig.context();
    match ensure_traffic_routing(input, clients, &ctx).await {
        Ok(()) => StageStatus::Success,
        Err(e) => {
            input.log.error(&e.to_string());
            if let Some(rules) = e.modified_rules().filter(|r| !r.is_empty()) {
                log_modified_rules(input.log.as_ref(), rules);
            }
            failed_status(&e, sig)
        }
    }
}

async fn ensure_traffic_routing(
    input: &ExecutorInput,
    clients: &ClientRegistry,
    ctx: &StopContext,
) -> Result<(), TrafficRoutingError> {
    let log = input.log.as_ref();
    let primary_weight =
        primary_weight(&input.stage.config).map_err(TrafficRoutingError::InvalidPercentage)?;

    let source = ctx.run(input.target_source.get()).await??;
    let app = ecs_input(&source.app_config)?;
    let platform_provider =
        find_platform_provider(&input.agent, &input.deployment, &source.app_config)?;
    let (Some(primary), Some(canary)) = load_target_groups(app) else {
        return Err(TrafficRoutingError::MissingTargetGroups);
    };
    let routing = TrafficRoutingConfig::primary_canary(
        &primary.target_group_arn,
        &canary.target_group_arn,
        primary_weight,
    )?;
    let client = client_for(clients, &platform_provider)?;

    // Record the canary group first so a rollback can undo a partial update
    input
        .metadata
        .shared()
        .set(CANARY_TARGET_GROUP_ARN_KEY, &canary.target_group_arn)?;

    let listeners = call(ctx, client.get_listener_arns(&primary))
        .await
        .map_err(TrafficRoutingError::Listeners)?;

    let modified = client
        .modify_listeners(&listeners, &routing, ctx)
        .await
        .map_err(TrafficRoutingError::ModifyListeners)?;
    log_modified_rules(log, &modified);

    log.success(&format!(
        "Routed {}% of traffic to PRIMARY ({}) and {}% to CANARY ({})",
        primary_weight,
        primary.target_group_arn,
        TOTAL_WEIGHT - primary_weight,
        canary.target_group_arn
    ));
    Ok(())
}

#[cfg(test)]
#[path = "traffic_tests.rs"]
mod tests;
