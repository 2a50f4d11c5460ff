// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced platform client wrapper for consistent observability

use crate::platform::{ModifyListenersError, PlatformClient, PlatformError};
use async_trait::async_trait;
use std::fmt::Display;
use std::time::Instant;
use tern_core::{
    LoadBalancer, ServiceDefinition, StopContext, TaskDefinition, TaskSet, TrafficRoutingConfig,
};
use tracing::Instrument;

/// Wrapper that adds tracing to any PlatformClient
#[derive(Clone)]
pub struct TracedPlatformClient<C> {
    inner: C,
}

impl<C> TracedPlatformClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

fn log_outcome<T, E: Display>(result: &Result<T, E>, start: Instant, done: &'static str) {
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(_) => tracing::info!(elapsed_ms, "{}", done),
        Err(e) => tracing::error!(elapsed_ms, error = %e, "failed"),
    }
}

#[async_trait]
impl<C: PlatformClient> PlatformClient for TracedPlatformClient<C> {
    async fn register_task_definition(
        &self,
        def: &TaskDefinition,
    ) -> Result<TaskDefinition, PlatformError> {
        let span = tracing::info_span!("platform.register_task_definition", family = %def.family);
        async {
            let start = Instant::now();
            let result = self.inner.register_task_definition(def).await;
            log_outcome(&result, start, "task definition registered");
            if let Ok(registered) = &result {
                tracing::debug!(revision = ?registered.revision, "new revision");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn service_exists(
        &self,
        cluster: &str,
        service_name: &str,
    ) -> Result<bool, PlatformError> {
        let result = self.inner.service_exists(cluster, service_name).await;
        tracing::trace!(cluster, service_name, exists = ?result.as_ref().ok(), "checked service");
        result
    }

    async fn create_service(
        &self,
        def: &ServiceDefinition,
    ) -> Result<ServiceDefinition, PlatformError> {
        let span = tracing::info_span!(
            "platform.create_service",
            cluster = %def.cluster,
            service = %def.service_name
        );
        async {
            let start = Instant::now();
            let result = self.inner.create_service(def).await;
            log_outcome(&result, start, "service created");
            result
        }
        .instrument(span)
        .await
    }

    async fn update_service(
        &self,
        def: &ServiceDefinition,
    ) -> Result<ServiceDefinition, PlatformError> {
        let span = tracing::info_span!(
            "platform.update_service",
            cluster = %def.cluster,
            service = %def.service_name
        );
        async {
            let start = Instant::now();
            let result = self.inner.update_service(def).await;
            log_outcome(&result, start, "service updated");
            result
        }
        .instrument(span)
        .await
    }

    async fn create_task_set(
        &self,
        service: &ServiceDefinition,
        def: &TaskDefinition,
        target_group: Option<&LoadBalancer>,
        scale: u32,
    ) -> Result<TaskSet, PlatformError> {
        let span = tracing::info_span!(
            "platform.create_task_set",
            service = %service.service_name,
            scale
        );
        async {
            // Precondition: only registered revisions can back a task set
            let Some(arn) = def.task_definition_arn.as_deref() else {
                tracing::error!(family = %def.family, "task definition has no ARN");
                return Err(PlatformError::api(
                    "CreateTaskSet",
                    format!("task definition {} has not been registered", def.family),
                ));
            };
            tracing::info!(
                task_definition = arn,
                target_group = ?target_group.map(|tg| tg.target_group_arn.as_str()),
                "starting"
            );

            let start = Instant::now();
            let result = self
                .inner
                .create_task_set(service, def, target_group, scale)
                .await;
            log_outcome(&result, start, "task set created");
            result
        }
        .instrument(span)
        .await
    }

    async fn update_service_primary_task_set(
        &self,
        service: &ServiceDefinition,
        task_set: &TaskSet,
    ) -> Result<TaskSet, PlatformError> {
        let span = tracing::info_span!(
            "platform.update_primary_task_set",
            service = %service.service_name,
            task_set = %task_set.task_set_arn
        );
        async {
            let start = Instant::now();
            let result = self
                .inner
                .update_service_primary_task_set(service, task_set)
                .await;
            log_outcome(&result, start, "task set promoted to PRIMARY");
            result
        }
        .instrument(span)
        .await
    }

    async fn get_service_task_sets(
        &self,
        service: &ServiceDefinition,
    ) -> Result<Vec<TaskSet>, PlatformError> {
        let result = self.inner.get_service_task_sets(service).await;
        match &result {
            Ok(sets) => tracing::debug!(service = %service.service_name, count = sets.len(), "listed task sets"),
            // Not-found is an expected answer for services without task sets
            Err(e) if e.is_not_found() => {
                tracing::debug!(service = %service.service_name, "no task sets")
            }
            Err(e) => tracing::error!(service = %service.service_name, error = %e, "list task sets failed"),
        }
        result
    }

    async fn delete_task_set(&self, task_set: &TaskSet) -> Result<(), PlatformError> {
        let span = tracing::info_span!("platform.delete_task_set", task_set = %task_set.task_set_arn);
        async {
            let start = Instant::now();
            let result = self.inner.delete_task_set(task_set).await;
            log_outcome(&result, start, "task set deleted");
            result
        }
        .instrument(span)
        .await
    }

    async fn get_listener_arns(
        &self,
        target_group: &LoadBalancer,
    ) -> Result<Vec<String>, PlatformError> {
        let result = self.inner.get_listener_arns(target_group).await;
        tracing::debug!(
            target_group = %target_group.target_group_arn,
            count = result.as_ref().map(|v| v.len()).ok(),
            "listed listeners"
        );
        result
    }

    async fn modify_listeners(
        &self,
        listener_arns: &[String],
        routing: &TrafficRoutingConfig,
        ctx: &StopContext,
    ) -> Result<Vec<String>, ModifyListenersError> {
        let span = tracing::info_span!("platform.modify_listeners", listeners = listener_arns.len());
        async {
            for target in routing.targets() {
                tracing::info!(target_group = %target.target_group_arn, weight = target.weight, "routing");
            }

            let start = Instant::now();
            let result = self.inner.modify_listeners(listener_arns, routing, ctx).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(rules) => tracing::info!(elapsed_ms, modified = rules.len(), "listeners modified"),
                Err(e) => tracing::error!(
                    elapsed_ms,
                    modified = e.modified_rules.len(),
                    error = %e.source,
                    "failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
