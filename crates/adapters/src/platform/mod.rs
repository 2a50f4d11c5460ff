// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform client: remote operations against a container scheduler
//!
//! Each method is a single remote call. Failures are returned as-is and
//! never retried here; retry policy belongs to the caller.

mod registry;

pub use registry::{ClientFactory, ClientRegistry};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakePlatformClient, PlatformCall, PlatformOp};

use async_trait::async_trait;
use std::sync::Arc;
use tern_core::{
    LoadBalancer, PlatformKind, ServiceDefinition, StopContext, Stopped, TaskDefinition, TaskSet,
    TrafficRoutingConfig,
};
use thiserror::Error;

/// Errors from platform operations
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The requested resource does not exist (yet)
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },
    #[error(transparent)]
    Stopped(#[from] Stopped),
    #[error("unknown platform provider: {0}")]
    UnknownProvider(String),
    #[error("platform provider {name} of kind {kind:?} is not supported")]
    Unsupported { name: String, kind: PlatformKind },
}

impl PlatformError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            message: message.into(),
        }
    }

    /// The distinguished not-found condition callers may treat as empty
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Failure of `modify_listeners`, with the rules changed before it failed
#[derive(Debug, Error)]
#[error("{source} ({} rules modified before the failure)", .modified_rules.len())]
pub struct ModifyListenersError {
    pub modified_rules: Vec<String>,
    #[source]
    pub source: PlatformError,
}

/// Remote operations the stage executors need from an ECS-like platform
#[async_trait]
pub trait PlatformClient: Send + Sync + 'static {
    /// Always creates a new immutable revision
    async fn register_task_definition(
        &self,
        def: &TaskDefinition,
    ) -> Result<TaskDefinition, PlatformError>;

    async fn service_exists(&self, cluster: &str, service_name: &str)
        -> Result<bool, PlatformError>;

    async fn create_service(
        &self,
        def: &ServiceDefinition,
    ) -> Result<ServiceDefinition, PlatformError>;

    async fn update_service(
        &self,
        def: &ServiceDefinition,
    ) -> Result<ServiceDefinition, PlatformError>;

    /// `scale` is a percentage of the service's desired count
    async fn create_task_set(
        &self,
        service: &ServiceDefinition,
        def: &TaskDefinition,
        target_group: Option<&LoadBalancer>,
        scale: u32,
    ) -> Result<TaskSet, PlatformError>;

    /// Mark `task_set` as the one serving production traffic
    async fn update_service_primary_task_set(
        &self,
        service: &ServiceDefinition,
        task_set: &TaskSet,
    ) -> Result<TaskSet, PlatformError>;

    /// PRIMARY and ACTIVE task sets of a service.
    ///
    /// Fails with [`PlatformError::NotFound`] when the service has none.
    async fn get_service_task_sets(
        &self,
        service: &ServiceDefinition,
    ) -> Result<Vec<TaskSet>, PlatformError>;

    async fn delete_task_set(&self, task_set: &TaskSet) -> Result<(), PlatformError>;

    async fn get_listener_arns(
        &self,
        target_group: &LoadBalancer,
    ) -> Result<Vec<String>, PlatformError>;

    /// Apply `routing` to every rule of the given listeners.
    ///
    /// Returns the modified rule ARNs; on failure the error carries the
    /// rules that were already modified. Once `ctx` fires, no further rule
    /// is started and the call fails with [`PlatformError::Stopped`].
    async fn modify_listeners(
        &self,
        listener_arns: &[String],
        routing: &TrafficRoutingConfig,
        ctx: &StopContext,
    ) -> Result<Vec<String>, ModifyListenersError>;
}

#[async_trait]
impl<C: PlatformClient + ?Sized> PlatformClient for Arc<C> {
    async fn register_task_definition(
        &self,
        def: &TaskDefinition,
    ) -> Result<TaskDefinition, PlatformError> {
        (**self).register_task_definition(def).await
    }

    async fn service_exists(
        &self,
        cluster: &str,
        service_name: &str,
    ) -> Result<bool, PlatformError> {
        (**self).service_exists(cluster, service_name).await
    }

    async fn create_service(
        &self,
        def: &ServiceDefinition,
    ) -> Result<ServiceDefinition, PlatformError> {
        (**self).create_service(def).await
    }

    async fn update_service(
        &self,
        def: &ServiceDefinition,
    ) -> Result<ServiceDefinition, PlatformError> {
        (**self).update_service(def).await
    }

    async fn create_task_set(
        &self,
        service: &ServiceDefinition,
        def: &TaskDefinition,
        target_group: Option<&LoadBalancer>,
        scale: u32,
    ) -> Result<TaskSet, PlatformError> {
        (**self)
            .create_task_set(service, def, target_group, scale)
            .await
    }

    async fn update_service_primary_task_set(
        &self,
        service: &ServiceDefinition,
        task_set: &TaskSet,
    ) -> Result<TaskSet, PlatformError> {
        (**self)
            .update_service_primary_task_set(service, task_set)
            .await
    }

    async fn get_service_task_sets(
        &self,
        service: &ServiceDefinition,
    ) -> Result<Vec<TaskSet>, PlatformError> {
        (**self).get_service_task_sets(service).await
    }

    async fn delete_task_set(&self, task_set: &TaskSet) -> Result<(), PlatformError> {
        (**self).delete_task_set(task_set).await
    }

    async fn get_listener_arns(
        &self,
        target_group: &LoadBalancer,
    ) -> Result<Vec<String>, PlatformError> {
        (**self).get_listener_arns(target_group).await
    }

    async fn modify_listeners(
        &self,
        listener_arns: &[String],
        routing: &TrafficRoutingConfig,
        ctx: &StopContext,
    ) -> Result<Vec<String>, ModifyListenersError> {
        (**self).modify_listeners(listener_arns, routing, ctx).await
    }
}
