// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tern-core: domain model of the tern delivery agent
//!
//! This crate provides:
//! - Deployment and stage records plus the stage-status decision rule
//! - The stop signal threaded through stage executions
//! - The per-deployment metadata store
//! - Traffic routing and ECS resource descriptors
//! - Agent and application configuration

pub mod clock;
pub mod config;
pub mod deployment;
pub mod ecs;
pub mod id;
pub mod metadata;
pub mod operation;
pub mod routing;
pub mod stage;
pub mod stop;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    AgentConfig, ApplicationConfig, ConfigError, EcsApplicationSpec, EcsDeploymentInput,
    EcsProviderConfig, EcsTargetGroups, PipelineConfig, PlatformKind, PlatformProviderConfig,
};
pub use deployment::{Deployment, DeploymentStatus};
pub use ecs::{DefinitionError, LoadBalancer, ServiceDefinition, TaskDefinition, TaskSet, TaskSetStatus};
pub use id::{IdGen, SequentialIdGen, UuidIdGen};
pub use metadata::{
    DeploymentMetadata, MetadataBackend, MetadataError, MetadataScope, MetadataStore, MetadataView,
};
pub use operation::Operation;
pub use routing::{RoutingError, RoutingTarget, TrafficRoutingConfig, TOTAL_WEIGHT};
pub use stage::{determine_stage_status, ManualOperation, Stage, StageStatus};
pub use stop::{StopContext, MAX_STAGE_TIMEOUT, StopHandle, StopReason, StopSignal, Stopped};
