// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Tern pipeline engine: stage plugins, executors and the pipeline controller

mod controller;
pub mod ecs;
mod error;
mod executor;
mod plugin;
mod registry;
mod source;
mod wait;

#[cfg(test)]
mod test_helpers;

pub use controller::{ControlHandle, ControlRequest, Controller, DeploymentJob, DeploymentRun};
pub use ecs::{EcsPlugin, CANARY_TARGET_GROUP_ARN_KEY, STAGE_ROLLBACK, STAGE_TRAFFIC_ROUTING};
pub use error::ControllerError;
pub use executor::ExecutorInput;
pub use plugin::{
    duration_option, BuildStagesRequest, PipelineStage, PluginError, StagePlugin, StageRequest,
};
pub use registry::{PluginRegistry, RegistryError};
pub use source::{DeploySource, DeploySourceProvider, SourceError, StaticSourceProvider};
pub use wait::{WaitPlugin, STAGE_WAIT};
