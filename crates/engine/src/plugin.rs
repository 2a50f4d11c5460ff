// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin boundary through which stage types are supplied to the engine

use crate::executor::ExecutorInput;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tern_core::{ManualOperation, Stage, StageStatus, StopSignal, MAX_STAGE_TIMEOUT};
use thiserror::Error;

/// Errors a plugin reports while building stages
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("stage {0} is not supported by this plugin")]
    UnsupportedStage(String),
    #[error("stage {0} is added automatically and cannot be requested")]
    ReservedStage(String),
    #[error("invalid option {option} of stage {stage}: {message}")]
    InvalidOption {
        stage: String,
        option: &'static str,
        message: String,
    },
}

/// One stage as authored in the application pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct StageRequest {
    pub index: u32,
    pub name: String,
    pub config: serde_json::Value,
}

impl StageRequest {
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// Input of [`StagePlugin::build_pipeline_sync_stages`]
#[derive(Debug, Clone, PartialEq)]
pub struct BuildStagesRequest {
    /// Requested stages this plugin declared support for
    pub stages: Vec<StageRequest>,
    /// Whether rollback stages should be added
    pub rollback: bool,
}

/// Concrete stage descriptor produced by a plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStage {
    pub index: u32,
    pub name: String,
    pub rollback: bool,
    pub metadata: HashMap<String, String>,
    pub available_operation: ManualOperation,
    pub config: serde_json::Value,
}

impl PipelineStage {
    /// Plain descriptor for a requested stage
    pub fn from_request(request: &StageRequest) -> Self {
        Self {
            index: request.index,
            name: request.name.clone(),
            rollback: false,
            metadata: HashMap::new(),
            available_operation: ManualOperation::None,
            config: request.config.clone(),
        }
    }

    pub fn into_stage(self, id: String) -> Stage {
        let mut stage = Stage::new(id, self.index, self.name)
            .with_rollback(self.rollback)
            .with_config(self.config);
        stage.metadata = self.metadata;
        stage.available_operation = self.available_operation;
        stage
    }
}

/// A provider of stage types
#[async_trait]
pub trait StagePlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stage names this plugin can execute
    fn fetch_defined_stages(&self) -> Vec<&'static str>;

    /// Expand requested stages into concrete, indexed descriptors
    fn build_pipeline_sync_stages(
        &self,
        request: &BuildStagesRequest,
    ) -> Result<Vec<PipelineStage>, PluginError>;

    /// Execute one stage. Cancellation must surface as CANCELLED, not FAILURE.
    async fn execute_stage(&self, input: &ExecutorInput, sig: &StopSignal) -> StageStatus;
}

/// Read a duration option, given either as a humantime string ("30s") or
/// as whole seconds. Durations above [`MAX_STAGE_TIMEOUT`] are rejected.
pub fn duration_option(
    stage_name: &str,
    config: &serde_json::Value,
    option: &'static str,
) -> Result<Option<Duration>, PluginError> {
    let invalid = |message: String| PluginError::InvalidOption {
        stage: stage_name.to_string(),
        option,
        message,
    };
    let duration = match config.get(option) {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) => {
            humantime::parse_duration(s).map_err(|e| invalid(e.to_string()))?
        }
        Some(value) => value
            .as_u64()
            .map(Duration::from_secs)
            .ok_or_else(|| invalid(format!("expected a duration, got {}", value)))?,
    };
    if duration > MAX_STAGE_TIMEOUT {
        return Err(invalid(format!(
            "{}s exceeds the maximum of {}s",
            duration.as_secs(),
            MAX_STAGE_TIMEOUT.as_secs()
        )));
    }
    Ok(Some(duration))
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod tests;
