// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent and application configuration
//!
//! `AgentConfig` is the agent's own TOML file. `ApplicationConfig` is the
//! already-parsed application config of one revision, as handed over by the
//! deploy source.

use crate::ecs::LoadBalancer;
use crate::stop::MAX_STAGE_TIMEOUT;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("platform provider name must not be empty")]
    EmptyProviderName,
    #[error("platform provider {0} is defined more than once")]
    DuplicateProvider(String),
    #[error("platform provider {0} of kind ecs is missing its [ecs] section")]
    MissingEcsConfig(String),
    #[error("pipeline stage_timeout must be greater than zero")]
    ZeroStageTimeout,
    #[error("pipeline stage_timeout {}s exceeds the maximum of {}s", .0.as_secs(), MAX_STAGE_TIMEOUT.as_secs())]
    StageTimeoutTooLong(Duration),
}

/// Kind of infrastructure a platform provider (or application) targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Ecs,
    Kubernetes,
    Lambda,
    CloudRun,
    Terraform,
}

/// Connection settings for an ECS control plane
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcsProviderConfig {
    pub region: String,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
}

/// One configured platform provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProviderConfig {
    pub name: String,
    pub kind: PlatformKind,
    #[serde(default)]
    pub ecs: Option<EcsProviderConfig>,
}

/// Settings that apply to every pipeline this agent runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for a single stage unless the stage overrides it
    #[serde(with = "humantime_serde", default = "default_stage_timeout")]
    pub stage_timeout: Duration,
    /// Run rollback stages automatically when a stage fails
    #[serde(default = "default_true")]
    pub auto_rollback: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            auto_rollback: true,
        }
    }
}

fn default_stage_timeout() -> Duration {
    DEFAULT_STAGE_TIMEOUT
}

fn default_true() -> bool {
    true
}

/// Agent configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub platform_providers: Vec<PlatformProviderConfig>,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AgentConfig {
    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for provider in &self.platform_providers {
            if provider.name.is_empty() {
                return Err(ConfigError::EmptyProviderName);
            }
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::DuplicateProvider(provider.name.clone()));
            }
            if provider.kind == PlatformKind::Ecs && provider.ecs.is_none() {
                return Err(ConfigError::MissingEcsConfig(provider.name.clone()));
            }
        }
        if self.pipeline.stage_timeout.is_zero() {
            return Err(ConfigError::ZeroStageTimeout);
        }
        if self.pipeline.stage_timeout > MAX_STAGE_TIMEOUT {
            return Err(ConfigError::StageTimeoutTooLong(self.pipeline.stage_timeout));
        }
        Ok(())
    }

    pub fn find_platform_provider(&self, name: &str) -> Option<&PlatformProviderConfig> {
        self.platform_providers.iter().find(|p| p.name == name)
    }
}

/// Application config as it existed at one commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationConfig {
    pub name: String,
    pub kind: PlatformKind,
    /// Overrides the deployment's platform provider
    #[serde(default)]
    pub platform_provider: Option<String>,
    #[serde(default)]
    pub ecs: Option<EcsApplicationSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsApplicationSpec {
    pub input: EcsDeploymentInput,
}

/// Where the ECS definitions of an application live in its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsDeploymentInput {
    pub task_definition_file: String,
    pub service_definition_file: String,
    #[serde(default)]
    pub target_groups: Option<EcsTargetGroups>,
}

/// Target groups used by progressive (weighted) routing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcsTargetGroups {
    #[serde(default)]
    pub primary: Option<LoadBalancer>,
    #[serde(default)]
    pub canary: Option<LoadBalancer>,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
