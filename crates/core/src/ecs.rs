// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ECS resource descriptors
//!
//! These are value objects passed between platform calls. Beyond the
//! identifiers the engine needs, their contents are carried opaquely.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors parsing definition files from a deploy source
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("invalid definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("definition is missing required field {0}")]
    MissingField(&'static str),
}

/// Immutable task definition revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_definition_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskDefinition {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            task_definition_arn: None,
            revision: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn from_json(data: &str) -> Result<Self, DefinitionError> {
        let def: Self = serde_json::from_str(data)?;
        if def.family.is_empty() {
            return Err(DefinitionError::MissingField("family"));
        }
        Ok(def)
    }
}

/// Desired configuration of an ECS service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub service_name: String,
    pub cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_count: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServiceDefinition {
    pub fn new(cluster: impl Into<String>, service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            cluster: cluster.into(),
            service_arn: None,
            desired_count: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn from_json(data: &str) -> Result<Self, DefinitionError> {
        let def: Self = serde_json::from_str(data)?;
        if def.service_name.is_empty() {
            return Err(DefinitionError::MissingField("serviceName"));
        }
        if def.cluster.is_empty() {
            return Err(DefinitionError::MissingField("cluster"));
        }
        Ok(def)
    }
}

/// Load balancer binding of a variant (a target group)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    pub target_group_arn: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub container_port: u16,
}

impl LoadBalancer {
    pub fn new(target_group_arn: impl Into<String>) -> Self {
        Self {
            target_group_arn: target_group_arn.into(),
            container_name: String::new(),
            container_port: 0,
        }
    }
}

/// Role of a task set within its service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskSetStatus {
    /// Serving production traffic. At most one per service.
    Primary,
    Active,
    Draining,
}

impl fmt::Display for TaskSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Primary => "PRIMARY",
            Self::Active => "ACTIVE",
            Self::Draining => "DRAINING",
        };
        f.write_str(s)
    }
}

/// Group of running tasks bound to one task definition revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSet {
    pub task_set_arn: String,
    pub cluster: String,
    pub service_name: String,
    pub task_definition_arn: String,
    pub status: TaskSetStatus,
    /// Percentage of the service's desired count
    pub scale: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,
}

#[cfg(test)]
#[path = "ecs_tests.rs"]
mod tests;
