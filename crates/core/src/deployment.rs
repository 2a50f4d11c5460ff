// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment record driven by the pipeline controller

use crate::stage::{Stage, StageStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deployment-level status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    #[default]
    Pending,
    Running,
    RollingBack,
    Success,
    Failure,
    Cancelled,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::RollingBack => "ROLLING_BACK",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One request to move an application from its running revision to a target revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub application_id: String,
    pub application_name: String,
    /// Platform provider the application deploys to
    pub platform_provider: String,
    /// Commit currently running. Empty for the first deployment of an application.
    pub running_commit_hash: String,
    pub target_commit_hash: String,
    pub stages: Vec<Stage>,
    pub status: DeploymentStatus,
    /// Id of the stage currently (or last) executed
    pub current_stage_id: Option<String>,
}

impl Deployment {
    pub fn new(
        id: impl Into<String>,
        application_id: impl Into<String>,
        platform_provider: impl Into<String>,
    ) -> Self {
        let application_id = application_id.into();
        Self {
            id: id.into(),
            application_name: application_id.clone(),
            application_id,
            platform_provider: platform_provider.into(),
            running_commit_hash: String::new(),
            target_commit_hash: String::new(),
            stages: Vec::new(),
            status: DeploymentStatus::Pending,
            current_stage_id: None,
        }
    }

    pub fn with_commits(mut self, running: impl Into<String>, target: impl Into<String>) -> Self {
        self.running_commit_hash = running.into();
        self.target_commit_hash = target.into();
        self
    }

    pub fn with_stages(mut self, mut stages: Vec<Stage>) -> Self {
        stages.sort_by_key(|s| s.index);
        self.stages = stages;
        self
    }

    /// A rollback needs a previously running commit to return to
    pub fn has_running_commit(&self) -> bool {
        !self.running_commit_hash.is_empty()
    }

    pub fn stage(&self, id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn stage_mut(&mut self, id: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id == id)
    }

    /// Ids of regular stages in execution order
    pub fn forward_stage_ids(&self) -> Vec<String> {
        self.ordered_ids(false)
    }

    /// Ids of rollback stages in execution order
    pub fn rollback_stage_ids(&self) -> Vec<String> {
        self.ordered_ids(true)
    }

    fn ordered_ids(&self, rollback: bool) -> Vec<String> {
        let mut stages: Vec<&Stage> = self.stages.iter().filter(|s| s.rollback == rollback).collect();
        stages.sort_by_key(|s| s.index);
        stages.into_iter().map(|s| s.id.clone()).collect()
    }

    /// Whether any regular stage got past NOT_STARTED
    pub fn has_started(&self) -> bool {
        self.stages
            .iter()
            .any(|s| !s.rollback && s.status != StageStatus::NotStarted)
    }
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod tests;
