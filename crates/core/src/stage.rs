// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline stage model and the stage-status decision rule

use crate::stop::StopReason;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Status of a single pipeline stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    #[default]
    NotStarted,
    Running,
    Success,
    Failure,
    Cancelled,
}

impl StageStatus {
    /// Terminal statuses are final and never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Manual operation an operator may invoke on a running stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualOperation {
    #[default]
    None,
    Skip,
    Approve,
}

/// One ordered step of a deployment pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    /// Execution order. Not necessarily contiguous once rollback stages are appended.
    pub index: u32,
    /// Stage name, which selects the plugin that executes it
    pub name: String,
    /// Rollback stages only run when the deployment is being rolled back
    pub rollback: bool,
    pub status: StageStatus,
    pub metadata: HashMap<String, String>,
    pub available_operation: ManualOperation,
    /// Stage options as authored in the application pipeline
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Stage {
    pub fn new(id: impl Into<String>, index: u32, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index,
            name: name.into(),
            rollback: false,
            status: StageStatus::NotStarted,
            metadata: HashMap::new(),
            available_operation: ManualOperation::None,
            config: serde_json::Value::Null,
        }
    }

    pub fn with_rollback(mut self, rollback: bool) -> Self {
        self.rollback = rollback;
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Read a string option from the stage config
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Read an unsigned integer option from the stage config
    pub fn option_u64(&self, key: &str) -> Option<u64> {
        self.config.get(key).and_then(|v| v.as_u64())
    }
}

/// Decide the final status of a stage after its executor returned.
///
/// `reason` is what the stop signal observed when the executor returned,
/// `original` is the status the stage had before this execution and `got`
/// is the executor's raw result.
///
/// A cancel or timeout turns the result into CANCELLED, except that a stage
/// already recorded as SUCCESS before the signal fired keeps SUCCESS. An agent
/// shutdown leaves the stage at its original status so it can be resumed.
pub fn determine_stage_status(
    reason: StopReason,
    original: StageStatus,
    got: StageStatus,
) -> StageStatus {
    match reason {
        StopReason::None => got,
        StopReason::Terminate => original,
        StopReason::Cancelled | StopReason::Timeout => {
            if original == StageStatus::Success {
                StageStatus::Success
            } else {
                StageStatus::Cancelled
            }
        }
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
