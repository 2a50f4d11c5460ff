// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations for the write-ahead log

use crate::metadata::MetadataScope;
use serde::{Deserialize, Serialize};

/// Operations that can be persisted to the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Write one metadata key for a deployment
    MetadataSet {
        deployment_id: String,
        scope: MetadataScope,
        key: String,
        value: String,
    },

    /// Drop all metadata of a deployment that reached a terminal status
    DeploymentArchive { deployment_id: String },
}

impl Operation {
    /// Short name for structured logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::MetadataSet { .. } => "metadata:set",
            Self::DeploymentArchive { .. } => "deployment:archive",
        }
    }

    pub fn deployment_id(&self) -> &str {
        match self {
            Self::MetadataSet { deployment_id, .. } | Self::DeploymentArchive { deployment_id } => {
                deployment_id
            }
        }
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
