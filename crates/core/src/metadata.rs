// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-deployment metadata store
//!
//! Two partitions: one map per stage and one map shared by every stage of
//! the deployment. Writes are last-writer-wins and there is no delete.
//! When a backend is attached, a write is persisted before it becomes
//! visible, so later stages can read it even after an agent restart.

use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Which partition a key lives in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataScope {
    Shared,
    Stage(String),
}

impl fmt::Display for MetadataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => f.write_str("shared"),
            Self::Stage(id) => write!(f, "stage:{}", id),
        }
    }
}

/// Errors from metadata writes
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to persist metadata for deployment {deployment_id}: {message}")]
    Persist {
        deployment_id: String,
        message: String,
    },
}

/// Durable sink for metadata writes
pub trait MetadataBackend: Send + Sync {
    fn persist(&self, op: &Operation) -> Result<(), MetadataError>;
}

/// Plain metadata values of one deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentMetadata {
    pub shared: HashMap<String, String>,
    pub stages: HashMap<String, HashMap<String, String>>,
}

impl DeploymentMetadata {
    pub fn get(&self, scope: &MetadataScope, key: &str) -> Option<&String> {
        match scope {
            MetadataScope::Shared => self.shared.get(key),
            MetadataScope::Stage(id) => self.stages.get(id).and_then(|m| m.get(key)),
        }
    }

    pub fn set(&mut self, scope: &MetadataScope, key: String, value: String) {
        let partition = match scope {
            MetadataScope::Shared => &mut self.shared,
            MetadataScope::Stage(id) => self.stages.entry(id.clone()).or_default(),
        };
        partition.insert(key, value);
    }
}

/// Metadata store of one deployment, passed by reference into every stage
#[derive(Clone)]
pub struct MetadataStore {
    deployment_id: String,
    data: Arc<Mutex<DeploymentMetadata>>,
    backend: Option<Arc<dyn MetadataBackend>>,
}

impl MetadataStore {
    /// Store that only lives as long as the process
    pub fn in_memory(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            data: Arc::new(Mutex::new(DeploymentMetadata::default())),
            backend: None,
        }
    }

    /// Store seeded with previously persisted values that writes through `backend`
    pub fn with_backend(
        deployment_id: impl Into<String>,
        restored: DeploymentMetadata,
        backend: Arc<dyn MetadataBackend>,
    ) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            data: Arc::new(Mutex::new(restored)),
            backend: Some(backend),
        }
    }

    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// The partition visible to every stage of this deployment
    pub fn shared(&self) -> MetadataView<'_> {
        MetadataView {
            store: self,
            scope: MetadataScope::Shared,
        }
    }

    /// The partition private to one stage
    pub fn stage(&self, stage_id: &str) -> MetadataView<'_> {
        MetadataView {
            store: self,
            scope: MetadataScope::Stage(stage_id.to_string()),
        }
    }

    /// Copy of all values currently held
    pub fn snapshot(&self) -> DeploymentMetadata {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn get(&self, scope: &MetadataScope, key: &str) -> Option<String> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(scope, key)
            .cloned()
    }

    fn set(&self, scope: &MetadataScope, key: &str, value: &str) -> Result<(), MetadataError> {
        // Hold the lock across persistence so the log order matches visibility order
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(backend) = &self.backend {
            backend.persist(&Operation::MetadataSet {
                deployment_id: self.deployment_id.clone(),
                scope: scope.clone(),
                key: key.to_string(),
                value: value.to_string(),
            })?;
        }
        tracing::debug!(deployment_id = %self.deployment_id, %scope, key, "metadata set");
        data.set(scope, key.to_string(), value.to_string());
        Ok(())
    }
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore")
            .field("deployment_id", &self.deployment_id)
            .field("persistent", &self.backend.is_some())
            .finish()
    }
}

/// One partition of a [`MetadataStore`]
pub struct MetadataView<'a> {
    store: &'a MetadataStore,
    scope: MetadataScope,
}

impl MetadataView<'_> {
    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(&self.scope, key)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), MetadataError> {
        self.store.set(&self.scope, key, value)
    }

    pub fn scope(&self) -> &MetadataScope {
        &self.scope
    }
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
