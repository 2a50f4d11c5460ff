// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

use std::collections::HashMap;
use tern_core::{DeploymentMetadata, MetadataScope, Operation};

/// Metadata of every live deployment, built from WAL operations
#[derive(Debug, Default)]
pub struct MaterializedState {
    pub deployments: HashMap<String, DeploymentMetadata>,
}

impl MaterializedState {
    /// Rebuild state from a sequence of operations
    pub fn from_operations<'a>(ops: impl IntoIterator<Item = &'a Operation>) -> Self {
        let mut state = Self::default();
        for op in ops {
            state.apply(op);
        }
        state
    }

    /// Operations that rebuild this state, in a stable order
    pub fn to_operations(&self) -> Vec<Operation> {
        let mut ids: Vec<&String> = self.deployments.keys().collect();
        ids.sort();

        let mut ops = Vec::new();
        for id in ids {
            let metadata = &self.deployments[id];
            let mut push = |scope: MetadataScope, values: &HashMap<String, String>| {
                let mut keys: Vec<&String> = values.keys().collect();
                keys.sort();
                for key in keys {
                    ops.push(Operation::MetadataSet {
                        deployment_id: id.clone(),
                        scope: scope.clone(),
                        key: key.clone(),
                        value: values[key].clone(),
                    });
                }
            };
            push(MetadataScope::Shared, &metadata.shared);
            let mut stages: Vec<&String> = metadata.stages.keys().collect();
            stages.sort();
            for stage in stages {
                push(MetadataScope::Stage(stage.clone()), &metadata.stages[stage]);
            }
        }
        ops
    }

    pub fn deployment(&self, deployment_id: &str) -> Option<&DeploymentMetadata> {
        self.deployments.get(deployment_id)
    }

    /// Apply an operation to update the state
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::MetadataSet {
                deployment_id,
                scope,
                key,
                value,
            } => {
                self.deployments
                    .entry(deployment_id.clone())
                    .or_default()
                    .set(scope, key.clone(), value.clone());
            }

            Operation::DeploymentArchive { deployment_id } => {
                self.deployments.remove(deployment_id);
            }
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
