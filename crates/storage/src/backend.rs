// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL-backed metadata persistence

use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tern_core::{MetadataBackend, MetadataError, MetadataStore, Operation};

/// Logs shorter than this are never compacted on open
const COMPACT_MIN_ENTRIES: usize = 64;

/// Persists metadata writes to a WAL and keeps the replayed state in memory
pub struct WalMetadataBackend {
    path: PathBuf,
    wal: Mutex<Wal>,
    state: Mutex<MaterializedState>,
}

impl WalMetadataBackend {
    /// Open the log at `path`, replaying whatever it already holds.
    ///
    /// The log is compacted when most of its entries no longer contribute
    /// to live state.
    pub fn open(path: &Path) -> Result<Arc<Self>, WalError> {
        let (wal, ops) = Wal::open(path)?;
        let state = MaterializedState::from_operations(&ops);
        let live = state.to_operations().len();
        tracing::info!(
            path = %path.display(),
            operations = ops.len(),
            live,
            deployments = state.deployments.len(),
            "replayed metadata log"
        );
        let backend = Arc::new(Self {
            path: path.to_path_buf(),
            wal: Mutex::new(wal),
            state: Mutex::new(state),
        });
        if ops.len() >= COMPACT_MIN_ENTRIES && live * 2 < ops.len() {
            backend.compact()?;
        }
        Ok(backend)
    }

    /// Rewrite the log so it only holds live metadata.
    ///
    /// Returns the number of entries removed.
    pub fn compact(&self) -> Result<usize, WalError> {
        let mut wal = self.wal.lock().unwrap_or_else(|e| e.into_inner());
        let ops = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .to_operations();
        let before = wal.entries();
        wal.rewrite(&self.path, &ops)?;

        let removed = before.saturating_sub(ops.len());
        tracing::info!(
            entries_removed = removed,
            entries_kept = ops.len(),
            sequence = wal.sequence(),
            "metadata log compacted"
        );
        Ok(removed)
    }

    /// Metadata store for one deployment, seeded with its persisted values
    pub fn store_for(self: &Arc<Self>, deployment_id: &str) -> MetadataStore {
        let restored = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .deployment(deployment_id)
            .cloned()
            .unwrap_or_default();
        let backend: Arc<dyn MetadataBackend> = Arc::clone(self) as Arc<dyn MetadataBackend>;
        MetadataStore::with_backend(deployment_id, restored, backend)
    }

    /// Drop all metadata of a finished deployment
    pub fn archive(&self, deployment_id: &str) -> Result<(), WalError> {
        self.write(&Operation::DeploymentArchive {
            deployment_id: deployment_id.to_string(),
        })
    }

    /// Ids of deployments that still hold metadata
    pub fn deployment_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = state.deployments.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn write(&self, op: &Operation) -> Result<(), WalError> {
        // Held until the state is updated so compaction never misses a write
        let mut wal = self.wal.lock().unwrap_or_else(|e| e.into_inner());
        let seq = wal.append(op)?;
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .apply(op);
        tracing::trace!(seq, op = op.name(), deployment_id = op.deployment_id(), "persisted");
        Ok(())
    }
}

impl MetadataBackend for WalMetadataBackend {
    fn persist(&self, op: &Operation) -> Result<(), MetadataError> {
        self.write(op).map_err(|e| MetadataError::Persist {
            deployment_id: op.deployment_id().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
