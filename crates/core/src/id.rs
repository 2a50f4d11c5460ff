// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage id generation

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh stage ids when a pipeline is built
pub trait IdGen: Send + Sync {
    fn next(&self) -> String;
}

/// Random ids for stages of real deployments
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGen;

impl IdGen for UuidIdGen {
    fn next(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// `<prefix>-1`, `<prefix>-2`, ... in build order
#[derive(Debug)]
pub struct SequentialIdGen {
    prefix: String,
    issued: AtomicU64,
}

impl SequentialIdGen {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            issued: AtomicU64::new(0),
        }
    }
}

impl Default for SequentialIdGen {
    fn default() -> Self {
        Self::new("stage")
    }
}

impl IdGen for SequentialIdGen {
    fn next(&self) -> String {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
