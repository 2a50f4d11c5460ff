// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-op log sink

use super::{LogPersister, LogSeverity, LogSink};
use std::sync::Arc;

/// Discards every line
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogPersister;

impl LogPersister for NoOpLogPersister {
    fn append(&self, _severity: LogSeverity, _message: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogSink;

impl LogSink for NoOpLogSink {
    fn stage_log(&self, _deployment_id: &str, _stage_id: &str) -> Arc<dyn LogPersister> {
        Arc::new(NoOpLogPersister)
    }
}
