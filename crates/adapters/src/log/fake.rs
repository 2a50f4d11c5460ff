// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake log sink for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{LogPersister, LogSeverity, LogSink};
use std::sync::{Arc, Mutex};

/// Recorded narration line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub deployment_id: String,
    pub stage_id: String,
    pub severity: LogSeverity,
    pub message: String,
}

/// Fake sink; every persister it hands out records into the same buffer
#[derive(Clone, Default)]
pub struct FakeLogSink {
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl FakeLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded lines, across stages
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Messages recorded for one stage
    pub fn messages(&self, stage_id: &str) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|l| l.stage_id == stage_id)
            .map(|l| l.message)
            .collect()
    }

    /// Whether any recorded message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.message.contains(needle))
    }

    pub fn persister(&self, deployment_id: &str, stage_id: &str) -> FakeLogPersister {
        FakeLogPersister {
            deployment_id: deployment_id.to_string(),
            stage_id: stage_id.to_string(),
            lines: Arc::clone(&self.lines),
        }
    }
}

impl LogSink for FakeLogSink {
    fn stage_log(&self, deployment_id: &str, stage_id: &str) -> Arc<dyn LogPersister> {
        Arc::new(self.persister(deployment_id, stage_id))
    }
}

/// Fake persister for one stage
#[derive(Clone)]
pub struct FakeLogPersister {
    deployment_id: String,
    stage_id: String,
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl FakeLogPersister {
    /// Standalone persister not attached to a sink
    pub fn new(stage_id: &str) -> Self {
        FakeLogSink::new().persister("", stage_id)
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.lines().into_iter().map(|l| l.message).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.message.contains(needle))
    }
}

impl LogPersister for FakeLogPersister {
    fn append(&self, severity: LogSeverity, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(LogLine {
                deployment_id: self.deployment_id.clone(),
                stage_id: self.stage_id.clone(),
                severity,
                message: message.to_string(),
            });
    }
}
