// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage log sink
//!
//! Executors narrate their progress ("rolled back service web to original
//! stage") through a [`LogPersister`] scoped to one stage of one deployment.
//! This is operator-facing text, separate from the agent's own tracing.

mod noop;

pub use noop::{NoOpLogPersister, NoOpLogSink};

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLogPersister, FakeLogSink, LogLine};

use std::fmt;
use std::sync::Arc;

/// Severity of one narration line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSeverity {
    Info,
    Success,
    Error,
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogSeverity::Info => "info",
            LogSeverity::Success => "success",
            LogSeverity::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Receives narration lines for one stage
pub trait LogPersister: Send + Sync {
    fn append(&self, severity: LogSeverity, message: &str);

    fn info(&self, message: &str) {
        self.append(LogSeverity::Info, message);
    }

    fn success(&self, message: &str) {
        self.append(LogSeverity::Success, message);
    }

    fn error(&self, message: &str) {
        self.append(LogSeverity::Error, message);
    }
}

/// Hands out a persister per stage
pub trait LogSink: Send + Sync {
    fn stage_log(&self, deployment_id: &str, stage_id: &str) -> Arc<dyn LogPersister>;
}

/// Forwards narration into `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn stage_log(&self, deployment_id: &str, stage_id: &str) -> Arc<dyn LogPersister> {
        Arc::new(TracingLogPersister {
            deployment_id: deployment_id.to_string(),
            stage_id: stage_id.to_string(),
        })
    }
}

/// Narration for one stage, emitted as `tracing` events
#[derive(Debug, Clone)]
pub struct TracingLogPersister {
    deployment_id: String,
    stage_id: String,
}

impl TracingLogPersister {
    pub fn new(deployment_id: impl Into<String>, stage_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            stage_id: stage_id.into(),
        }
    }
}

impl LogPersister for TracingLogPersister {
    fn append(&self, severity: LogSeverity, message: &str) {
        let deployment = self.deployment_id.as_str();
        let stage = self.stage_id.as_str();
        match severity {
            LogSeverity::Error => tracing::error!(deployment, stage, "{}", message),
            LogSeverity::Success | LogSeverity::Info => {
                tracing::info!(deployment, stage, %severity, "{}", message)
            }
        }
    }
}

impl<P: LogPersister + ?Sized> LogPersister for Arc<P> {
    fn append(&self, severity: LogSeverity, message: &str) {
        (**self).append(severity, message)
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
