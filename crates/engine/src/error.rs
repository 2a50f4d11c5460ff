// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the pipeline controller

use thiserror::Error;

/// Errors that can occur while driving a deployment
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("deployment {0} already reached a terminal status")]
    AlreadyFinished(String),
    #[error("deployment task for {deployment_id} failed: {message}")]
    Join {
        deployment_id: String,
        message: String,
    },
}
