// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deploy sources: the application files as they exist at one commit

use async_trait::async_trait;
use std::collections::BTreeMap;
use tern_core::ApplicationConfig;
use thiserror::Error;

/// Errors obtaining a deploy source or reading from it
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("deploy source for commit {commit} is unavailable: {message}")]
    Unavailable { commit: String, message: String },
    #[error("file {path} does not exist at commit {commit}")]
    MissingFile { commit: String, path: String },
}

/// Application config plus files of one commit, already fetched
#[derive(Debug, Clone, PartialEq)]
pub struct DeploySource {
    pub commit_hash: String,
    pub app_config: ApplicationConfig,
    files: BTreeMap<String, String>,
}

impl DeploySource {
    pub fn new(commit_hash: impl Into<String>, app_config: ApplicationConfig) -> Self {
        Self {
            commit_hash: commit_hash.into(),
            app_config,
            files: BTreeMap::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn read_file(&self, path: &str) -> Result<&str, SourceError> {
        self.files
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| SourceError::MissingFile {
                commit: self.commit_hash.clone(),
                path: path.to_string(),
            })
    }
}

/// Provides the read-only deploy source of one commit
#[async_trait]
pub trait DeploySourceProvider: Send + Sync {
    async fn get(&self) -> Result<DeploySource, SourceError>;
}

/// Provider over a source that was fetched ahead of time
#[derive(Debug, Clone)]
pub struct StaticSourceProvider {
    source: DeploySource,
}

impl StaticSourceProvider {
    pub fn new(source: DeploySource) -> Self {
        Self { source }
    }
}

#[async_trait]
impl DeploySourceProvider for StaticSourceProvider {
    async fn get(&self) -> Result<DeploySource, SourceError> {
        Ok(self.source.clone())
    }
}
