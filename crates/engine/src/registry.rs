// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage plugin registry
//!
//! Maps stage names to the plugin that executes them and expands a
//! requested pipeline into concrete stages.

use crate::plugin::{duration_option, BuildStagesRequest, PipelineStage, PluginError, StagePlugin, StageRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tern_core::{IdGen, Stage};
use thiserror::Error;

/// Errors registering plugins or building stages
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("stage {stage} is already provided by plugin {plugin}")]
    DuplicateStage { stage: String, plugin: &'static str },
    #[error("no plugin supports stage {0}")]
    UnknownStage(String),
    #[error(transparent)]
    InvalidTimeout(PluginError),
    #[error("plugin {plugin} failed to build stages: {source}")]
    Plugin {
        plugin: &'static str,
        #[source]
        source: PluginError,
    },
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn StagePlugin>>,
    by_stage: HashMap<String, usize>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin for every stage it declares
    pub fn register(&mut self, plugin: Arc<dyn StagePlugin>) -> Result<(), RegistryError> {
        let stages = plugin.fetch_defined_stages();
        for stage in &stages {
            if let Some(&existing) = self.by_stage.get(*stage) {
                return Err(RegistryError::DuplicateStage {
                    stage: stage.to_string(),
                    plugin: self.plugins[existing].name(),
                });
            }
        }

        let slot = self.plugins.len();
        for stage in stages {
            self.by_stage.insert(stage.to_string(), slot);
        }
        tracing::debug!(plugin = plugin.name(), "registered stage plugin");
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn StagePlugin>) -> Result<Self, RegistryError> {
        self.register(plugin)?;
        Ok(self)
    }

    pub fn plugin_for(&self, stage_name: &str) -> Option<Arc<dyn StagePlugin>> {
        self.by_stage
            .get(stage_name)
            .map(|&slot| Arc::clone(&self.plugins[slot]))
    }

    /// All stage names with a registered plugin, sorted
    pub fn stage_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_stage.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Expand requested stages into concrete stages with fresh ids.
    ///
    /// Regular stages keep their requested index. Rollback stages added by
    /// plugins are placed after the last regular stage.
    pub fn build_stages(
        &self,
        requests: &[StageRequest],
        rollback: bool,
        id_gen: &impl IdGen,
    ) -> Result<Vec<Stage>, RegistryError> {
        // Group requests per plugin, keeping first-appearance order
        let mut groups: Vec<(usize, Vec<StageRequest>)> = Vec::new();
        for request in requests {
            duration_option(&request.name, &request.config, "timeout")
                .map_err(RegistryError::InvalidTimeout)?;
            let slot = *self
                .by_stage
                .get(&request.name)
                .ok_or_else(|| RegistryError::UnknownStage(request.name.clone()))?;
            match groups.iter_mut().find(|(s, _)| *s == slot) {
                Some((_, group)) => group.push(request.clone()),
                None => groups.push((slot, vec![request.clone()])),
            }
        }

        let mut forward: Vec<PipelineStage> = Vec::new();
        let mut rollback_stages: Vec<PipelineStage> = Vec::new();
        for (slot, stages) in groups {
            let plugin = &self.plugins[slot];
            let built = plugin
                .build_pipeline_sync_stages(&BuildStagesRequest { stages, rollback })
                .map_err(|source| RegistryError::Plugin {
                    plugin: plugin.name(),
                    source,
                })?;
            for stage in built {
                if stage.rollback {
                    rollback_stages.push(stage);
                } else {
                    forward.push(stage);
                }
            }
        }

        forward.sort_by_key(|s| s.index);
        let mut next_index = forward.last().map_or(0, |s| s.index + 1);
        for stage in &mut rollback_stages {
            stage.index = next_index;
            next_index += 1;
        }

        Ok(forward
            .into_iter()
            .chain(rollback_stages)
            .map(|s| s.into_stage(id_gen.next()))
            .collect())
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
