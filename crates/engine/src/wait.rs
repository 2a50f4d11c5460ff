// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAIT stage plugin
//!
//! Waits for the stage's `duration` option. The start time is kept in the
//! stage metadata so a resumed execution only waits for the remainder.

use crate::executor::ExecutorInput;
use crate::plugin::{duration_option, BuildStagesRequest, PipelineStage, PluginError, StagePlugin};
use async_trait::async_trait;
use humantime::format_duration;
use std::time::Duration;
use tern_core::{Clock, StageStatus, StopSignal, Stopped, SystemClock};

pub const STAGE_WAIT: &str = "WAIT";

const START_TIME_KEY: &str = "startTime";

pub struct WaitPlugin<C: Clock = SystemClock> {
    clock: C,
}

impl WaitPlugin<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl Default for WaitPlugin<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> WaitPlugin<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    /// Start of the wait, recorded on first execution
    fn start_time(&self, input: &ExecutorInput) -> u64 {
        let metadata = input.stage_metadata();
        if let Some(start) = metadata.get(START_TIME_KEY).and_then(|v| v.parse().ok()) {
            return start;
        }
        let now = self.clock.unix_seconds();
        if let Err(e) = metadata.set(START_TIME_KEY, &now.to_string()) {
            // Still wait; only a resume would wait the full duration again
            input
                .log
                .error(&format!("Failed to store wait start time: {}", e));
        }
        now
    }
}

#[async_trait]
impl<C: Clock + 'static> StagePlugin for WaitPlugin<C> {
    fn name(&self) -> &'static str {
        "wait"
    }

    fn fetch_defined_stages(&self) -> Vec<&'static str> {
        vec![STAGE_WAIT]
    }

    fn build_pipeline_sync_stages(
        &self,
        request: &BuildStagesRequest,
    ) -> Result<Vec<PipelineStage>, PluginError> {
        request
            .stages
            .iter()
            .map(|requested| {
                if requested.name != STAGE_WAIT {
                    return Err(PluginError::UnsupportedStage(requested.name.clone()));
                }
                // Reject bad durations before the pipeline starts
                duration_option(&requested.name, &requested.config, "duration")?;
                Ok(PipelineStage::from_request(requested))
            })
            .collect()
    }

    async fn execute_stage(&self, input: &ExecutorInput, sig: &StopSignal) -> StageStatus {
        let log = input.log.as_ref();
        let duration = match duration_option(&input.stage.name, &input.stage.config, "duration") {
            Ok(duration) => duration.unwrap_or(Duration::ZERO),
            Err(e) => {
                log.error(&format!("{}; not waiting", e));
                Duration::ZERO
            }
        };

        let started = self.start_time(input);
        let elapsed = Duration::from_secs(self.clock.unix_seconds().saturating_sub(started));
        let remaining = duration.saturating_sub(elapsed);
        if elapsed.is_zero() {
            log.info(&format!("Waiting for {}...", format_duration(duration)));
        } else {
            log.info(&format!(
                "Resuming wait for {}, {} remaining",
                format_duration(duration),
                format_duration(remaining)
            ));
        }

        match sig.context().run(tokio::time::sleep(remaining)).await {
            Ok(()) => {
                log.success(&format!("Waited for {}", format_duration(duration)));
                StageStatus::Success
            }
            Err(Stopped(reason)) => {
                log.info(&format!("Wait stopped ({})", reason));
                StageStatus::Cancelled
            }
        }
    }
}

#[cfg(test)]
#[path = "wait_tests.rs"]
mod tests;
