// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline controller
//!
//! Drives one deployment: runs its regular stages strictly in order, applies
//! the stage-status decision rule after every stage and, when the deployment
//! fails or is cancelled with rollback, runs the rollback stages once.

use crate::error::ControllerError;
use crate::executor::ExecutorInput;
use crate::plugin::duration_option;
use crate::registry::PluginRegistry;
use crate::source::DeploySourceProvider;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tern_adapters::LogSink;
use tern_core::{
    determine_stage_status, AgentConfig, Deployment, DeploymentStatus, MetadataStore, StageStatus,
    StopHandle, StopReason, StopSignal,
};
use tokio::task::JoinHandle;
use tracing::Instrument;

/// What an operator asked the controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Stop the current stage and the deployment
    Cancel,
    /// Stop the current stage, then run the rollback stages
    CancelWithRollback,
    /// Agent shutdown; leave stages resumable
    Terminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Forward,
    Rollback,
    Done,
}

#[derive(Default)]
struct ControlState {
    phase: Phase,
    requested: Option<ControlRequest>,
    current: Option<StopHandle>,
}

/// Handle for stopping a running deployment
#[derive(Clone, Default)]
pub struct ControlHandle {
    state: Arc<Mutex<ControlState>>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the deployment without rolling back. During rollback this
    /// aborts the rollback.
    pub fn cancel(&self) -> bool {
        self.request(ControlRequest::Cancel)
    }

    /// Cancel the deployment and roll it back
    pub fn cancel_with_rollback(&self) -> bool {
        self.request(ControlRequest::CancelWithRollback)
    }

    /// Stop for agent shutdown
    pub fn terminate(&self) -> bool {
        self.request(ControlRequest::Terminate)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request(&self, request: ControlRequest) -> bool {
        let mut state = self.lock();
        let allowed = match (state.phase, request) {
            (Phase::Done, _) => false,
            (Phase::Rollback, ControlRequest::CancelWithRollback) => false,
            _ => state.requested.is_none(),
        };
        if !allowed {
            return false;
        }
        state.requested = Some(request);
        if let Some(handle) = &state.current {
            match request {
                ControlRequest::Terminate => handle.terminate(),
                ControlRequest::Cancel | ControlRequest::CancelWithRollback => handle.cancel(),
            };
        }
        true
    }

    fn requested(&self) -> Option<ControlRequest> {
        self.lock().requested
    }

    /// Install the stop handle of the next stage, unless a request is pending
    fn begin_stage(&self, handle: StopHandle) -> Result<(), ControlRequest> {
        let mut state = self.lock();
        if let Some(request) = state.requested {
            return Err(request);
        }
        state.current = Some(handle);
        Ok(())
    }

    fn end_stage(&self) {
        self.lock().current = None;
    }

    fn begin_rollback(&self) {
        let mut state = self.lock();
        state.phase = Phase::Rollback;
        state.requested = None;
    }

    fn finish(&self) {
        let mut state = self.lock();
        state.phase = Phase::Done;
        state.current = None;
    }
}

/// Inputs of one deployment run
pub struct DeploymentJob {
    pub deployment: Deployment,
    pub metadata: MetadataStore,
    pub running_source: Option<Arc<dyn DeploySourceProvider>>,
    pub target_source: Arc<dyn DeploySourceProvider>,
}

/// A deployment running on its own task
pub struct DeploymentRun {
    deployment_id: String,
    control: ControlHandle,
    task: JoinHandle<Deployment>,
}

impl DeploymentRun {
    pub fn control(&self) -> &ControlHandle {
        &self.control
    }

    /// Wait for the deployment to stop and return its final record
    pub async fn wait(self) -> Result<Deployment, ControllerError> {
        self.task.await.map_err(|e| ControllerError::Join {
            deployment_id: self.deployment_id,
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    Finished(StageStatus),
    Terminated,
    NotRun(ControlRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseOutcome {
    Completed,
    Failed,
    Cancelled,
    Terminated,
}

/// Runs deployments against the registered stage plugins
#[derive(Clone)]
pub struct Controller {
    plugins: Arc<PluginRegistry>,
    agent: Arc<AgentConfig>,
    logs: Arc<dyn LogSink>,
}

impl Controller {
    pub fn new(plugins: Arc<PluginRegistry>, agent: Arc<AgentConfig>, logs: Arc<dyn LogSink>) -> Self {
        Self {
            plugins,
            agent,
            logs,
        }
    }

    /// Run a deployment on its own task
    pub fn spawn(&self, job: DeploymentJob) -> Result<DeploymentRun, ControllerError> {
        if job.deployment.status.is_terminal() {
            return Err(ControllerError::AlreadyFinished(job.deployment.id));
        }
        let control = ControlHandle::new();
        let deployment_id = job.deployment.id.clone();
        let this = self.clone();
        let task_control = control.clone();
        let task = tokio::spawn(async move { this.drive(job, task_control).await });
        Ok(DeploymentRun {
            deployment_id,
            control,
            task,
        })
    }

    /// Run a deployment to completion on the current task
    pub async fn run(
        &self,
        job: DeploymentJob,
        control: ControlHandle,
    ) -> Result<Deployment, ControllerError> {
        if job.deployment.status.is_terminal() {
            return Err(ControllerError::AlreadyFinished(job.deployment.id));
        }
        Ok(self.drive(job, control).await)
    }

    async fn drive(&self, job: DeploymentJob, control: ControlHandle) -> Deployment {
        let DeploymentJob {
            mut deployment,
            metadata,
            running_source,
            target_source,
        } = job;
        let run = StageRunner {
            controller: self,
            metadata,
            running_source,
            target_source,
            control: &control,
        };

        let span = tracing::info_span!("deployment", id = %deployment.id, app = %deployment.application_name);
        async {
            let resumed_rollback = deployment.status == DeploymentStatus::RollingBack;
            tracing::info!(stages = deployment.stages.len(), resumed_rollback, "deployment started");

            // None when interrupted by shutdown; the deployment stays resumable
            let status = if resumed_rollback {
                run.rollback(&mut deployment)
                    .await
                    .map(|_| DeploymentStatus::Failure)
            } else {
                deployment.status = DeploymentStatus::Running;
                let forward = deployment.forward_stage_ids();
                match run.run_stages(&mut deployment, &forward).await {
                    PhaseOutcome::Completed => Some(DeploymentStatus::Success),
                    PhaseOutcome::Terminated => None,
                    PhaseOutcome::Failed if self.agent.pipeline.auto_rollback => run
                        .rollback(&mut deployment)
                        .await
                        .map(|_| DeploymentStatus::Failure),
                    PhaseOutcome::Failed => Some(DeploymentStatus::Failure),
                    PhaseOutcome::Cancelled
                        if control.requested() == Some(ControlRequest::CancelWithRollback) =>
                    {
                        run.rollback(&mut deployment).await.map(|ok| {
                            if ok {
                                DeploymentStatus::Cancelled
                            } else {
                                DeploymentStatus::Failure
                            }
                        })
                    }
                    PhaseOutcome::Cancelled => Some(DeploymentStatus::Cancelled),
                }
            };

            control.finish();
            let Some(status) = status else {
                tracing::info!("deployment interrupted by shutdown");
                return deployment;
            };
            deployment.status = status;
            tracing::info!(%status, "deployment finished");
            deployment
        }
        .instrument(span)
        .await
    }
}

/// Per-deployment state shared by every stage execution
struct StageRunner<'a> {
    controller: &'a Controller,
    metadata: MetadataStore,
    running_source: Option<Arc<dyn DeploySourceProvider>>,
    target_source: Arc<dyn DeploySourceProvider>,
    control: &'a ControlHandle,
}

impl StageRunner<'_> {
    /// Run stages in order, skipping those that already succeeded
    async fn run_stages(&self, deployment: &mut Deployment, ids: &[String]) -> PhaseOutcome {
        for id in ids {
            let already_done = deployment
                .stage(id)
                .map_or(true, |s| s.status == StageStatus::Success);
            if already_done {
                tracing::debug!(stage_id = %id, "skipping completed stage");
                continue;
            }

            match self.run_stage(deployment, id).await {
                StageOutcome::Finished(StageStatus::Success) => {}
                StageOutcome::Finished(StageStatus::Cancelled) => return PhaseOutcome::Cancelled,
                StageOutcome::Finished(_) => return PhaseOutcome::Failed,
                StageOutcome::Terminated | StageOutcome::NotRun(ControlRequest::Terminate) => {
                    return PhaseOutcome::Terminated
                }
                StageOutcome::NotRun(_) => return PhaseOutcome::Cancelled,
            }
        }
        PhaseOutcome::Completed
    }

    /// Run the rollback stages. Returns whether they all succeeded, or None
    /// when interrupted by shutdown.
    async fn rollback(&self, deployment: &mut Deployment) -> Option<bool> {
        let ids = deployment.rollback_stage_ids();
        if ids.is_empty() || !deployment.has_started() {
            tracing::info!("nothing to roll back");
            return Some(true);
        }

        self.control.begin_rollback();
        deployment.status = DeploymentStatus::RollingBack;
        tracing::info!(stages = ids.len(), "rolling back");
        match self.run_stages(deployment, &ids).await {
            PhaseOutcome::Completed => Some(true),
            PhaseOutcome::Terminated => None,
            PhaseOutcome::Failed | PhaseOutcome::Cancelled => {
                tracing::error!("rollback did not complete; operator intervention required");
                Some(false)
            }
        }
    }

    async fn run_stage(&self, deployment: &mut Deployment, stage_id: &str) -> StageOutcome {
        let Some(stage) = deployment.stage(stage_id).cloned() else {
            return StageOutcome::Finished(StageStatus::Failure);
        };
        let controller = self.controller;
        let original = stage.status;

        let timeout = match duration_option(&stage.name, &stage.config, "timeout") {
            Ok(Some(timeout)) => timeout,
            Ok(None) => controller.agent.pipeline.stage_timeout,
            Err(e) => {
                tracing::warn!(stage = %stage.name, error = %e, "using default stage timeout");
                controller.agent.pipeline.stage_timeout
            }
        };
        let (sig, handle) = StopSignal::with_timeout(timeout);
        if let Err(request) = self.control.begin_stage(handle) {
            return StageOutcome::NotRun(request);
        }

        deployment.current_stage_id = Some(stage.id.clone());
        if let Some(s) = deployment.stage_mut(stage_id) {
            s.status = StageStatus::Running;
        }

        let log = controller.logs.stage_log(&deployment.id, &stage.id);
        let span = tracing::info_span!("stage", id = %stage.id, name = %stage.name, index = stage.index);
        let (status, reason) = match controller.plugins.plugin_for(&stage.name) {
            None => {
                log.error(&format!("No plugin supports stage {}", stage.name));
                (StageStatus::Failure, sig.consume())
            }
            Some(plugin) => {
                let mut input = ExecutorInput::new(
                    deployment.clone(),
                    stage,
                    self.metadata.clone(),
                    Arc::clone(&self.target_source),
                    Arc::clone(&controller.agent),
                )
                .with_log(log);
                input.running_source = self.running_source.clone();

                let start = Instant::now();
                let got = plugin
                    .execute_stage(&input, &sig)
                    .instrument(span.clone())
                    .await;
                let reason = sig.consume();
                let status = determine_stage_status(reason, original, got);
                span.in_scope(|| {
                    tracing::info!(
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        %got,
                        %reason,
                        %status,
                        "stage finished"
                    )
                });
                (status, reason)
            }
        };
        self.control.end_stage();

        if let Some(s) = deployment.stage_mut(stage_id) {
            s.status = status;
        }
        if reason == StopReason::Terminate {
            StageOutcome::Terminated
        } else {
            StageOutcome::Finished(status)
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
