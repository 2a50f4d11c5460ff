// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::plugin::StageRequest;
use crate::source::StaticSourceProvider;
use crate::test_helpers::*;
use serde_json::json;
use std::time::Duration;
use tern_adapters::FakeLogSink;
use tern_core::{SequentialIdGen, Stage};
use tracing_subscriber::fmt::MakeWriter;

struct Harness {
    plugin: ScriptedPlugin,
    logs: FakeLogSink,
    controller: Controller,
}

impl Harness {
    fn new() -> Self {
        Self::with_agent(agent_config())
    }

    fn with_agent(agent: AgentConfig) -> Self {
        let plugin = ScriptedPlugin::new();
        let registry = PluginRegistry::new()
            .with_plugin(Arc::new(plugin.clone()))
            .unwrap();
        let logs = FakeLogSink::new();
        let controller = Controller::new(
            Arc::new(registry),
            Arc::new(agent),
            Arc::new(logs.clone()),
        );
        Self {
            plugin,
            logs,
            controller,
        }
    }

    /// Deployment with one STEP stage per config, plus a rollback stage
    fn job(&self, configs: Vec<serde_json::Value>) -> DeploymentJob {
        let requests: Vec<StageRequest> = configs
            .into_iter()
            .enumerate()
            .map(|(i, config)| StageRequest::new(i as u32, STEP).with_config(config))
            .collect();
        let stages = self
            .controller
            .plugins
            .build_stages(&requests, true, &SequentialIdGen::default())
            .unwrap();
        job_for(deployment("abc123").with_stages(stages))
    }
}

fn job_for(deployment: Deployment) -> DeploymentJob {
    DeploymentJob {
        deployment,
        metadata: MetadataStore::in_memory("deploy-1"),
        running_source: Some(Arc::new(StaticSourceProvider::new(source(
            "abc123",
            app_config(None),
        )))),
        target_source: Arc::new(StaticSourceProvider::new(source("def456", app_config(None)))),
    }
}

fn statuses(deployment: &Deployment) -> Vec<StageStatus> {
    deployment.stages.iter().map(|s| s.status).collect()
}

/// Wait until the plugin has started `count` stages
async fn wait_for_stages(plugin: &ScriptedPlugin, count: usize) {
    for _ in 0..400 {
        if plugin.executed().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("stage did not start: {:?}", plugin.executed());
}

#[tokio::test]
async fn runs_all_stages_in_order() {
    let h = Harness::new();

    let done = h
        .controller
        .run(h.job(vec![json!({}), json!({})]), ControlHandle::new())
        .await
        .unwrap();

    assert_eq!(done.status, DeploymentStatus::Success);
    assert_eq!(h.plugin.executed(), vec!["stage-1", "stage-2"]);
    assert_eq!(
        statuses(&done),
        vec![StageStatus::Success, StageStatus::Success, StageStatus::NotStarted]
    );
    assert_eq!(done.current_stage_id.as_deref(), Some("stage-2"));
}

#[tokio::test]
async fn failure_triggers_rollback() {
    let h = Harness::new();

    let done = h
        .controller
        .run(
            h.job(vec![json!({}), json!({"result": "FAILURE"}), json!({})]),
            ControlHandle::new(),
        )
        .await
        .unwrap();

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert_eq!(h.plugin.executed(), vec!["stage-1", "stage-2", "stage-4"]);
    assert_eq!(
        statuses(&done),
        vec![
            StageStatus::Success,
            StageStatus::Failure,
            StageStatus::NotStarted,
            StageStatus::Success
        ]
    );
}

#[tokio::test]
async fn failure_without_auto_rollback_stops() {
    let mut agent = agent_config();
    agent.pipeline.auto_rollback = false;
    let h = Harness::with_agent(agent);

    let done = h
        .controller
        .run(h.job(vec![json!({"result": "FAILURE"})]), ControlHandle::new())
        .await
        .unwrap();

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert_eq!(h.plugin.executed(), vec!["stage-1"]);
    assert_eq!(done.stages[1].status, StageStatus::NotStarted);
}

#[tokio::test]
async fn failed_rollback_is_reported() {
    let h = Harness::new();
    h.plugin.fail_rollback();

    let done = h
        .controller
        .run(h.job(vec![json!({"result": "FAILURE"})]), ControlHandle::new())
        .await
        .unwrap();

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert_eq!(done.stages[1].status, StageStatus::Failure);
}

#[tokio::test]
async fn cancel_stops_current_stage_without_rollback() {
    let h = Harness::new();
    let run = h
        .controller
        .spawn(h.job(vec![json!({"block": true}), json!({})]))
        .unwrap();

    wait_for_stages(&h.plugin, 1).await;
    assert!(run.control().cancel());
    let control = run.control().clone();
    let done = run.wait().await.unwrap();

    assert_eq!(done.status, DeploymentStatus::Cancelled);
    assert_eq!(h.plugin.executed(), vec!["stage-1"]);
    assert_eq!(
        statuses(&done),
        vec![StageStatus::Cancelled, StageStatus::NotStarted, StageStatus::NotStarted]
    );
    // Nothing left to stop
    assert!(!control.cancel());
    assert!(!control.terminate());
}

#[tokio::test]
async fn second_request_is_ignored() {
    let h = Harness::new();
    let run = h
        .controller
        .spawn(h.job(vec![json!({"block": true})]))
        .unwrap();

    wait_for_stages(&h.plugin, 1).await;
    assert!(run.control().cancel());
    assert!(!run.control().cancel_with_rollback());
    let done = run.wait().await.unwrap();

    assert_eq!(done.status, DeploymentStatus::Cancelled);
    assert_eq!(h.plugin.executed(), vec!["stage-1"]);
}

#[tokio::test]
async fn cancel_with_rollback_runs_rollback_stages() {
    let h = Harness::new();
    let run = h
        .controller
        .spawn(h.job(vec![json!({}), json!({"block": true})]))
        .unwrap();

    wait_for_stages(&h.plugin, 2).await;
    assert!(run.control().cancel_with_rollback());
    let done = run.wait().await.unwrap();

    assert_eq!(done.status, DeploymentStatus::Cancelled);
    assert_eq!(h.plugin.executed(), vec!["stage-1", "stage-2", "stage-3"]);
    assert_eq!(
        statuses(&done),
        vec![StageStatus::Success, StageStatus::Cancelled, StageStatus::Success]
    );
}

#[tokio::test]
async fn cancel_with_failed_rollback_ends_in_failure() {
    let h = Harness::new();
    h.plugin.fail_rollback();
    let run = h
        .controller
        .spawn(h.job(vec![json!({"block": true})]))
        .unwrap();

    wait_for_stages(&h.plugin, 1).await;
    assert!(run.control().cancel_with_rollback());
    let done = run.wait().await.unwrap();

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert_eq!(done.stages[1].status, StageStatus::Failure);
}

#[tokio::test]
async fn terminate_leaves_deployment_resumable() {
    let h = Harness::new();
    let run = h
        .controller
        .spawn(h.job(vec![json!({}), json!({"block": true}), json!({})]))
        .unwrap();

    wait_for_stages(&h.plugin, 2).await;
    let control = run.control().clone();
    assert!(control.terminate());
    let mut interrupted = run.wait().await.unwrap();

    // The interrupted run accepts no further requests
    assert!(!control.cancel());
    assert!(!control.cancel_with_rollback());

    assert_eq!(interrupted.status, DeploymentStatus::Running);
    assert_eq!(
        statuses(&interrupted),
        vec![
            StageStatus::Success,
            StageStatus::NotStarted,
            StageStatus::NotStarted,
            StageStatus::NotStarted
        ]
    );

    // Resume after restart; the blocking stage now completes
    interrupted.stage_mut("stage-2").unwrap().config = json!({});
    let done = h
        .controller
        .run(job_for(interrupted), ControlHandle::new())
        .await
        .unwrap();

    assert_eq!(done.status, DeploymentStatus::Success);
    assert_eq!(
        h.plugin.executed(),
        vec!["stage-1", "stage-2", "stage-2", "stage-3"]
    );
}

#[tokio::test]
async fn stage_timeout_cancels_deployment() {
    let h = Harness::new();

    let done = tokio::time::timeout(
        Duration::from_secs(5),
        h.controller.run(
            h.job(vec![json!({"block": true, "timeout": "20ms"}), json!({})]),
            ControlHandle::new(),
        ),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(done.status, DeploymentStatus::Cancelled);
    assert_eq!(h.plugin.executed(), vec!["stage-1"]);
    assert_eq!(done.stages[0].status, StageStatus::Cancelled);
}

#[tokio::test]
async fn out_of_range_stage_timeout_falls_back_to_default() {
    let h = Harness::new();
    let deployment = deployment("abc123").with_stages(vec![
        Stage::new("stage-1", 0, STEP).with_config(json!({"timeout": u64::MAX})),
    ]);

    let done = h
        .controller
        .spawn(job_for(deployment))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(done.status, DeploymentStatus::Success);
    assert_eq!(done.stages[0].status, StageStatus::Success);
}

#[tokio::test]
async fn oversized_default_timeout_does_not_abort_the_run() {
    let mut agent = agent_config();
    agent.pipeline.stage_timeout = Duration::MAX;
    let h = Harness::with_agent(agent);

    let done = h
        .controller
        .spawn(h.job(vec![json!({})]))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(done.status, DeploymentStatus::Success);
}

#[tokio::test]
async fn stage_without_plugin_fails() {
    let h = Harness::new();
    let deployment =
        deployment("abc123").with_stages(vec![Stage::new("stage-1", 0, "K8S_SYNC")]);

    let done = h
        .controller
        .run(job_for(deployment), ControlHandle::new())
        .await
        .unwrap();

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert!(h.logs.contains("No plugin supports stage K8S_SYNC"));
}

#[tokio::test]
async fn resumed_rollback_runs_only_rollback_stages() {
    let h = Harness::new();
    let mut job = h.job(vec![json!({}), json!({})]);
    job.deployment.status = DeploymentStatus::RollingBack;
    job.deployment.stages[0].status = StageStatus::Success;
    job.deployment.stages[1].status = StageStatus::Failure;

    let done = h.controller.run(job, ControlHandle::new()).await.unwrap();

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert_eq!(h.plugin.executed(), vec!["stage-3"]);
}

#[tokio::test]
async fn nothing_to_roll_back_when_no_stage_started() {
    let h = Harness::new();
    let control = ControlHandle::new();
    assert!(control.cancel_with_rollback());

    let done = h
        .controller
        .run(h.job(vec![json!({}), json!({})]), control)
        .await
        .unwrap();

    assert_eq!(done.status, DeploymentStatus::Cancelled);
    assert!(h.plugin.executed().is_empty());
}

#[tokio::test]
async fn finished_deployment_is_rejected() {
    let h = Harness::new();
    let mut job = h.job(vec![json!({})]);
    job.deployment.status = DeploymentStatus::Success;

    let err = h.controller.run(job, ControlHandle::new()).await.unwrap_err();
    assert!(matches!(err, ControllerError::AlreadyFinished(id) if id == "deploy-1"));
}

#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.logs.lock().unwrap()).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn stage_lifecycle_is_traced() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let h = Harness::new();
    h.controller
        .run(h.job(vec![json!({"result": "FAILURE"})]), ControlHandle::new())
        .await
        .unwrap();

    let output = logs.contents();
    assert!(output.contains("deployment started"), "{}", output);
    assert!(output.contains("stage finished"), "{}", output);
    assert!(output.contains("elapsed_ms"), "{}", output);
    assert!(output.contains("status=FAILURE"), "{}", output);
    assert!(output.contains("rolling back"), "{}", output);
    assert!(output.contains("deployment finished"), "{}", output);
}
