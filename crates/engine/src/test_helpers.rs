// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests

use crate::executor::ExecutorInput;
use crate::plugin::{BuildStagesRequest, PipelineStage, PluginError, StagePlugin, StageRequest};
use crate::source::{DeploySource, StaticSourceProvider};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tern_adapters::{ClientRegistry, FakeLogSink, FakePlatformClient, LogSink};
use tern_core::{
    AgentConfig, ApplicationConfig, Deployment, EcsApplicationSpec, EcsDeploymentInput,
    EcsTargetGroups, LoadBalancer, MetadataStore, PlatformKind, ServiceDefinition, Stage,
    StageStatus, StopSignal, TaskSet, TaskSetStatus,
};

pub const PROVIDER: &str = "ecs-prod";
pub const PRIMARY_TG: &str = "arn:aws:elasticloadbalancing:tg/primary";
pub const CANARY_TG: &str = "arn:aws:elasticloadbalancing:tg/canary";
pub const OLD_TASK_SET: &str = "arn:aws:ecs:fake:task-set/prod/web/ts-old";

const TASK_DEF_FILE: &str = "taskdef.json";
const SERVICE_DEF_FILE: &str = "servicedef.json";

const AGENT_TOML: &str = r#"
[[platform_providers]]
name = "ecs-prod"
kind = "ecs"

[platform_providers.ecs]
region = "eu-west-1"

[[platform_providers]]
name = "k8s"
kind = "kubernetes"
"#;

pub fn agent_config() -> AgentConfig {
    AgentConfig::from_toml(AGENT_TOML).unwrap()
}

pub fn target_groups(primary: bool, canary: bool) -> Option<EcsTargetGroups> {
    Some(EcsTargetGroups {
        primary: primary.then(|| LoadBalancer::new(PRIMARY_TG)),
        canary: canary.then(|| LoadBalancer::new(CANARY_TG)),
    })
}

pub fn app_config(target_groups: Option<EcsTargetGroups>) -> ApplicationConfig {
    ApplicationConfig {
        name: "web".to_string(),
        kind: PlatformKind::Ecs,
        platform_provider: None,
        ecs: Some(EcsApplicationSpec {
            input: EcsDeploymentInput {
                task_definition_file: TASK_DEF_FILE.to_string(),
                service_definition_file: SERVICE_DEF_FILE.to_string(),
                target_groups,
            },
        }),
    }
}

/// Source with a task and service definition for the `web` service
pub fn source(commit: &str, app: ApplicationConfig) -> DeploySource {
    DeploySource::new(commit, app)
        .with_file(
            TASK_DEF_FILE,
            format!(
                r#"{{"family":"web","containerDefinitions":[{{"name":"web","image":"web:{}"}}]}}"#,
                commit
            ),
        )
        .with_file(
            SERVICE_DEF_FILE,
            r#"{"serviceName":"web","cluster":"prod","desiredCount":2}"#,
        )
}

pub fn deployment(running_commit: &str) -> Deployment {
    Deployment::new("deploy-1", "app-1", PROVIDER).with_commits(running_commit, "def456")
}

/// Fake platform plus everything an ECS executor needs around it
pub struct Fixture {
    pub fake: FakePlatformClient,
    pub clients: Arc<ClientRegistry>,
    pub logs: FakeLogSink,
    pub metadata: MetadataStore,
    pub agent: Arc<AgentConfig>,
}

impl Fixture {
    pub fn new() -> Self {
        let fake = FakePlatformClient::new();
        let clients = ClientRegistry::new();
        clients.insert(PROVIDER, fake.clone());
        Self {
            fake,
            clients: Arc::new(clients),
            logs: FakeLogSink::new(),
            metadata: MetadataStore::in_memory("deploy-1"),
            agent: Arc::new(agent_config()),
        }
    }

    /// An existing `web` service with one PRIMARY task set
    pub fn with_running_service(self) -> Self {
        let service = ServiceDefinition::new("prod", "web");
        self.fake.add_service(service);
        self.fake.add_task_set(TaskSet {
            task_set_arn: OLD_TASK_SET.to_string(),
            cluster: "prod".to_string(),
            service_name: "web".to_string(),
            task_definition_arn: "arn:aws:ecs:fake:task-definition/web:7".to_string(),
            status: TaskSetStatus::Primary,
            scale: 100,
            load_balancer: None,
        });
        self
    }

    pub fn input(
        &self,
        deployment: Deployment,
        stage: Stage,
        running: Option<DeploySource>,
        target: DeploySource,
    ) -> ExecutorInput {
        let log = self.logs.stage_log(&deployment.id, &stage.id);
        let input = ExecutorInput::new(
            deployment,
            stage,
            self.metadata.clone(),
            Arc::new(StaticSourceProvider::new(target)),
            Arc::clone(&self.agent),
        )
        .with_log(log);
        match running {
            Some(source) => input.with_running_source(Arc::new(StaticSourceProvider::new(source))),
            None => input,
        }
    }
}

/// Stage names handled by [`ScriptedPlugin`]
pub const STEP: &str = "STEP";
pub const STEP_ROLLBACK: &str = "STEP_ROLLBACK";

/// Plugin whose stages do what their config says:
/// `{"result": "FAILURE"}` returns that status, `{"block": true}` waits for
/// the stop signal.
#[derive(Clone, Default)]
pub struct ScriptedPlugin {
    executed: Arc<Mutex<Vec<String>>>,
    rollback_result: Arc<Mutex<Option<StageStatus>>>,
}

impl ScriptedPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of executed stages, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn fail_rollback(&self) {
        *self.rollback_result.lock().unwrap() = Some(StageStatus::Failure);
    }
}

#[async_trait]
impl StagePlugin for ScriptedPlugin {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn fetch_defined_stages(&self) -> Vec<&'static str> {
        vec![STEP, STEP_ROLLBACK]
    }

    fn build_pipeline_sync_stages(
        &self,
        request: &BuildStagesRequest,
    ) -> Result<Vec<PipelineStage>, PluginError> {
        let mut stages: Vec<PipelineStage> =
            request.stages.iter().map(PipelineStage::from_request).collect();
        if request.rollback {
            let mut rollback = PipelineStage::from_request(&StageRequest::new(0, STEP_ROLLBACK));
            rollback.rollback = true;
            stages.push(rollback);
        }
        Ok(stages)
    }

    async fn execute_stage(&self, input: &ExecutorInput, sig: &StopSignal) -> StageStatus {
        self.executed.lock().unwrap().push(input.stage.id.clone());
        if input.stage.name == STEP_ROLLBACK {
            return self.rollback_result.lock().unwrap().unwrap_or(StageStatus::Success);
        }
        if input.stage.config.get("block").and_then(|v| v.as_bool()) == Some(true) {
            sig.context().stopped().await;
            return StageStatus::Cancelled;
        }
        match input.stage.option_str("result") {
            Some("FAILURE") => StageStatus::Failure,
            Some("CANCELLED") => StageStatus::Cancelled,
            _ => StageStatus::Success,
        }
    }
}
