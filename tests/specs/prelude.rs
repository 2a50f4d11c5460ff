//! Shared world for behavioral specs

#![allow(dead_code)]

pub use serde_json::json;
pub use similar_asserts::assert_eq;
pub use std::sync::Arc;
pub use std::time::Duration;
pub use tern_adapters::{FakeLogSink, FakePlatformClient, PlatformCall, PlatformOp};
pub use tern_core::{
    AgentConfig, ApplicationConfig, Deployment, DeploymentStatus, EcsApplicationSpec,
    EcsDeploymentInput, EcsTargetGroups, LoadBalancer, MetadataStore, SequentialIdGen,
    ServiceDefinition, Stage, StageStatus, TaskSet, TaskSetStatus,
};
pub use tern_engine::{
    ControlHandle, Controller, DeploySource, DeploymentJob, EcsPlugin, PluginRegistry,
    StageRequest, StaticSourceProvider, WaitPlugin, CANARY_TARGET_GROUP_ARN_KEY, STAGE_ROLLBACK,
    STAGE_TRAFFIC_ROUTING, STAGE_WAIT,
};

use tern_adapters::ClientRegistry;

pub const PROVIDER: &str = "ecs-prod";
pub const PRIMARY_TG: &str = "arn:aws:elasticloadbalancing:eu-west-1:tg/web-primary";
pub const CANARY_TG: &str = "arn:aws:elasticloadbalancing:eu-west-1:tg/web-canary";
pub const OLD_TASK_SET: &str = "arn:aws:ecs:fake:task-set/prod/web/ts-old";
pub const RUNNING_COMMIT: &str = "1a2b3c";
pub const TARGET_COMMIT: &str = "4d5e6f";

const AGENT_TOML: &str = r#"
[pipeline]
stage_timeout = "30s"

[[platform_providers]]
name = "ecs-prod"
kind = "ecs"

[platform_providers.ecs]
region = "eu-west-1"
"#;

/// ECS application with the given target groups
pub fn app(primary: bool, canary: bool) -> ApplicationConfig {
    ApplicationConfig {
        name: "web".to_string(),
        kind: tern_core::PlatformKind::Ecs,
        platform_provider: None,
        ecs: Some(EcsApplicationSpec {
            input: EcsDeploymentInput {
                task_definition_file: "taskdef.json".to_string(),
                service_definition_file: "servicedef.json".to_string(),
                target_groups: (primary || canary).then(|| EcsTargetGroups {
                    primary: primary.then(|| LoadBalancer::new(PRIMARY_TG)),
                    canary: canary.then(|| LoadBalancer::new(CANARY_TG)),
                }),
            },
        }),
    }
}

/// Repository content of one commit
pub fn revision(commit: &str, app: ApplicationConfig) -> DeploySource {
    DeploySource::new(commit, app)
        .with_file(
            "taskdef.json",
            format!(
                r#"{{"family":"web","cpu":"256","containerDefinitions":[{{"name":"web","image":"registry/web:{}"}}]}}"#,
                commit
            ),
        )
        .with_file(
            "servicedef.json",
            r#"{"serviceName":"web","cluster":"prod","desiredCount":3}"#,
        )
}

pub fn stage(index: u32, name: &str, config: serde_json::Value) -> StageRequest {
    StageRequest::new(index, name).with_config(config)
}

/// Fake platform, plugins and controller wired together
pub struct World {
    pub platform: FakePlatformClient,
    pub logs: FakeLogSink,
    pub registry: Arc<PluginRegistry>,
    pub controller: Controller,
}

impl World {
    pub fn new() -> Self {
        Self::with_agent(AgentConfig::from_toml(AGENT_TOML).unwrap())
    }

    pub fn with_agent(agent: AgentConfig) -> Self {
        let platform = FakePlatformClient::new();
        let clients = ClientRegistry::new();
        clients.insert(PROVIDER, platform.clone());

        let registry = Arc::new(
            PluginRegistry::new()
                .with_plugin(Arc::new(EcsPlugin::new(Arc::new(clients))))
                .unwrap()
                .with_plugin(Arc::new(WaitPlugin::new()))
                .unwrap(),
        );
        let logs = FakeLogSink::new();
        let controller = Controller::new(
            Arc::clone(&registry),
            Arc::new(agent),
            Arc::new(logs.clone()),
        );
        Self {
            platform,
            logs,
            registry,
            controller,
        }
    }

    /// The service as left by the previous deployment
    pub fn seed_running_service(&self, primary: bool) {
        self.platform.add_service(ServiceDefinition::new("prod", "web"));
        self.platform.add_task_set(TaskSet {
            task_set_arn: OLD_TASK_SET.to_string(),
            cluster: "prod".to_string(),
            service_name: "web".to_string(),
            task_definition_arn: "arn:aws:ecs:fake:task-definition/web:12".to_string(),
            status: TaskSetStatus::Primary,
            scale: 100,
            load_balancer: primary.then(|| LoadBalancer::new(PRIMARY_TG)),
        });
        self.platform
            .add_listener(PRIMARY_TG, "listener-443", &["rule-default", "rule-api"]);
    }

    pub fn deployment(&self, running_commit: &str, stages: &[StageRequest]) -> Deployment {
        let stages = self
            .registry
            .build_stages(stages, true, &SequentialIdGen::default())
            .unwrap();
        Deployment::new("deploy-1", "web", PROVIDER)
            .with_commits(running_commit, TARGET_COMMIT)
            .with_stages(stages)
    }

    pub fn job(
        &self,
        deployment: Deployment,
        metadata: MetadataStore,
        running: ApplicationConfig,
        target: ApplicationConfig,
    ) -> DeploymentJob {
        let running_source: Option<Arc<dyn tern_engine::DeploySourceProvider>> =
            if deployment.has_running_commit() {
                Some(Arc::new(StaticSourceProvider::new(revision(
                    &deployment.running_commit_hash,
                    running,
                ))))
            } else {
                None
            };
        DeploymentJob {
            target_source: Arc::new(StaticSourceProvider::new(revision(
                &deployment.target_commit_hash,
                target,
            ))),
            deployment,
            metadata,
            running_source,
        }
    }

    pub async fn run(&self, job: DeploymentJob) -> Deployment {
        self.controller.run(job, ControlHandle::new()).await.unwrap()
    }

    pub fn stage_named<'a>(&self, deployment: &'a Deployment, name: &str) -> &'a Stage {
        deployment.stages.iter().find(|s| s.name == name).unwrap()
    }

    pub fn mutations(&self) -> Vec<PlatformCall> {
        self.platform
            .calls()
            .into_iter()
            .filter(PlatformCall::is_mutation)
            .collect()
    }
}
