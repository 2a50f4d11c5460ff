//! Rollback scenario specs
//!
//! Run a pipeline whose only regular stage fails so the ROLLBACK stage
//! restores the running revision, and check what it leaves on the platform.

use crate::prelude::*;
use crate::prelude::assert_eq;

/// Deployment whose traffic routing stage fails on the target revision
async fn fail_and_roll_back(
    world: &World,
    metadata: MetadataStore,
    running: ApplicationConfig,
) -> Deployment {
    let deployment = world.deployment(
        RUNNING_COMMIT,
        &[stage(0, STAGE_TRAFFIC_ROUTING, json!({"canary": 30}))],
    );
    world
        .run(world.job(deployment, metadata, running, app(false, false)))
        .await
}

#[tokio::test]
async fn rollback_without_target_groups() {
    let world = World::new();
    world.seed_running_service(false);

    let done = fail_and_roll_back(&world, MetadataStore::in_memory("deploy-1"), app(false, false)).await;

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert_eq!(
        world.stage_named(&done, STAGE_ROLLBACK).status,
        StageStatus::Success
    );
    assert_eq!(
        world.mutations(),
        vec![
            PlatformCall::RegisterTaskDefinition {
                family: "web".to_string()
            },
            PlatformCall::UpdateService {
                service: "web".to_string()
            },
            PlatformCall::CreateTaskSet {
                service: "web".to_string(),
                task_definition_arn: "arn:aws:ecs:fake:task-definition/web:1".to_string(),
                target_group_arn: None,
                scale: 100,
            },
            PlatformCall::UpdatePrimaryTaskSet {
                service: "web".to_string(),
                task_set_arn: "arn:aws:ecs:fake:task-set/prod/web/ts-1".to_string(),
            },
            PlatformCall::DeleteTaskSet {
                task_set_arn: OLD_TASK_SET.to_string()
            },
        ]
    );
    let sets = world.platform.task_sets("prod", "web");
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].status, TaskSetStatus::Primary);
    assert_eq!(sets[0].scale, 100);
}

#[tokio::test]
async fn rollback_prefers_canary_from_running_revision() {
    let world = World::new();
    world.seed_running_service(true);
    let metadata = MetadataStore::in_memory("deploy-1");
    metadata
        .shared()
        .set(
            CANARY_TARGET_GROUP_ARN_KEY,
            "arn:aws:elasticloadbalancing:eu-west-1:tg/ignored",
        )
        .unwrap();

    let done = fail_and_roll_back(&world, metadata, app(true, true)).await;

    assert_eq!(
        world.stage_named(&done, STAGE_ROLLBACK).status,
        StageStatus::Success
    );
    let routing = world.platform.rule_routing("rule-default").unwrap();
    assert_eq!(routing.weight_of(PRIMARY_TG), 100);
    assert!(routing
        .targets()
        .iter()
        .any(|t| t.target_group_arn == CANARY_TG));
    assert!(world.logs.contains("Modified 2 listener rules: rule-default, rule-api"));
}

#[tokio::test]
async fn rollback_recovers_canary_from_metadata() {
    let world = World::new();
    world.seed_running_service(true);
    let metadata = MetadataStore::in_memory("deploy-1");
    metadata
        .shared()
        .set(CANARY_TARGET_GROUP_ARN_KEY, CANARY_TG)
        .unwrap();

    let done = fail_and_roll_back(&world, metadata, app(true, false)).await;

    assert_eq!(
        world.stage_named(&done, STAGE_ROLLBACK).status,
        StageStatus::Success
    );
    let routing = world.platform.rule_routing("rule-api").unwrap();
    assert_eq!(routing.weight_of(PRIMARY_TG), 100);
    assert_eq!(routing.weight_of(CANARY_TG), 0);
}

#[tokio::test]
async fn rollback_reports_partial_listener_update() {
    let world = World::new();
    world.seed_running_service(true);
    world.platform.fail_modify_after(1);

    let done = fail_and_roll_back(&world, MetadataStore::in_memory("deploy-1"), app(true, true)).await;

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert_eq!(
        world.stage_named(&done, STAGE_ROLLBACK).status,
        StageStatus::Failure
    );
    assert!(world.logs.contains("Modified 1 listener rules: rule-default"));
    assert!(world.logs.contains("Operator intervention is required"));
    // The previous task set is left for the operator
    assert!(world
        .platform
        .task_sets("prod", "web")
        .iter()
        .any(|ts| ts.task_set_arn == OLD_TASK_SET));
}
