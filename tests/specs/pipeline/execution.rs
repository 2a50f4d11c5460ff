//! Pipeline execution specs
//!
//! Verify a canary pipeline runs its stages in order and routes traffic.

use crate::prelude::*;
use crate::prelude::assert_eq;

fn canary_pipeline() -> Vec<StageRequest> {
    vec![
        stage(0, STAGE_WAIT, json!({"duration": "0s"})),
        stage(1, STAGE_TRAFFIC_ROUTING, json!({"canary": 20})),
        stage(2, STAGE_WAIT, json!({"duration": 0})),
    ]
}

#[tokio::test]
async fn canary_pipeline_routes_traffic_and_succeeds() {
    let world = World::new();
    world.seed_running_service(true);
    let deployment = world.deployment(RUNNING_COMMIT, &canary_pipeline());
    let metadata = MetadataStore::in_memory("deploy-1");

    let done = world
        .run(world.job(deployment, metadata.clone(), app(true, false), app(true, true)))
        .await;

    assert_eq!(done.status, DeploymentStatus::Success);
    let statuses: Vec<(&str, StageStatus)> = done
        .stages
        .iter()
        .map(|s| (s.name.as_str(), s.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            (STAGE_WAIT, StageStatus::Success),
            (STAGE_TRAFFIC_ROUTING, StageStatus::Success),
            (STAGE_WAIT, StageStatus::Success),
            (STAGE_ROLLBACK, StageStatus::NotStarted),
        ]
    );

    for rule in ["rule-default", "rule-api"] {
        let routing = world.platform.rule_routing(rule).unwrap();
        assert_eq!(routing.weight_of(PRIMARY_TG), 80);
        assert_eq!(routing.weight_of(CANARY_TG), 20);
    }
    assert_eq!(
        metadata.shared().get(CANARY_TARGET_GROUP_ARN_KEY).as_deref(),
        Some(CANARY_TG)
    );
    // Only listener rules were touched
    assert_eq!(
        world.mutations(),
        vec![PlatformCall::ModifyListeners {
            listener_arns: vec!["listener-443".to_string()]
        }]
    );
}

#[tokio::test]
async fn failed_stage_rolls_back_automatically() {
    let world = World::new();
    world.seed_running_service(true);
    let deployment = world.deployment(RUNNING_COMMIT, &canary_pipeline());

    // The target revision lacks a canary group, so traffic routing fails
    let done = world
        .run(world.job(
            deployment,
            MetadataStore::in_memory("deploy-1"),
            app(true, false),
            app(true, false),
        ))
        .await;

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert_eq!(
        world.stage_named(&done, STAGE_TRAFFIC_ROUTING).status,
        StageStatus::Failure
    );
    assert_eq!(
        world.stage_named(&done, STAGE_ROLLBACK).status,
        StageStatus::Success
    );
    assert_eq!(done.stages[2].status, StageStatus::NotStarted);

    let sets = world.platform.task_sets("prod", "web");
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].status, TaskSetStatus::Primary);
    assert_ne!(sets[0].task_set_arn, OLD_TASK_SET);
    assert!(world
        .logs
        .contains("Skip rolling back ELB listeners because it seems the deployment failed before updating them"));
}

#[tokio::test]
async fn first_deployment_failure_cannot_roll_back() {
    let world = World::new();
    let deployment = world.deployment("", &canary_pipeline());

    let done = world
        .run(world.job(
            deployment,
            MetadataStore::in_memory("deploy-1"),
            app(true, false),
            app(true, false),
        ))
        .await;

    assert_eq!(done.status, DeploymentStatus::Failure);
    assert_eq!(
        world.stage_named(&done, STAGE_ROLLBACK).status,
        StageStatus::Failure
    );
    assert!(world.mutations().is_empty());
    assert!(world.logs.contains(
        "Unable to determine the last deployed commit to rollback. It seems this is the first deployment."
    ));
}
