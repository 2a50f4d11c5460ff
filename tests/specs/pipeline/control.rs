//! Operator control specs
//!
//! Verify cancel, cancel with rollback and stage deadlines.

use crate::prelude::*;
use crate::prelude::assert_eq;

async fn until_stage_running(count: usize, world: &World) {
    // WAIT narrates its start as soon as it runs
    for _ in 0..400 {
        let waiting = world
            .logs
            .lines()
            .iter()
            .filter(|l| l.message.starts_with("Waiting for"))
            .count();
        if waiting >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("wait stage never started");
}

#[tokio::test]
async fn cancel_with_rollback_restores_listeners_from_metadata() {
    let world = World::new();
    world.seed_running_service(true);
    let metadata = MetadataStore::in_memory("deploy-1");
    let deployment = world.deployment(
        RUNNING_COMMIT,
        &[
            stage(0, STAGE_TRAFFIC_ROUTING, json!({"primary": 50, "canary": 50})),
            stage(1, STAGE_WAIT, json!({"duration": "1h"})),
        ],
    );

    // The canary group only exists in the target revision
    let run = world
        .controller
        .spawn(world.job(deployment, metadata, app(true, false), app(true, true)))
        .unwrap();
    until_stage_running(1, &world).await;
    assert!(run.control().cancel_with_rollback());
    let done = run.wait().await.unwrap();

    assert_eq!(done.status, DeploymentStatus::Cancelled);
    assert_eq!(
        world.stage_named(&done, STAGE_WAIT).status,
        StageStatus::Cancelled
    );
    assert_eq!(
        world.stage_named(&done, STAGE_ROLLBACK).status,
        StageStatus::Success
    );
    for rule in ["rule-default", "rule-api"] {
        let routing = world.platform.rule_routing(rule).unwrap();
        assert_eq!(routing.weight_of(PRIMARY_TG), 100);
        assert_eq!(routing.weight_of(CANARY_TG), 0);
    }
    assert!(world
        .logs
        .contains("Successfully got canary target group ARN from metadata store"));
}

#[tokio::test]
async fn plain_cancel_leaves_traffic_split() {
    let world = World::new();
    world.seed_running_service(true);
    let deployment = world.deployment(
        RUNNING_COMMIT,
        &[
            stage(0, STAGE_TRAFFIC_ROUTING, json!({"canary": 10})),
            stage(1, STAGE_WAIT, json!({"duration": "1h"})),
        ],
    );

    let run = world
        .controller
        .spawn(world.job(
            deployment,
            MetadataStore::in_memory("deploy-1"),
            app(true, true),
            app(true, true),
        ))
        .unwrap();
    until_stage_running(1, &world).await;
    assert!(run.control().cancel());
    let done = run.wait().await.unwrap();

    assert_eq!(done.status, DeploymentStatus::Cancelled);
    assert_eq!(
        world.stage_named(&done, STAGE_ROLLBACK).status,
        StageStatus::NotStarted
    );
    assert_eq!(
        world.platform.rule_routing("rule-api").unwrap().weight_of(CANARY_TG),
        10
    );
    assert!(world.logs.contains("Wait stopped (cancelled)"));
}

#[tokio::test]
async fn stage_deadline_cancels_the_deployment() {
    let world = World::new();
    let deployment = world.deployment(
        RUNNING_COMMIT,
        &[stage(0, STAGE_WAIT, json!({"duration": "1h", "timeout": "50ms"}))],
    );

    let done = tokio::time::timeout(
        Duration::from_secs(5),
        world.run(world.job(
            deployment,
            MetadataStore::in_memory("deploy-1"),
            app(false, false),
            app(false, false),
        )),
    )
    .await
    .unwrap();

    assert_eq!(done.status, DeploymentStatus::Cancelled);
    assert_eq!(done.stages[0].status, StageStatus::Cancelled);
    assert!(world.logs.contains("Wait stopped (timeout)"));
}
