//! Metadata durability specs
//!
//! Verify stage and shared metadata written through the write-ahead log
//! survive an agent restart.

use crate::prelude::*;
use crate::prelude::assert_eq;
use tern_storage::WalMetadataBackend;

#[tokio::test]
async fn canary_target_group_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.wal");
    let world = World::new();
    world.seed_running_service(true);

    let backend = WalMetadataBackend::open(&path).unwrap();
    let deployment = world.deployment(
        RUNNING_COMMIT,
        &[stage(0, STAGE_TRAFFIC_ROUTING, json!({"canary": 25}))],
    );
    let done = world
        .run(world.job(
            deployment,
            backend.store_for("deploy-1"),
            app(true, false),
            app(true, true),
        ))
        .await;
    assert_eq!(done.status, DeploymentStatus::Success);
    drop(backend);

    let reopened = WalMetadataBackend::open(&path).unwrap();
    let metadata = reopened.store_for("deploy-1");
    assert_eq!(
        metadata.shared().get(CANARY_TARGET_GROUP_ARN_KEY).as_deref(),
        Some(CANARY_TG)
    );
    assert_eq!(reopened.deployment_ids(), vec!["deploy-1".to_string()]);
}

#[tokio::test]
async fn wait_start_time_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.wal");
    let world = World::new();
    let deployment = world.deployment(
        RUNNING_COMMIT,
        &[stage(0, STAGE_WAIT, json!({"duration": "1h"}))],
    );
    let stage_id = deployment.stages[0].id.clone();

    let backend = WalMetadataBackend::open(&path).unwrap();
    let run = world
        .controller
        .spawn(world.job(
            deployment,
            backend.store_for("deploy-1"),
            app(false, false),
            app(false, false),
        ))
        .unwrap();
    for _ in 0..400 {
        if world.logs.contains("Waiting for 1h") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(run.control().terminate());
    let interrupted = run.wait().await.unwrap();
    assert_eq!(interrupted.status, DeploymentStatus::Running);
    assert_eq!(interrupted.stages[0].status, StageStatus::NotStarted);
    drop(backend);

    let reopened = WalMetadataBackend::open(&path).unwrap();
    let start = reopened
        .store_for("deploy-1")
        .stage(&stage_id)
        .get("startTime")
        .unwrap();
    assert!(start.parse::<u64>().unwrap() > 0);
}

#[tokio::test]
async fn archived_deployment_metadata_is_gone_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.wal");

    let backend = WalMetadataBackend::open(&path).unwrap();
    backend
        .store_for("deploy-1")
        .shared()
        .set(CANARY_TARGET_GROUP_ARN_KEY, CANARY_TG)
        .unwrap();
    backend
        .store_for("deploy-2")
        .shared()
        .set(CANARY_TARGET_GROUP_ARN_KEY, CANARY_TG)
        .unwrap();
    backend.archive("deploy-1").unwrap();
    drop(backend);

    let reopened = WalMetadataBackend::open(&path).unwrap();
    assert_eq!(reopened.deployment_ids(), vec!["deploy-2".to_string()]);
    assert!(reopened
        .store_for("deploy-1")
        .shared()
        .get(CANARY_TARGET_GROUP_ARN_KEY)
        .is_none());
}
