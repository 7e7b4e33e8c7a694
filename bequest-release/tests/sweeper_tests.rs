use bequest_release::{
    spawn_sweeper, Bundle, BundleStore, MemoryBundleStore, NoopDelivery, ReleaseCondition,
    ReleaseEngine, ReleaseMode, ReleaseStatus, SweeperConfig, UnlimitedTier,
};
use bequest_types::{Trustee, UserId};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

fn armed_time_lock(engine: &ReleaseEngine<MemoryBundleStore, NoopDelivery>) -> bequest_types::BundleId {
    let now = Utc::now();
    let mut bundle = Bundle::new(
        UserId::new(),
        "estate",
        ReleaseMode::TimeLock {
            release_at: now - ChronoDuration::hours(1),
        },
        ReleaseCondition::None,
        "tok".into(),
        now,
    );
    bundle.add_trustee(Trustee::new("heir@example.com")).unwrap();
    let id = bundle.id;
    engine.store().insert(bundle).unwrap();
    engine.arm(id, &UnlimitedTier, now).unwrap();
    id
}

#[tokio::test]
async fn periodic_sweep_releases_due_bundles() {
    let engine = Arc::new(ReleaseEngine::new(MemoryBundleStore::new(), NoopDelivery));
    let id = armed_time_lock(&engine);

    let (handle, task) = spawn_sweeper(
        engine.clone(),
        SweeperConfig {
            sweep_interval: Duration::from_millis(10),
            command_buffer: 8,
        },
    );

    // Give the first tick a moment to run.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(engine.store().get(id).unwrap().status, ReleaseStatus::Released);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn commands_flow_through_the_channel() {
    let engine = Arc::new(ReleaseEngine::new(MemoryBundleStore::new(), NoopDelivery));

    let now = Utc::now();
    let mut bundle = Bundle::new(
        UserId::new(),
        "estate",
        ReleaseMode::Heartbeat { cadence_days: 30 },
        ReleaseCondition::None,
        "tok".into(),
        now,
    );
    bundle.add_trustee(Trustee::new("heir@example.com")).unwrap();
    let id = bundle.id;
    engine.store().insert(bundle).unwrap();
    engine.arm(id, &UnlimitedTier, now).unwrap();

    // Long interval: only commands drive the engine in this test.
    let (handle, task) = spawn_sweeper(
        engine.clone(),
        SweeperConfig {
            sweep_interval: Duration::from_secs(3600),
            command_buffer: 8,
        },
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let before = engine.store().get(id).unwrap();
    handle.check_in(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = engine.store().get(id).unwrap();
    assert!(
        after.heartbeat.unwrap().last_check_in >= before.heartbeat.unwrap().last_check_in
    );

    handle.cancel(id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.store().get(id).unwrap().status, ReleaseStatus::Cancelled);

    handle.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn concurrent_sweepers_release_exactly_once() {
    // Two sweepers over one store: the status CAS decides a single winner.
    let engine = Arc::new(ReleaseEngine::new(MemoryBundleStore::new(), NoopDelivery));
    let id = armed_time_lock(&engine);

    let config = SweeperConfig {
        sweep_interval: Duration::from_millis(5),
        command_buffer: 8,
    };
    let (h1, t1) = spawn_sweeper(engine.clone(), config.clone());
    let (h2, t2) = spawn_sweeper(engine.clone(), config);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(engine.store().get(id).unwrap().status, ReleaseStatus::Released);

    h1.shutdown().await.unwrap();
    h2.shutdown().await.unwrap();
    t1.await.unwrap();
    t2.await.unwrap();
}
