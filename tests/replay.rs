//! Engine restart scenarios: durable state must survive a clean full-system
//! stop and start.

use std::time::Duration;

use engine_fault_tests::{
    cluster::{FsMount, RebuildState},
    container::{Container, ContainerBuilder},
    pool::{Pool, PoolBuilder},
    sim::{SimCluster, SimConfig, SimMount},
    system::SystemManager,
    workload::ObjectClass,
};

fn sim() -> SimCluster {
    SimCluster::new(SimConfig {
        ranks: 2,
        targets_per_rank: 4,
        ..Default::default()
    })
}

fn manager(sim: &SimCluster) -> SystemManager {
    SystemManager::new(sim.handle()).with_rank_check(Duration::from_millis(10), 5)
}

async fn create_populated(sim: &SimCluster) -> (Pool, Container) {
    let handle = sim.handle();
    let pool = PoolBuilder::new(handle.clone())
        .with_name("replay-pool")
        .with_new_uuid()
        .create()
        .await
        .unwrap();
    let container = ContainerBuilder::new(handle, &pool)
        .with_new_uuid()
        .with_object_class(ObjectClass::new("RP_2GX"))
        .create()
        .await
        .unwrap();
    container.write_objects(0, &ObjectClass::new("RP_2GX")).await.unwrap();
    container.write_objects(1, &ObjectClass::new("RP_2GX")).await.unwrap();
    (pool, container)
}

#[tokio::test]
async fn snapshots_survive_an_engine_restart() {
    let sim = sim();
    let (_pool, container) = create_populated(&sim).await;

    let mut snapshots = Vec::new();
    for _ in 0..3 {
        container.write_objects(0, &ObjectClass::new("RP_2GX")).await.unwrap();
        snapshots.push(container.create_snap().await.unwrap());
    }
    container.verify_snaps(&snapshots).await.unwrap();

    // Remove the second snapshot before the restart.
    container.destroy_snap(snapshots.remove(1)).await.unwrap();
    container.verify_snaps(&snapshots).await.unwrap();

    let system = manager(&sim);
    system.stop_engines().await.unwrap();
    system.restart_engines().await.unwrap();

    // Set equality, not sequence: order of the reported epochs is free.
    container.verify_snaps(&snapshots).await.unwrap();

    while let Some(epoch) = snapshots.pop() {
        container.destroy_snap(epoch).await.unwrap();
    }
    container.verify_snaps(&[]).await.unwrap();
}

#[tokio::test]
async fn a_clean_full_stop_does_not_degrade_the_pool() {
    let sim = sim();
    let (pool, container) = create_populated(&sim).await;

    let system = manager(&sim);
    system.stop_engines().await.unwrap();
    system.restart_engines().await.unwrap();

    let query = pool.query().await.unwrap();
    assert_eq!(query.info.disabled_targets, 0);
    assert_eq!(query.rebuild.state, RebuildState::Idle);

    // Previously written data is still readable byte-for-byte.
    assert!(container.read_objects().await.unwrap() > 0);
}

#[tokio::test]
async fn properties_survive_an_engine_restart() {
    let sim = sim();
    let (pool, container) = create_populated(&sim).await;

    pool.set_prop("checkpoint", "disabled").await.unwrap();
    container.set_prop("label", "replay-target").await.unwrap();

    let system = manager(&sim);
    system.stop_engines().await.unwrap();
    system.restart_engines().await.unwrap();

    let props = pool.get_prop(Some("checkpoint")).await.unwrap();
    assert_eq!(props.len(), 1);
    assert_eq!(props[0].value, "disabled");

    let props = container.get_prop(Some("label")).await.unwrap();
    assert_eq!(props.len(), 1);
    assert_eq!(props[0].value, "replay-target");
}

#[tokio::test]
async fn a_mount_can_be_reestablished_around_a_restart() {
    let sim = sim();
    let (_pool, container) = create_populated(&sim).await;

    let mount = SimMount::new("/mnt/replay");
    mount.mount().await.unwrap();
    assert!(mount.is_mounted());
    mount.unmount().await.unwrap();

    let system = manager(&sim);
    system.stop_engines().await.unwrap();
    system.restart_engines().await.unwrap();

    mount.mount().await.unwrap();
    assert!(mount.is_mounted());
    assert!(container.read_objects().await.unwrap() > 0);

    // Remount keeps the same handle usable.
    mount.remount().await.unwrap();
    assert!(mount.is_mounted());
    assert_eq!(mount.mount_point(), "/mnt/replay");
}
