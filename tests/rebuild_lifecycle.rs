use std::time::Duration;

use async_trait::async_trait;
use engine_fault_tests::{
    cluster::{ClusterHandle, RankState, RebuildState},
    container::Container,
    pool::{Pool, PoolBuilder},
    rebuild::{LifecyclePhase, RebuildHooks, RebuildLifecycle},
    sim::{SimCluster, SimConfig},
    system::SystemManager,
    workload::ObjectClass,
    Error,
    Result,
};

use assert_matches::assert_matches;

const NODES: u32 = 4;
const TARGETS: u32 = 8;

fn sim() -> SimCluster {
    SimCluster::new(SimConfig {
        ranks: NODES,
        targets_per_rank: TARGETS,
        ..Default::default()
    })
}

fn lifecycle(handle: ClusterHandle, victim: u32) -> RebuildLifecycle {
    RebuildLifecycle::new(handle, NODES, TARGETS)
        .with_victim(victim)
        .with_object_class(ObjectClass::new("RP_2GX"))
        .with_poll_interval(Duration::from_millis(10))
        .with_rebuild_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn full_rebuild_exercise_passes() {
    let sim = sim();
    let mut exercise = lifecycle(sim.handle(), 2);

    exercise.execute().await.unwrap();
    assert_eq!(exercise.phase(), LifecyclePhase::DataVerified);

    // The victim rank drained and the rebuild finished cleanly.
    let query = exercise.pool().query().await.unwrap();
    assert_eq!(query.rebuild.state, RebuildState::Done);
    assert_eq!(query.info.disabled_targets, TARGETS);
    let container = exercise.container().unwrap();
    assert_eq!(container.rank_object_count(2).await.unwrap(), 0);
    assert!(container.read_objects().await.unwrap() > 0);
}

#[tokio::test]
async fn disabled_targets_never_decrease() {
    let sim = sim();
    let mut exercise = lifecycle(sim.handle(), 1);

    exercise.verify_baseline().await.unwrap();
    let baseline = exercise.pool().query().await.unwrap();
    assert_eq!(baseline.info.disabled_targets, 0);
    assert_eq!(baseline.rebuild.state, RebuildState::Idle);

    exercise.induce_failure().await.unwrap();
    exercise.await_rebuild_start().await.unwrap();
    exercise.await_rebuild_end().await.unwrap();
    // verify_post asserts monotonicity internally.
    exercise.verify_post().await.unwrap();
    exercise.verify_data().await.unwrap();

    let after = exercise.pool().query().await.unwrap();
    assert!(after.info.disabled_targets > baseline.info.disabled_targets);
}

#[tokio::test]
async fn a_victim_without_objects_fails_fast() {
    let sim = sim();
    let mut exercise = lifecycle(sim.handle(), 1);

    exercise.verify_baseline().await.unwrap();

    // Placement landed the data elsewhere; excluding the rank would be a
    // vacuous exercise.
    let cont_uuid = exercise.container().unwrap().uuid().to_string();
    sim.move_objects_off_rank(&cont_uuid, 1);

    let error = exercise.induce_failure().await.unwrap_err();
    assert_matches!(error, Error::Precondition { .. });
    assert_eq!(exercise.phase(), LifecyclePhase::BaselineVerified);
}

#[tokio::test]
async fn steps_out_of_order_are_rejected() {
    let sim = sim();
    let mut exercise = lifecycle(sim.handle(), 0);
    assert_matches!(
        exercise.await_rebuild_start().await,
        Err(Error::Precondition { .. })
    );

    let mut unconfigured = RebuildLifecycle::new(sim.handle(), NODES, TARGETS);
    assert_matches!(
        unconfigured.verify_baseline().await,
        Err(Error::Precondition { .. })
    );
}

struct Probe {
    ran: bool,
}

#[async_trait]
impl RebuildHooks for Probe {
    async fn during_rebuild(
        &mut self,
        pool: &Pool,
        container: Option<&Container>,
    ) -> Result<()> {
        self.ran = true;
        assert!(container.is_some());
        // The rebuild may already have completed by the time this runs.
        let query = pool.query().await?;
        assert!(matches!(
            query.rebuild.state,
            RebuildState::Running | RebuildState::Done
        ));
        Ok(())
    }
}

#[tokio::test]
async fn hook_runs_while_the_rebuild_is_active() {
    let sim = sim();
    let mut exercise = lifecycle(sim.handle(), 3);

    let mut probe = Probe { ran: false };
    exercise.execute_with(&mut probe).await.unwrap();
    assert!(probe.ran);
    assert_eq!(exercise.phase(), LifecyclePhase::DataVerified);
}

#[tokio::test]
async fn pool_can_be_destroyed_while_rebuilding() {
    let sim = sim();
    let handle = sim.handle();
    let pool = PoolBuilder::new(handle.clone())
        .with_name("doomed-pool")
        .with_new_uuid()
        .create()
        .await
        .unwrap();

    handle.system.stop_ranks(&[1], true).await.unwrap();
    pool.wait_rebuild_running(Duration::from_millis(10), Duration::from_secs(5))
        .await
        .unwrap();

    // Destroying mid-rebuild must succeed, and the stopped rank can rejoin.
    pool.destroy().await.unwrap();
    handle.system.start_ranks(&[1]).await.unwrap();
    SystemManager::new(handle)
        .with_rank_check(Duration::from_millis(10), 5)
        .check_rank_states(&[1], &[RankState::Joined])
        .await
        .unwrap();
}

#[tokio::test]
async fn container_free_exercise_tracks_pool_state_only() {
    let sim = sim();
    let mut exercise = lifecycle(sim.handle(), 0).without_container();

    exercise.execute().await.unwrap();
    assert_eq!(exercise.phase(), LifecyclePhase::DataVerified);
    assert!(exercise.container().is_none());

    let query = exercise.pool().query().await.unwrap();
    assert_eq!(query.rebuild.state, RebuildState::Done);
    assert_eq!(query.info.disabled_targets, TARGETS);
}
