//! Rebuild lifecycle driver.
//!
//! Sequences one full rebuild exercise: baseline snapshot, induced failure,
//! start-of-rebuild convergence, an optional caller hook while the rebuild
//! runs, end-of-rebuild convergence, and post/data verification.

use std::time::Duration;

use async_trait::async_trait;
use snafu::ensure;
use tracing::info;

use crate::{
    cluster::ClusterHandle,
    container::{Container, ContainerBuilder},
    error::{PostconditionSnafu, PreconditionSnafu, Result},
    pool::{Pool, PoolBuilder, PoolExpectation},
    workload::ObjectClass,
};

/// Phases of a rebuild exercise, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecyclePhase {
    Setup,
    BaselineVerified,
    FailureInduced,
    RebuildStarted,
    RebuildEnded,
    PostVerified,
    DataVerified,
}

/// Caller hooks run while the rebuild is active.
#[async_trait]
pub trait RebuildHooks: Send {
    /// Runs between start-of-rebuild convergence and the completion wait.
    /// The rebuild may complete while this is still executing.
    async fn during_rebuild(
        &mut self,
        pool: &Pool,
        container: Option<&Container>,
    ) -> Result<()> {
        let _ = (pool, container);
        Ok(())
    }
}

/// Default no-op hooks.
pub struct NoHooks;

#[async_trait]
impl RebuildHooks for NoHooks {}

pub struct RebuildLifecycle {
    cluster: ClusterHandle,
    node_count: u32,
    targets_per_rank: u32,
    victims: Vec<u32>,
    oclass: ObjectClass,
    poll_interval: Duration,
    rebuild_timeout: Duration,
    pool_builder: PoolBuilder,
    create_container: bool,
    phase: LifecyclePhase,
    pool: Option<Pool>,
    container: Option<Container>,
    disabled_at_start: u32,
}

impl RebuildLifecycle {
    pub fn new(cluster: ClusterHandle, node_count: u32, targets_per_rank: u32) -> Self {
        let pool_builder = PoolBuilder::new(cluster.clone())
            .with_name("rebuild-pool")
            .with_new_uuid();
        Self {
            cluster,
            node_count,
            targets_per_rank,
            victims: Vec::new(),
            oclass: ObjectClass::new("RP_2GX"),
            poll_interval: Duration::from_secs(5),
            rebuild_timeout: Duration::from_secs(120),
            pool_builder,
            create_container: true,
            phase: LifecyclePhase::Setup,
            pool: None,
            container: None,
            disabled_at_start: 0,
        }
    }

    /// Rank whose loss the exercise rebuilds around. May be given several
    /// times to take down a set of ranks at once.
    pub fn with_victim(mut self, rank: u32) -> Self {
        self.victims.push(rank);
        self
    }

    pub fn with_object_class(mut self, oclass: ObjectClass) -> Self {
        self.oclass = oclass;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_rebuild_timeout(mut self, timeout: Duration) -> Self {
        self.rebuild_timeout = timeout;
        self
    }

    pub fn with_pool_builder(mut self, builder: PoolBuilder) -> Self {
        self.pool_builder = builder;
        self
    }

    /// Skip container creation; the exercise then only tracks pool state.
    pub fn without_container(mut self) -> Self {
        self.create_container = false;
        self
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn pool(&self) -> &Pool {
        self.pool
            .as_ref()
            .expect("pool is created during the baseline phase")
    }

    pub fn container(&self) -> Option<&Container> {
        self.container.as_ref()
    }

    fn expect_phase(&self, wanted: LifecyclePhase) -> Result<()> {
        ensure!(
            self.phase == wanted,
            PreconditionSnafu {
                reason: format!(
                    "lifecycle step out of order: phase is {:?}, expected {:?}",
                    self.phase, wanted
                ),
            }
        );
        Ok(())
    }

    fn target_count(&self) -> u32 {
        self.node_count * self.targets_per_rank
    }

    /// Run the full sequence with default hooks.
    pub async fn execute(&mut self) -> Result<()> {
        self.execute_with(&mut NoHooks).await
    }

    /// Run the full sequence, invoking `hooks` while the rebuild runs.
    pub async fn execute_with(&mut self, hooks: &mut dyn RebuildHooks) -> Result<()> {
        self.verify_baseline().await?;
        self.induce_failure().await?;
        self.await_rebuild_start().await?;
        hooks
            .during_rebuild(
                self.pool
                    .as_ref()
                    .expect("pool is created during the baseline phase"),
                self.container.as_ref(),
            )
            .await?;
        self.await_rebuild_end().await?;
        self.verify_post().await?;
        self.verify_data().await?;
        info!("rebuild exercise passed");
        Ok(())
    }

    /// Create the pool and container, write the rank-tagged object set and
    /// verify the pre-failure baseline.
    pub async fn verify_baseline(&mut self) -> Result<()> {
        self.expect_phase(LifecyclePhase::Setup)?;
        ensure!(
            !self.victims.is_empty(),
            PreconditionSnafu {
                reason: "no victim rank configured".to_string(),
            }
        );

        let pool = self.pool_builder.create().await?;
        let baseline = PoolExpectation::baseline(self.node_count, self.target_count());
        pool.verify(&baseline, "before rebuild").await?;

        if self.create_container {
            let container = ContainerBuilder::new(self.cluster.clone(), &pool)
                .with_new_uuid()
                .with_object_class(self.oclass.clone())
                .create()
                .await?;
            for rank in &self.victims {
                container.write_objects(*rank, &self.oclass).await?;
            }
            self.container = Some(container);
        }

        self.pool = Some(pool);
        self.phase = LifecyclePhase::BaselineVerified;
        Ok(())
    }

    /// Check the victims actually hold data, then stop their engines.
    pub async fn induce_failure(&mut self) -> Result<()> {
        self.expect_phase(LifecyclePhase::BaselineVerified)?;

        // A rebuild exercise against a rank holding no objects is vacuous.
        if let Some(container) = &self.container {
            for rank in &self.victims {
                let count = container.rank_object_count(*rank).await?;
                ensure!(
                    count > 0,
                    PreconditionSnafu {
                        reason: format!("no objects written to rank {rank}"),
                    }
                );
            }
        }

        self.cluster.system.stop_ranks(&self.victims, true).await?;
        self.phase = LifecyclePhase::FailureInduced;
        Ok(())
    }

    pub async fn await_rebuild_start(&mut self) -> Result<()> {
        self.expect_phase(LifecyclePhase::FailureInduced)?;
        let query = self
            .pool()
            .wait_rebuild_running(self.poll_interval, self.rebuild_timeout)
            .await?;
        self.disabled_at_start = query.info.disabled_targets;
        info!(
            disabled = query.info.disabled_targets,
            "rebuild started"
        );
        self.phase = LifecyclePhase::RebuildStarted;
        Ok(())
    }

    pub async fn await_rebuild_end(&mut self) -> Result<()> {
        self.expect_phase(LifecyclePhase::RebuildStarted)?;
        self.pool()
            .wait_rebuild_done(self.poll_interval, self.rebuild_timeout)
            .await?;

        // The container may have picked up a redundancy-degraded status
        // while the rebuild ran; clear it and refresh local state.
        if let Some(container) = &self.container {
            container.mark_healthy().await?;
            container.query().await?;
        }
        self.pool().query().await?;

        self.phase = LifecyclePhase::RebuildEnded;
        Ok(())
    }

    /// Verify the victims drained and the pool matches the post-rebuild
    /// expectation, with a monotonically non-decreasing disabled count.
    pub async fn verify_post(&mut self) -> Result<()> {
        self.expect_phase(LifecyclePhase::RebuildEnded)?;

        if let Some(container) = &self.container {
            for rank in &self.victims {
                let count = container.rank_object_count(*rank).await?;
                ensure!(
                    count == 0,
                    PostconditionSnafu {
                        reason: format!("excluded rank {rank} still has {count} objects"),
                    }
                );
            }
        }

        let expectation = PoolExpectation::rebuilt(self.node_count, self.target_count());
        let query = self.pool().verify(&expectation, "after rebuild").await?;
        ensure!(
            query.info.disabled_targets >= self.disabled_at_start,
            PostconditionSnafu {
                reason: format!(
                    "disabled target count went backwards: {} -> {}",
                    self.disabled_at_start, query.info.disabled_targets
                ),
            }
        );

        self.phase = LifecyclePhase::PostVerified;
        Ok(())
    }

    /// Re-read every written object; a mismatch is a hard failure.
    pub async fn verify_data(&mut self) -> Result<()> {
        self.expect_phase(LifecyclePhase::PostVerified)?;
        if let Some(container) = &self.container {
            container.read_objects().await?;
        }
        self.phase = LifecyclePhase::DataVerified;
        Ok(())
    }
}
