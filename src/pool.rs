//! Pool proxy and verification.

use std::{fmt, time::Duration};

use snafu::ensure;
use tracing::info;

use crate::{
    cluster::{
        ClusterHandle,
        PoolQuery,
        PoolSpec,
        Property,
        RebuildState,
        StorageClass,
    },
    error::{PostconditionSnafu, Result},
    generate_uuid,
    poller::Poller,
};

/// Bound on an expected counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Exact(u64),
    AtLeast(u64),
}

impl Bound {
    pub fn matches(&self, value: u64) -> bool {
        match self {
            Bound::Exact(n) => value == *n,
            Bound::AtLeast(n) => value >= *n,
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Exact(n) => write!(f, "== {n}"),
            Bound::AtLeast(n) => write!(f, ">= {n}"),
        }
    }
}

/// Expected pool state. Verification matches every field against a single
/// query snapshot; a partial match is a failure.
#[derive(Debug, Clone)]
pub struct PoolExpectation {
    pub node_count: u32,
    pub target_count: u32,
    pub disabled_targets: Bound,
    pub rebuild_state: RebuildState,
    pub objects: Bound,
    pub records: Bound,
    pub errno: i32,
}

impl PoolExpectation {
    /// Pre-failure baseline: full membership, rebuild idle.
    pub fn baseline(node_count: u32, target_count: u32) -> Self {
        Self {
            node_count,
            target_count,
            disabled_targets: Bound::Exact(0),
            rebuild_state: RebuildState::Idle,
            objects: Bound::Exact(0),
            records: Bound::Exact(0),
            errno: 0,
        }
    }

    /// Post-rebuild expectation: targets disabled, rebuild done cleanly.
    pub fn rebuilt(node_count: u32, target_count: u32) -> Self {
        Self {
            node_count,
            target_count,
            disabled_targets: Bound::AtLeast(1),
            rebuild_state: RebuildState::Done,
            objects: Bound::AtLeast(0),
            records: Bound::AtLeast(0),
            errno: 0,
        }
    }

    /// Every field mismatch between the expectation and a query snapshot.
    pub fn mismatches(&self, query: &PoolQuery) -> Vec<String> {
        let mut faults = Vec::new();
        if query.info.node_count != self.node_count {
            faults.push(format!(
                "node_count is {}, expected {}",
                query.info.node_count, self.node_count
            ));
        }
        if query.info.target_count != self.target_count {
            faults.push(format!(
                "target_count is {}, expected {}",
                query.info.target_count, self.target_count
            ));
        }
        if !self
            .disabled_targets
            .matches(u64::from(query.info.disabled_targets))
        {
            faults.push(format!(
                "disabled_targets is {}, expected {}",
                query.info.disabled_targets, self.disabled_targets
            ));
        }
        if query.rebuild.state != self.rebuild_state {
            faults.push(format!(
                "rebuild state is {}, expected {}",
                query.rebuild.state, self.rebuild_state
            ));
        }
        if !self.objects.matches(query.rebuild.objects) {
            faults.push(format!(
                "rebuilt objects is {}, expected {}",
                query.rebuild.objects, self.objects
            ));
        }
        if !self.records.matches(query.rebuild.records) {
            faults.push(format!(
                "rebuilt records is {}, expected {}",
                query.rebuild.records, self.records
            ));
        }
        if query.rebuild.errno != self.errno {
            faults.push(format!(
                "rebuild errno is {}, expected {}",
                query.rebuild.errno, self.errno
            ));
        }
        faults
    }
}

#[derive(Clone)]
pub struct PoolBuilder {
    cluster: ClusterHandle,
    name: Option<String>,
    uuid: Option<String>,
    scm_size: Option<u64>,
    nvme_size: Option<u64>,
}

impl PoolBuilder {
    pub fn new(cluster: ClusterHandle) -> Self {
        Self {
            cluster,
            name: None,
            uuid: None,
            scm_size: None,
            nvme_size: None,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn with_uuid(mut self, uuid: &str) -> Self {
        self.uuid = Some(uuid.to_owned());
        self
    }

    pub fn with_new_uuid(self) -> Self {
        let uuid = generate_uuid();
        self.with_uuid(&uuid)
    }

    pub fn with_scm_size_mb(mut self, size_mb: u64) -> Self {
        self.scm_size = Some(size_mb * 1024 * 1024);
        self
    }

    pub fn with_nvme_size_mb(mut self, size_mb: u64) -> Self {
        self.nvme_size = Some(size_mb * 1024 * 1024);
        self
    }

    pub fn name(&self) -> String {
        self.name.as_ref().expect("Pool name must be set").clone()
    }

    pub fn uuid(&self) -> String {
        self.uuid.as_ref().expect("Pool UUID must be set").clone()
    }

    pub async fn create(&mut self) -> Result<Pool> {
        let spec = PoolSpec {
            name: self.name(),
            uuid: self.uuid(),
            scm_size: self.scm_size.unwrap_or(0),
            nvme_size: self.nvme_size.unwrap_or(0),
        };
        self.cluster.pool.create_pool(&spec).await?;
        info!(pool = %spec.uuid, name = %spec.name, "created pool");
        Ok(Pool {
            cluster: self.cluster.clone(),
            name: spec.name,
            uuid: spec.uuid,
        })
    }
}

/// Proxy to one created pool.
#[derive(Clone)]
pub struct Pool {
    cluster: ClusterHandle,
    name: String,
    uuid: String,
}

impl Pool {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn query(&self) -> Result<PoolQuery> {
        self.cluster.pool.query_pool(&self.uuid).await
    }

    pub async fn free_space(&self, class: StorageClass) -> Result<u64> {
        let space = self.cluster.pool.pool_space(&self.uuid).await?;
        Ok(space.free(class))
    }

    pub async fn exclude(&self, rank: u32, target: u32) -> Result<()> {
        self.cluster
            .pool
            .exclude_target(&self.uuid, rank, target)
            .await
    }

    pub async fn set_prop(&self, name: &str, value: &str) -> Result<()> {
        self.cluster
            .pool
            .set_pool_prop(&self.uuid, &Property::new(name, value))
            .await
    }

    pub async fn get_prop(&self, name: Option<&str>) -> Result<Vec<Property>> {
        self.cluster.pool.get_pool_props(&self.uuid, name).await
    }

    pub async fn destroy(self) -> Result<()> {
        self.cluster.pool.destroy_pool(&self.uuid).await
    }

    /// Poll until the rebuild reports running, up to `timeout`.
    pub async fn wait_rebuild_running(
        &self,
        interval: Duration,
        timeout: Duration,
    ) -> Result<PoolQuery> {
        Poller::timeout(interval, timeout)
            .poll(
                || self.query(),
                |q: &PoolQuery| q.rebuild.state == RebuildState::Running,
            )
            .await?
            .expect_converged("pool rebuild to start")
    }

    /// Poll until the rebuild completed without error, up to `timeout`.
    pub async fn wait_rebuild_done(
        &self,
        interval: Duration,
        timeout: Duration,
    ) -> Result<PoolQuery> {
        Poller::timeout(interval, timeout)
            .poll(
                || self.query(),
                |q: &PoolQuery| {
                    q.rebuild.state == RebuildState::Done && q.rebuild.errno == 0
                },
            )
            .await?
            .expect_converged("pool rebuild to complete")
    }

    /// Verify the pool against an expectation; every mismatching field is
    /// reported, and any mismatch is a postcondition failure.
    pub async fn verify(
        &self,
        expectation: &PoolExpectation,
        context: &str,
    ) -> Result<PoolQuery> {
        let query = self.query().await?;
        let mut faults = expectation.mismatches(&query);
        if query.info.uuid != self.uuid {
            faults.push(format!(
                "uuid is {}, expected {}",
                query.info.uuid, self.uuid
            ));
        }
        ensure!(
            faults.is_empty(),
            PostconditionSnafu {
                reason: format!(
                    "pool {} {}: {}",
                    self.uuid,
                    context,
                    faults.join("; ")
                ),
            }
        );
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_matching() {
        assert!(Bound::Exact(0).matches(0));
        assert!(!Bound::Exact(0).matches(1));
        assert!(Bound::AtLeast(1).matches(4));
        assert!(!Bound::AtLeast(1).matches(0));
    }
}
