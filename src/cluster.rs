//! External cluster interfaces.
//!
//! The harness never talks to the engines directly; everything goes through
//! the traits below, bundled in a cloneable [`ClusterHandle`]. Production
//! implementations wrap the control-plane RPC endpoints; the `sim` module
//! provides the in-memory implementation used by this crate's own tests.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CommandFailedSnafu, Result};

/// Membership state of one engine rank as reported by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankState {
    Joined,
    Stopped,
    Excluded,
}

impl fmt::Display for RankState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankState::Joined => write!(f, "joined"),
            RankState::Stopped => write!(f, "stopped"),
            RankState::Excluded => write!(f, "excluded"),
        }
    }
}

/// Rebuild progress of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildState {
    Idle,
    Running,
    Done,
}

impl fmt::Display for RebuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildState::Idle => write!(f, "idle"),
            RebuildState::Running => write!(f, "running"),
            RebuildState::Done => write!(f, "done"),
        }
    }
}

/// Storage tier addressed by a workload or space query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    Scm,
    Nvme,
}

/// Pool membership counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub uuid: String,
    pub node_count: u32,
    pub target_count: u32,
    pub disabled_targets: u32,
}

/// Rebuild status counters of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildStatus {
    pub state: RebuildState,
    pub objects: u64,
    pub records: u64,
    pub errno: i32,
}

/// One pool query snapshot: membership plus rebuild status, taken together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolQuery {
    pub info: PoolInfo,
    pub rebuild: RebuildStatus,
}

/// Free capacity per storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpace {
    pub scm_free: u64,
    pub nvme_free: u64,
}

impl PoolSpace {
    pub fn free(&self, class: StorageClass) -> u64 {
        match class {
            StorageClass::Scm => self.scm_free,
            StorageClass::Nvme => self.nvme_free,
        }
    }
}

/// A named property of a pool or container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }
}

/// One storage device on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub uuid: String,
    /// Device holds engine system metadata; such a device cannot be marked
    /// faulty without taking the hosting rank down.
    pub has_sys_xs: bool,
}

/// Parameters for pool creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSpec {
    pub name: String,
    pub uuid: String,
    pub scm_size: u64,
    pub nvme_size: u64,
}

/// Parameters for container creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub uuid: String,
    pub pool: String,
    pub object_class: Option<String>,
    pub properties: Vec<Property>,
}

/// Health summary of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStatus {
    pub health: String,
}

/// Parameters handed to the external I/O benchmark tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchJob {
    pub pool: String,
    pub container: String,
    pub write: bool,
    pub read: bool,
    pub block_size: u64,
    pub transfer_size: u64,
    pub processes: u32,
    pub env: HashMap<String, String>,
}

/// Throughput metrics parsed from the benchmark tool's JSON summary line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchMetrics {
    pub write_mib_s: f64,
    pub read_mib_s: f64,
    pub bytes_moved: u64,
}

/// Raw benchmark tool output.
#[derive(Debug, Clone)]
pub struct BenchOutput {
    pub stdout: String,
}

impl BenchOutput {
    /// Lines the tool flagged as warnings.
    pub fn warnings(&self) -> Vec<&str> {
        self.stdout
            .lines()
            .filter(|line| line.contains("WARNING"))
            .collect()
    }

    /// The tool prints one JSON summary line; parse it into metrics.
    pub fn metrics(&self) -> Result<BenchMetrics> {
        let line = self
            .stdout
            .lines()
            .rev()
            .find(|line| line.trim_start().starts_with('{'))
            .ok_or_else(|| {
                CommandFailedSnafu {
                    command: "bench",
                    error: "no metrics summary in output".to_string(),
                }
                .build()
            })?;
        serde_json::from_str(line).map_err(|e| {
            CommandFailedSnafu {
                command: "bench",
                error: format!("unparsable metrics summary: {e}"),
            }
            .build()
        })
    }
}

/// Engine process control: start/stop ranks and query membership.
#[async_trait]
pub trait SystemCtl: Send + Sync {
    async fn stop_ranks(&self, ranks: &[u32], force: bool) -> Result<()>;
    async fn start_ranks(&self, ranks: &[u32]) -> Result<()>;
    async fn rank_states(&self, ranks: &[u32]) -> Result<HashMap<u32, RankState>>;
    async fn all_ranks(&self) -> Result<Vec<u32>>;
    /// Ranks hosted on the given node.
    async fn host_ranks(&self, host: &str) -> Result<Vec<u32>>;
}

/// Pool service operations.
#[async_trait]
pub trait PoolRpc: Send + Sync {
    async fn create_pool(&self, spec: &PoolSpec) -> Result<()>;
    async fn destroy_pool(&self, uuid: &str) -> Result<()>;
    async fn query_pool(&self, uuid: &str) -> Result<PoolQuery>;
    async fn pool_space(&self, uuid: &str) -> Result<PoolSpace>;
    /// Remove one target of one rank from the pool membership.
    async fn exclude_target(&self, uuid: &str, rank: u32, target: u32) -> Result<()>;
    async fn set_pool_prop(&self, uuid: &str, prop: &Property) -> Result<()>;
    async fn get_pool_props(
        &self,
        uuid: &str,
        name: Option<&str>,
    ) -> Result<Vec<Property>>;
}

/// Container service and data-plane operations.
#[async_trait]
pub trait ContainerRpc: Send + Sync {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<()>;
    async fn container_exists(&self, uuid: &str) -> Result<bool>;
    async fn destroy_container(&self, uuid: &str) -> Result<()>;
    /// Write a set of objects whose primary placement is the given rank.
    /// Returns the number of objects written.
    async fn write_objects(&self, cont: &str, rank: u32, oclass: &str) -> Result<u64>;
    /// Re-read every object, verifying content byte-for-byte. Returns the
    /// number of objects read.
    async fn read_objects(&self, cont: &str) -> Result<u64>;
    /// Object count per rank currently holding container data.
    async fn target_rank_counts(&self, cont: &str) -> Result<HashMap<u32, u64>>;
    async fn set_cont_prop(&self, cont: &str, prop: &Property) -> Result<()>;
    async fn get_cont_props(
        &self,
        cont: &str,
        name: Option<&str>,
    ) -> Result<Vec<Property>>;
    async fn query_container(&self, cont: &str) -> Result<ContainerStatus>;
    async fn create_snap(&self, cont: &str) -> Result<u64>;
    async fn destroy_snap(&self, cont: &str, epoch: u64) -> Result<()>;
    async fn list_snaps(&self, cont: &str) -> Result<Vec<u64>>;
}

/// Per-host storage device queries and fault control.
#[async_trait]
pub trait StorageQuery: Send + Sync {
    async fn device_uuids(&self) -> Result<HashMap<String, Vec<DeviceInfo>>>;
    async fn set_device_faulty(&self, host: &str, uuid: &str) -> Result<()>;
    async fn led_identify_reset(&self, host: &str, uuid: &str) -> Result<()>;
}

/// External I/O benchmark tool invocation.
#[async_trait]
pub trait IoBench: Send + Sync {
    async fn run(&self, job: &BenchJob) -> Result<BenchOutput>;
}

/// A user-space filesystem view over a container.
#[async_trait]
pub trait FsMount: Send + Sync {
    async fn mount(&self) -> Result<()>;
    async fn unmount(&self) -> Result<()>;
    /// Remount with the same mount handle.
    async fn remount(&self) -> Result<()> {
        self.unmount().await?;
        self.mount().await
    }
    fn mount_point(&self) -> &str;
}

/// Cloneable bundle of the cluster's control and data interfaces.
#[derive(Clone)]
pub struct ClusterHandle {
    pub system: Arc<dyn SystemCtl>,
    pub pool: Arc<dyn PoolRpc>,
    pub container: Arc<dyn ContainerRpc>,
    pub storage: Arc<dyn StorageQuery>,
    pub bench: Arc<dyn IoBench>,
}
