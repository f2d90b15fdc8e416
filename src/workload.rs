//! I/O workload definition and the load generator.
//!
//! A [`Workload`] describes one benchmark pass; auto modes size the run from
//! the pool's free capacity so a test can ask for "fill 50% of NVMe" and get
//! a block size that lands there after redundancy overheads.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::{
    cluster::{BenchJob, BenchMetrics, ClusterHandle, StorageClass},
    container::Container,
    error::{CommandFailedSnafu, Result},
    pool::Pool,
};

/// Replication spec between the first `_` and `G` of a class name,
/// e.g. the `2` of `RP_2GX` or the `4P1` of `EC_4P1GX`.
static REDUNDANCY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(.+?)G").unwrap());
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Redundancy layout encoded in an object class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redundancy {
    None,
    Replicated(u64),
    ErasureCoded { data: u64, parity: u64 },
}

/// Object class name, e.g. `SX`, `RP_2GX` or `EC_4P1GX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectClass {
    name: String,
}

impl ObjectClass {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names without a recognizable replication spec are unreplicated.
    pub fn redundancy(&self) -> Redundancy {
        let spec = match REDUNDANCY_RE.captures(&self.name) {
            Some(caps) => caps.get(1).unwrap().as_str().to_owned(),
            None => return Redundancy::None,
        };

        let mut numbers = DIGITS_RE
            .find_iter(&spec)
            .filter_map(|m| m.as_str().parse::<u64>().ok());

        if spec.contains('P') {
            match (numbers.next(), numbers.next()) {
                (Some(data), Some(parity)) => Redundancy::ErasureCoded { data, parity },
                _ => Redundancy::None,
            }
        } else {
            match numbers.next() {
                Some(replicas) => Redundancy::Replicated(replicas),
                None => Redundancy::None,
            }
        }
    }
}

/// What a workload pass does to the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadMode {
    Write,
    Read,
    WriteRead,
    /// Write with a block size computed from the requested fill percentage.
    AutoWrite,
    /// Read back what an earlier auto write produced.
    AutoRead,
}

impl WorkloadMode {
    pub fn is_auto(&self) -> bool {
        matches!(self, WorkloadMode::AutoWrite | WorkloadMode::AutoRead)
    }

    pub fn writes(&self) -> bool {
        matches!(
            self,
            WorkloadMode::Write | WorkloadMode::WriteRead | WorkloadMode::AutoWrite
        )
    }

    pub fn reads(&self) -> bool {
        matches!(
            self,
            WorkloadMode::Read | WorkloadMode::WriteRead | WorkloadMode::AutoRead
        )
    }
}

/// One I/O workload pass. Immutable once a run starts.
#[derive(Debug, Clone)]
pub struct Workload {
    mode: WorkloadMode,
    storage: StorageClass,
    fill_percent: u64,
    oclass: ObjectClass,
    transfer_size: Option<u64>,
    block_size: Option<u64>,
    processes: u32,
    create_container: bool,
    fail_on_warning: bool,
    env: HashMap<String, String>,
}

impl Workload {
    pub fn new(mode: WorkloadMode) -> Self {
        Self {
            mode,
            storage: StorageClass::Nvme,
            fill_percent: 1,
            oclass: ObjectClass::new("SX"),
            transfer_size: None,
            block_size: None,
            processes: 1,
            create_container: true,
            fail_on_warning: false,
            env: HashMap::new(),
        }
    }

    pub fn with_storage(mut self, storage: StorageClass) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_fill_percent(mut self, percent: u64) -> Self {
        assert!(
            (1..=100).contains(&percent),
            "Fill percentage must be within 1-100"
        );
        self.fill_percent = percent;
        self
    }

    pub fn with_object_class(mut self, oclass: ObjectClass) -> Self {
        self.oclass = oclass;
        self
    }

    pub fn with_transfer_size(mut self, bytes: u64) -> Self {
        self.transfer_size = Some(bytes);
        self
    }

    /// Explicit block size for non-auto modes.
    pub fn with_block_size(mut self, bytes: u64) -> Self {
        self.block_size = Some(bytes);
        self
    }

    pub fn with_processes(mut self, processes: u32) -> Self {
        assert!(processes > 0, "Process count must be set");
        self.processes = processes;
        self
    }

    pub fn with_create_container(mut self, create: bool) -> Self {
        self.create_container = create;
        self
    }

    /// Promote benchmark warnings to failures.
    pub fn with_fail_on_warning(mut self, fail: bool) -> Self {
        self.fail_on_warning = fail;
        self
    }

    pub fn with_env(mut self, name: &str, value: &str) -> Self {
        self.env.insert(name.to_owned(), value.to_owned());
        self
    }

    pub fn mode(&self) -> WorkloadMode {
        self.mode
    }

    pub fn storage(&self) -> StorageClass {
        self.storage
    }

    pub fn object_class(&self) -> &ObjectClass {
        &self.oclass
    }

    pub fn processes(&self) -> u32 {
        self.processes
    }

    pub fn fail_on_warning(&self) -> bool {
        self.fail_on_warning
    }

    /// Read modes always reuse the container written by an earlier pass.
    pub fn creates_container(&self) -> bool {
        match self.mode {
            WorkloadMode::Read | WorkloadMode::AutoRead => false,
            _ => self.create_container,
        }
    }

    /// Transfer size, defaulting per storage class.
    pub fn transfer_size(&self) -> u64 {
        self.transfer_size.unwrap_or(match self.storage {
            StorageClass::Scm => 2048,
            StorageClass::Nvme => 16 * 1024 * 1024,
        })
    }

    /// Block size that fills `fill_percent` of `free_space` once redundancy
    /// overhead is accounted for: an erasure-coded class writes parity on
    /// top of data, a replicated class writes every byte `n` times. The
    /// result is truncated to a multiple of the transfer size.
    pub fn block_size_for(&self, free_space: u64) -> u64 {
        let transfer = self.transfer_size();
        let mut size = free_space / 100 * self.fill_percent;

        match self.oclass.redundancy() {
            Redundancy::None => {}
            Redundancy::Replicated(replicas) => size /= replicas.max(1),
            Redundancy::ErasureCoded { data, parity } => {
                size = size / (data + parity) * data;
            }
        }

        size /= u64::from(self.processes);
        size / transfer * transfer
    }

    fn resolve_block_size(&self, free_space: Option<u64>) -> u64 {
        match free_space {
            Some(free) => self.block_size_for(free),
            None => self.block_size.expect("Block size must be set"),
        }
    }
}

/// Runs one workload pass against a container.
///
/// Failures come back as values; the generator is run from concurrent
/// campaign tasks and must never panic across the task boundary.
#[derive(Clone)]
pub struct LoadGenerator {
    cluster: ClusterHandle,
    pool: Pool,
    container: Container,
}

impl LoadGenerator {
    pub fn new(cluster: ClusterHandle, pool: Pool, container: Container) -> Self {
        Self {
            cluster,
            pool,
            container,
        }
    }

    pub async fn run(&self, workload: &Workload) -> Result<BenchMetrics> {
        let free_space = if workload.mode().is_auto() {
            Some(self.pool.free_space(workload.storage()).await?)
        } else {
            None
        };
        let block_size = workload.resolve_block_size(free_space);

        if workload.creates_container() && !self.container.exists().await? {
            self.container.create().await?;
        }

        let job = BenchJob {
            pool: self.pool.uuid().to_owned(),
            container: self.container.uuid().to_owned(),
            write: workload.mode().writes(),
            read: workload.mode().reads(),
            block_size,
            transfer_size: workload.transfer_size(),
            processes: workload.processes(),
            env: workload.env.clone(),
        };

        info!(
            pool = %job.pool,
            container = %job.container,
            block_size,
            "running benchmark pass"
        );
        let output = self.cluster.bench.run(&job).await?;

        if workload.fail_on_warning() {
            let warnings = output.warnings();
            if !warnings.is_empty() {
                return CommandFailedSnafu {
                    command: "bench",
                    error: format!("command issued warnings: {}", warnings.join("; ")),
                }
                .fail();
            }
        }

        output.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundancy_parsing() {
        assert_eq!(ObjectClass::new("SX").redundancy(), Redundancy::None);
        assert_eq!(ObjectClass::new("S1").redundancy(), Redundancy::None);
        assert_eq!(
            ObjectClass::new("RP_2GX").redundancy(),
            Redundancy::Replicated(2)
        );
        assert_eq!(
            ObjectClass::new("RP_3G1").redundancy(),
            Redundancy::Replicated(3)
        );
        assert_eq!(
            ObjectClass::new("EC_4P1GX").redundancy(),
            Redundancy::ErasureCoded { data: 4, parity: 1 }
        );
        assert_eq!(
            ObjectClass::new("EC_16P2G32").redundancy(),
            Redundancy::ErasureCoded {
                data: 16,
                parity: 2
            }
        );
    }

    #[test]
    fn ec_block_size_counts_parity_toward_the_fill() {
        // 100 GiB free, 10%, EC 4+1: 8 GiB of data plus 2 GiB of parity
        // land on the requested 10 GiB.
        let free = 100 * 1024 * 1024 * 1024;
        let w = Workload::new(WorkloadMode::AutoWrite)
            .with_fill_percent(10)
            .with_transfer_size(1024 * 1024)
            .with_object_class(ObjectClass::new("EC_4P1GX"));
        assert_eq!(w.block_size_for(free), 8 * 1024 * 1024 * 1024);
    }

    #[test]
    fn replicated_block_size_divides_by_replica_count() {
        let free = 90 * 1024 * 1024 * 1024;
        let w = Workload::new(WorkloadMode::AutoWrite)
            .with_fill_percent(30)
            .with_transfer_size(1024 * 1024)
            .with_object_class(ObjectClass::new("RP_3GX"));
        assert_eq!(w.block_size_for(free), 9 * 1024 * 1024 * 1024);
    }
}
