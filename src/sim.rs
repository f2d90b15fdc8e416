//! In-memory cluster simulation.
//!
//! Implements every external interface against process-local state so the
//! harness logic can be exercised hermetically. Rebuild progress is driven
//! by pool queries: each query advances the simulated rebuild one tick,
//! which makes convergence deterministic for the tests.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use tracing::debug;

use crate::{
    cluster::{
        BenchJob,
        BenchOutput,
        ClusterHandle,
        ContainerRpc,
        ContainerSpec,
        ContainerStatus,
        DeviceInfo,
        FsMount,
        IoBench,
        PoolInfo,
        PoolQuery,
        PoolRpc,
        PoolSpace,
        PoolSpec,
        Property,
        RankState,
        RebuildState,
        RebuildStatus,
        StorageQuery,
        SystemCtl,
    },
    error::{CommandFailedSnafu, DataIntegritySnafu, Error, Result},
};

const OBJECTS_PER_WRITE: u64 = 8;
const RECORDS_PER_OBJECT: u64 = 8;

/// Shape and pacing of the simulated cluster.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub ranks: u32,
    pub targets_per_rank: u32,
    pub scm_capacity: u64,
    pub nvme_capacity: u64,
    /// Pool queries a rebuild spends pending before it reports running.
    pub rebuild_pending_polls: u32,
    /// Pool queries a rebuild spends running before it completes.
    pub rebuild_running_polls: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ranks: 4,
            targets_per_rank: 8,
            scm_capacity: 16 * 1024 * 1024 * 1024,
            nvme_capacity: 256 * 1024 * 1024 * 1024,
            rebuild_pending_polls: 1,
            rebuild_running_polls: 3,
        }
    }
}

/// Scripted outcome for the next benchmark invocation.
#[derive(Debug, Clone)]
pub enum BenchBehavior {
    Succeed,
    /// Succeed, but emit a warning line in the output.
    Warn(String),
    Fail(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimRebuild {
    Idle,
    Pending { remaining: u32 },
    Running { remaining: u32 },
    Done,
}

#[derive(Debug)]
struct SimPool {
    name: String,
    disabled_targets: u32,
    rebuild: SimRebuild,
    objects_moved: u64,
    records_moved: u64,
    props: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct SimObject {
    rank: u32,
    data: Vec<u8>,
    digest: String,
}

#[derive(Debug)]
struct SimContainer {
    pool: String,
    objects: Vec<SimObject>,
    corrupted: bool,
    snaps: Vec<u64>,
    next_epoch: u64,
    props: HashMap<String, String>,
    bench_digest: Option<String>,
}

struct SimState {
    cfg: SimConfig,
    ranks: HashMap<u32, RankState>,
    hosts: HashMap<u32, String>,
    pools: HashMap<String, SimPool>,
    containers: HashMap<String, SimContainer>,
    devices: HashMap<String, Vec<DeviceInfo>>,
    faulted: Vec<(String, String)>,
    led_resets: Vec<(String, String)>,
    bench_plan: Vec<BenchBehavior>,
    rng: ChaCha8Rng,
}

impl SimState {
    /// Start a rebuild on every pool after a membership change.
    fn start_rebuilds(&mut self, disabled_per_pool: u32) {
        let pending = self.cfg.rebuild_pending_polls;
        for pool in self.pools.values_mut() {
            pool.disabled_targets += disabled_per_pool;
            pool.rebuild = SimRebuild::Pending { remaining: pending };
        }
    }

    /// Reassign every object on a non-joined rank to a surviving rank.
    fn migrate_orphans(&mut self, pool_uuid: &str) -> (u64, u64) {
        let mut survivors: Vec<u32> = self
            .ranks
            .iter()
            .filter(|(_, state)| **state == RankState::Joined)
            .map(|(rank, _)| *rank)
            .collect();
        survivors.sort_unstable();
        if survivors.is_empty() {
            return (0, 0);
        }

        let ranks = &self.ranks;
        let mut moved = 0u64;
        for container in self
            .containers
            .values_mut()
            .filter(|c| c.pool == pool_uuid)
        {
            let mut next = 0usize;
            for object in container.objects.iter_mut() {
                let joined = ranks
                    .get(&object.rank)
                    .map_or(false, |state| *state == RankState::Joined);
                if !joined {
                    object.rank = survivors[next % survivors.len()];
                    next += 1;
                    moved += 1;
                }
            }
        }
        (moved, moved * RECORDS_PER_OBJECT)
    }
}

fn not_found(command: &str, what: &str) -> Error {
    CommandFailedSnafu {
        command,
        error: format!("{what} not found"),
    }
    .build()
}

fn props_response(props: &HashMap<String, String>, name: Option<&str>) -> Vec<Property> {
    let mut response: Vec<Property> = props
        .iter()
        .filter(|(prop, _)| name.map_or(true, |n| n == prop.as_str()))
        .map(|(prop, value)| Property::new(prop, value))
        .collect();
    response.sort_by(|a, b| a.name.cmp(&b.name));
    response
}

/// Handle to the simulated cluster; clones share state.
#[derive(Clone)]
pub struct SimCluster {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimCluster {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl SimCluster {
    pub fn new(cfg: SimConfig) -> Self {
        let mut ranks = HashMap::new();
        let mut hosts = HashMap::new();
        let mut devices: HashMap<String, Vec<DeviceInfo>> = HashMap::new();
        for rank in 0..cfg.ranks {
            let host = format!("node{rank}");
            ranks.insert(rank, RankState::Joined);
            devices.entry(host.clone()).or_default().push(DeviceInfo {
                uuid: format!("sim-nvme-{rank}"),
                has_sys_xs: false,
            });
            hosts.insert(rank, host);
        }
        Self {
            state: Arc::new(Mutex::new(SimState {
                cfg,
                ranks,
                hosts,
                pools: HashMap::new(),
                containers: HashMap::new(),
                devices,
                faulted: Vec::new(),
                led_resets: Vec::new(),
                bench_plan: Vec::new(),
                rng: ChaCha8Rng::seed_from_u64(7),
            })),
        }
    }

    /// Bundle the simulation behind the cluster interface traits.
    pub fn handle(&self) -> ClusterHandle {
        let this = Arc::new(self.clone());
        ClusterHandle {
            system: this.clone(),
            pool: this.clone(),
            container: this.clone(),
            storage: this.clone(),
            bench: this,
        }
    }

    /// Queue a scripted outcome for the next benchmark invocation.
    pub fn plan_bench(&self, behavior: BenchBehavior) {
        self.state.lock().bench_plan.push(behavior);
    }

    pub fn add_device(&self, host: &str, uuid: &str, has_sys_xs: bool) {
        self.state
            .lock()
            .devices
            .entry(host.to_owned())
            .or_default()
            .push(DeviceInfo {
                uuid: uuid.to_owned(),
                has_sys_xs,
            });
    }

    /// Flip one data byte so the next read-back fails verification.
    pub fn corrupt_container(&self, cont: &str) {
        let mut state = self.state.lock();
        if let Some(container) = state.containers.get_mut(cont) {
            container.corrupted = true;
            if let Some(object) = container.objects.first_mut() {
                if let Some(byte) = object.data.first_mut() {
                    *byte = byte.wrapping_add(1);
                }
            }
        }
    }

    /// Model placement landing elsewhere: move every object off `rank`.
    pub fn move_objects_off_rank(&self, cont: &str, rank: u32) {
        let mut state = self.state.lock();
        let replacement = (rank + 1) % state.cfg.ranks;
        if let Some(container) = state.containers.get_mut(cont) {
            for object in container.objects.iter_mut() {
                if object.rank == rank {
                    object.rank = replacement;
                }
            }
        }
    }

    pub fn faulted_devices(&self) -> Vec<(String, String)> {
        self.state.lock().faulted.clone()
    }

    pub fn led_resets(&self) -> Vec<(String, String)> {
        self.state.lock().led_resets.clone()
    }

    pub fn rank_state(&self, rank: u32) -> Option<RankState> {
        self.state.lock().ranks.get(&rank).copied()
    }
}

#[async_trait]
impl SystemCtl for SimCluster {
    async fn stop_ranks(&self, ranks: &[u32], _force: bool) -> Result<()> {
        let mut state = self.state.lock();
        for rank in ranks {
            if !state.ranks.contains_key(rank) {
                return Err(not_found("system stop", &format!("rank {rank}")));
            }
        }

        let newly_stopped: Vec<u32> = ranks
            .iter()
            .copied()
            .filter(|rank| state.ranks.get(rank) == Some(&RankState::Joined))
            .collect();
        for rank in ranks {
            state.ranks.insert(*rank, RankState::Stopped);
        }

        let survivors = state
            .ranks
            .values()
            .any(|rank_state| *rank_state == RankState::Joined);
        // A partial stop leaves survivors to rebuild onto; a clean
        // full-system stop does not degrade the pools.
        if !newly_stopped.is_empty() && survivors {
            let disabled = state.cfg.targets_per_rank * newly_stopped.len() as u32;
            state.start_rebuilds(disabled);
        }
        debug!(?ranks, "stopped ranks");
        Ok(())
    }

    async fn start_ranks(&self, ranks: &[u32]) -> Result<()> {
        let mut state = self.state.lock();
        for rank in ranks {
            if !state.ranks.contains_key(rank) {
                return Err(not_found("system start", &format!("rank {rank}")));
            }
        }
        for rank in ranks {
            state.ranks.insert(*rank, RankState::Joined);
        }
        Ok(())
    }

    async fn rank_states(&self, ranks: &[u32]) -> Result<HashMap<u32, RankState>> {
        let state = self.state.lock();
        Ok(ranks
            .iter()
            .filter_map(|rank| state.ranks.get(rank).map(|s| (*rank, *s)))
            .collect())
    }

    async fn all_ranks(&self) -> Result<Vec<u32>> {
        let state = self.state.lock();
        let mut ranks: Vec<u32> = state.ranks.keys().copied().collect();
        ranks.sort_unstable();
        Ok(ranks)
    }

    async fn host_ranks(&self, host: &str) -> Result<Vec<u32>> {
        let state = self.state.lock();
        let mut ranks: Vec<u32> = state
            .hosts
            .iter()
            .filter(|(_, h)| h.as_str() == host)
            .map(|(rank, _)| *rank)
            .collect();
        ranks.sort_unstable();
        Ok(ranks)
    }
}

#[async_trait]
impl PoolRpc for SimCluster {
    async fn create_pool(&self, spec: &PoolSpec) -> Result<()> {
        let mut state = self.state.lock();
        if state.pools.contains_key(&spec.uuid) {
            return CommandFailedSnafu {
                command: "pool create",
                error: format!("pool {} already exists", spec.uuid),
            }
            .fail();
        }
        state.pools.insert(
            spec.uuid.clone(),
            SimPool {
                name: spec.name.clone(),
                disabled_targets: 0,
                rebuild: SimRebuild::Idle,
                objects_moved: 0,
                records_moved: 0,
                props: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn destroy_pool(&self, uuid: &str) -> Result<()> {
        let mut state = self.state.lock();
        state
            .pools
            .remove(uuid)
            .ok_or_else(|| not_found("pool destroy", &format!("pool {uuid}")))?;
        state.containers.retain(|_, c| c.pool != uuid);
        Ok(())
    }

    async fn query_pool(&self, uuid: &str) -> Result<PoolQuery> {
        let mut state = self.state.lock();
        let node_count = state.cfg.ranks;
        let target_count = state.cfg.ranks * state.cfg.targets_per_rank;
        let running_polls = state.cfg.rebuild_running_polls;

        let rebuild = state
            .pools
            .get(uuid)
            .ok_or_else(|| not_found("pool query", &format!("pool {uuid}")))?
            .rebuild;

        // Each query advances the rebuild one tick.
        let next = match rebuild {
            SimRebuild::Idle => SimRebuild::Idle,
            SimRebuild::Done => SimRebuild::Done,
            SimRebuild::Pending { remaining: 0 } => SimRebuild::Running {
                remaining: running_polls,
            },
            SimRebuild::Pending { remaining } => SimRebuild::Pending {
                remaining: remaining - 1,
            },
            SimRebuild::Running { remaining: 0 } => {
                let (objects, records) = state.migrate_orphans(uuid);
                let pool = state.pools.get_mut(uuid).unwrap();
                pool.objects_moved += objects;
                pool.records_moved += records;
                SimRebuild::Done
            }
            SimRebuild::Running { remaining } => SimRebuild::Running {
                remaining: remaining - 1,
            },
        };

        let pool = state.pools.get_mut(uuid).unwrap();
        pool.rebuild = next;

        Ok(PoolQuery {
            info: PoolInfo {
                uuid: uuid.to_owned(),
                node_count,
                target_count,
                disabled_targets: pool.disabled_targets,
            },
            rebuild: RebuildStatus {
                state: match pool.rebuild {
                    SimRebuild::Idle | SimRebuild::Pending { .. } => RebuildState::Idle,
                    SimRebuild::Running { .. } => RebuildState::Running,
                    SimRebuild::Done => RebuildState::Done,
                },
                objects: pool.objects_moved,
                records: pool.records_moved,
                errno: 0,
            },
        })
    }

    async fn pool_space(&self, uuid: &str) -> Result<PoolSpace> {
        let state = self.state.lock();
        if !state.pools.contains_key(uuid) {
            return Err(not_found("pool query", &format!("pool {uuid}")));
        }
        Ok(PoolSpace {
            scm_free: state.cfg.scm_capacity,
            nvme_free: state.cfg.nvme_capacity,
        })
    }

    async fn exclude_target(&self, uuid: &str, rank: u32, target: u32) -> Result<()> {
        let mut state = self.state.lock();
        if !state.ranks.contains_key(&rank) {
            return Err(not_found("pool exclude", &format!("rank {rank}")));
        }
        if target >= state.cfg.targets_per_rank {
            return Err(not_found(
                "pool exclude",
                &format!("target {target} on rank {rank}"),
            ));
        }
        let pending = state.cfg.rebuild_pending_polls;
        let pool = state
            .pools
            .get_mut(uuid)
            .ok_or_else(|| not_found("pool exclude", &format!("pool {uuid}")))?;
        pool.disabled_targets += 1;
        pool.rebuild = SimRebuild::Pending { remaining: pending };
        Ok(())
    }

    async fn set_pool_prop(&self, uuid: &str, prop: &Property) -> Result<()> {
        let mut state = self.state.lock();
        let pool = state
            .pools
            .get_mut(uuid)
            .ok_or_else(|| not_found("pool set-prop", &format!("pool {uuid}")))?;
        pool.props.insert(prop.name.clone(), prop.value.clone());
        Ok(())
    }

    async fn get_pool_props(
        &self,
        uuid: &str,
        name: Option<&str>,
    ) -> Result<Vec<Property>> {
        let state = self.state.lock();
        let pool = state
            .pools
            .get(uuid)
            .ok_or_else(|| not_found("pool get-prop", &format!("pool {uuid}")))?;
        Ok(props_response(&pool.props, name))
    }
}

#[async_trait]
impl ContainerRpc for SimCluster {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        let mut state = self.state.lock();
        if !state.pools.contains_key(&spec.pool) {
            return Err(not_found("container create", &format!("pool {}", spec.pool)));
        }
        if state.containers.contains_key(&spec.uuid) {
            return CommandFailedSnafu {
                command: "container create",
                error: format!("container {} already exists", spec.uuid),
            }
            .fail();
        }
        let props = spec
            .properties
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect();
        state.containers.insert(
            spec.uuid.clone(),
            SimContainer {
                pool: spec.pool.clone(),
                objects: Vec::new(),
                corrupted: false,
                snaps: Vec::new(),
                next_epoch: 1,
                props,
                bench_digest: None,
            },
        );
        Ok(())
    }

    async fn container_exists(&self, uuid: &str) -> Result<bool> {
        Ok(self.state.lock().containers.contains_key(uuid))
    }

    async fn destroy_container(&self, uuid: &str) -> Result<()> {
        self.state
            .lock()
            .containers
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| not_found("container destroy", &format!("container {uuid}")))
    }

    async fn write_objects(&self, cont: &str, rank: u32, _oclass: &str) -> Result<u64> {
        let mut state = self.state.lock();
        if !state.containers.contains_key(cont) {
            return Err(not_found("object write", &format!("container {cont}")));
        }
        if state.ranks.get(&rank) != Some(&RankState::Joined) {
            return CommandFailedSnafu {
                command: "object write",
                error: format!("rank {rank} is not joined"),
            }
            .fail();
        }

        let mut objects = Vec::with_capacity(OBJECTS_PER_WRITE as usize);
        for _ in 0..OBJECTS_PER_WRITE {
            let mut data = vec![0u8; 64];
            state.rng.fill(&mut data[..]);
            let digest = hex::encode(md5::compute(&data).0);
            objects.push(SimObject { rank, data, digest });
        }
        let container = state.containers.get_mut(cont).unwrap();
        container.objects.extend(objects);
        Ok(OBJECTS_PER_WRITE)
    }

    async fn read_objects(&self, cont: &str) -> Result<u64> {
        let state = self.state.lock();
        let container = state
            .containers
            .get(cont)
            .ok_or_else(|| not_found("object read", &format!("container {cont}")))?;
        for (index, object) in container.objects.iter().enumerate() {
            let digest = hex::encode(md5::compute(&object.data).0);
            if digest != object.digest {
                return DataIntegritySnafu {
                    reason: format!(
                        "container {cont} object {index}: digest {digest} does not match {}",
                        object.digest
                    ),
                }
                .fail();
            }
        }
        Ok(container.objects.len() as u64)
    }

    async fn target_rank_counts(&self, cont: &str) -> Result<HashMap<u32, u64>> {
        let state = self.state.lock();
        let container = state
            .containers
            .get(cont)
            .ok_or_else(|| not_found("object query", &format!("container {cont}")))?;
        let mut counts: HashMap<u32, u64> = HashMap::new();
        for object in &container.objects {
            *counts.entry(object.rank).or_default() += 1;
        }
        Ok(counts)
    }

    async fn set_cont_prop(&self, cont: &str, prop: &Property) -> Result<()> {
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(cont)
            .ok_or_else(|| not_found("container set-prop", &format!("container {cont}")))?;
        container.props.insert(prop.name.clone(), prop.value.clone());
        Ok(())
    }

    async fn get_cont_props(
        &self,
        cont: &str,
        name: Option<&str>,
    ) -> Result<Vec<Property>> {
        let state = self.state.lock();
        let container = state
            .containers
            .get(cont)
            .ok_or_else(|| not_found("container get-prop", &format!("container {cont}")))?;
        Ok(props_response(&container.props, name))
    }

    async fn query_container(&self, cont: &str) -> Result<ContainerStatus> {
        let state = self.state.lock();
        let container = state
            .containers
            .get(cont)
            .ok_or_else(|| not_found("container query", &format!("container {cont}")))?;
        Ok(ContainerStatus {
            health: container
                .props
                .get("status")
                .cloned()
                .unwrap_or_else(|| "healthy".to_string()),
        })
    }

    async fn create_snap(&self, cont: &str) -> Result<u64> {
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(cont)
            .ok_or_else(|| not_found("snapshot create", &format!("container {cont}")))?;
        let epoch = container.next_epoch;
        container.next_epoch += 1;
        container.snaps.push(epoch);
        Ok(epoch)
    }

    async fn destroy_snap(&self, cont: &str, epoch: u64) -> Result<()> {
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(cont)
            .ok_or_else(|| not_found("snapshot destroy", &format!("container {cont}")))?;
        match container.snaps.iter().position(|e| *e == epoch) {
            Some(index) => {
                container.snaps.remove(index);
                Ok(())
            }
            None => Err(not_found("snapshot destroy", &format!("epoch {epoch}"))),
        }
    }

    async fn list_snaps(&self, cont: &str) -> Result<Vec<u64>> {
        let state = self.state.lock();
        let container = state
            .containers
            .get(cont)
            .ok_or_else(|| not_found("snapshot list", &format!("container {cont}")))?;
        Ok(container.snaps.clone())
    }
}

#[async_trait]
impl StorageQuery for SimCluster {
    async fn device_uuids(&self) -> Result<HashMap<String, Vec<DeviceInfo>>> {
        Ok(self.state.lock().devices.clone())
    }

    async fn set_device_faulty(&self, host: &str, uuid: &str) -> Result<()> {
        let mut state = self.state.lock();
        let device = state
            .devices
            .get(host)
            .and_then(|devices| devices.iter().find(|d| d.uuid == uuid))
            .cloned()
            .ok_or_else(|| {
                not_found("storage set-faulty", &format!("device {uuid} on {host}"))
            })?;

        if device.has_sys_xs {
            // Taking out the system metadata device kills the hosting
            // engine; the control plane refuses the request itself.
            let ranks: Vec<u32> = state
                .hosts
                .iter()
                .filter(|(_, h)| h.as_str() == host)
                .map(|(rank, _)| *rank)
                .collect();
            for rank in ranks {
                state.ranks.insert(rank, RankState::Stopped);
            }
            return CommandFailedSnafu {
                command: "storage set-faulty",
                error: format!("device {uuid} hosts system metadata"),
            }
            .fail();
        }

        state.faulted.push((host.to_owned(), uuid.to_owned()));
        state.start_rebuilds(1);
        Ok(())
    }

    async fn led_identify_reset(&self, host: &str, uuid: &str) -> Result<()> {
        let mut state = self.state.lock();
        let known = state
            .devices
            .get(host)
            .map_or(false, |devices| devices.iter().any(|d| d.uuid == uuid));
        if !known {
            return Err(not_found(
                "storage led identify",
                &format!("device {uuid} on {host}"),
            ));
        }
        state
            .faulted
            .retain(|(h, u)| !(h == host && u == uuid));
        state.led_resets.push((host.to_owned(), uuid.to_owned()));
        Ok(())
    }
}

#[async_trait]
impl IoBench for SimCluster {
    async fn run(&self, job: &BenchJob) -> Result<BenchOutput> {
        let mut state = self.state.lock();
        let behavior = if state.bench_plan.is_empty() {
            BenchBehavior::Succeed
        } else {
            state.bench_plan.remove(0)
        };

        if let BenchBehavior::Fail(error) = &behavior {
            return CommandFailedSnafu {
                command: "bench",
                error: error.clone(),
            }
            .fail();
        }

        if !state.containers.contains_key(&job.container) {
            return Err(not_found("bench", &format!("container {}", job.container)));
        }

        if job.write {
            let mut data = vec![0u8; 128];
            state.rng.fill(&mut data[..]);
            let digest = hex::encode(md5::compute(&data).0);
            let container = state.containers.get_mut(&job.container).unwrap();
            container.bench_digest = Some(digest);
        }
        if job.read {
            let container = state.containers.get(&job.container).unwrap();
            if container.bench_digest.is_none() {
                return CommandFailedSnafu {
                    command: "bench",
                    error: "read issued before any write pass".to_string(),
                }
                .fail();
            }
            if container.corrupted {
                return CommandFailedSnafu {
                    command: "bench",
                    error: "verify failed: data miscompare".to_string(),
                }
                .fail();
            }
        }

        let mut lines = vec![format!(
            "bench: pool={} cont={} bs={} tx={} np={}",
            job.pool, job.container, job.block_size, job.transfer_size, job.processes
        )];
        if let BenchBehavior::Warn(warning) = &behavior {
            lines.push(format!("WARNING: {warning}"));
        }
        lines.push(
            json!({
                "write_mib_s": if job.write { 981.4 } else { 0.0 },
                "read_mib_s": if job.read { 1294.2 } else { 0.0 },
                "bytes_moved": job.block_size * u64::from(job.processes),
            })
            .to_string(),
        );

        Ok(BenchOutput {
            stdout: lines.join("\n"),
        })
    }
}

/// Simulated user-space filesystem mount.
pub struct SimMount {
    mount_point: String,
    mounted: Mutex<bool>,
}

impl SimMount {
    pub fn new(mount_point: &str) -> Self {
        Self {
            mount_point: mount_point.to_owned(),
            mounted: Mutex::new(false),
        }
    }

    pub fn is_mounted(&self) -> bool {
        *self.mounted.lock()
    }
}

#[async_trait]
impl FsMount for SimMount {
    async fn mount(&self) -> Result<()> {
        let mut mounted = self.mounted.lock();
        if *mounted {
            return CommandFailedSnafu {
                command: "mount",
                error: format!("{} is already mounted", self.mount_point),
            }
            .fail();
        }
        *mounted = true;
        Ok(())
    }

    async fn unmount(&self) -> Result<()> {
        let mut mounted = self.mounted.lock();
        if !*mounted {
            return CommandFailedSnafu {
                command: "umount",
                error: format!("{} is not mounted", self.mount_point),
            }
            .fail();
        }
        *mounted = false;
        Ok(())
    }

    fn mount_point(&self) -> &str {
        &self.mount_point
    }
}
