//! Fault injection against the cluster control plane.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::{
    cluster::{ClusterHandle, RankState},
    error::{PostconditionSnafu, Result},
    pool::Pool,
    poller::Poller,
};

/// A single one-shot fault against the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultAction {
    /// Stop the rank's engine process without waiting for rebuild.
    KillRank { rank: u32, force: bool },
    /// Remove one target of one rank from the pool membership.
    ExcludeTarget { rank: u32, target: u32 },
    /// Mark an NVMe device faulty. `has_sys_xs` records whether the device
    /// hosts engine system metadata, which inverts the expected outcome.
    SetDeviceFaulty {
        host: String,
        uuid: String,
        has_sys_xs: bool,
    },
}

impl FaultAction {
    pub fn describe(&self) -> String {
        match self {
            FaultAction::KillRank { rank, .. } => format!("kill rank {rank}"),
            FaultAction::ExcludeTarget { rank, target } => {
                format!("exclude target {target} of rank {rank}")
            }
            FaultAction::SetDeviceFaulty { host, uuid, .. } => {
                format!("fault device {uuid} on {host}")
            }
        }
    }
}

/// Outcome of a fault application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// The fault was applied.
    Applied,
    /// The engine refused to fault a device hosting system metadata and the
    /// hosting ranks left the joined state. The refusal is the expected
    /// result, not an error.
    RefusedSysMetadata,
}

/// Issues fault actions and tracks the compensating device resets to run at
/// teardown.
pub struct FaultInjector {
    cluster: ClusterHandle,
    pool: Pool,
    pending_resets: Mutex<Vec<(String, String)>>,
    rank_check: Poller,
}

impl FaultInjector {
    pub fn new(cluster: ClusterHandle, pool: Pool) -> Self {
        Self {
            cluster,
            pool,
            pending_resets: Mutex::new(Vec::new()),
            rank_check: Poller::attempts(Duration::from_secs(1), 5),
        }
    }

    /// Override the rank-state verification cadence.
    pub fn with_rank_check(mut self, interval: Duration, attempts: u32) -> Self {
        self.rank_check = Poller::attempts(interval, attempts);
        self
    }

    pub async fn apply(&self, action: &FaultAction) -> Result<FaultOutcome> {
        info!("applying fault: {}", action.describe());
        match action {
            FaultAction::KillRank { rank, force } => {
                self.cluster.system.stop_ranks(&[*rank], *force).await?;
                Ok(FaultOutcome::Applied)
            }
            FaultAction::ExcludeTarget { rank, target } => {
                self.pool.exclude(*rank, *target).await?;
                Ok(FaultOutcome::Applied)
            }
            FaultAction::SetDeviceFaulty {
                host,
                uuid,
                has_sys_xs,
            } => self.set_device_faulty(host, uuid, *has_sys_xs).await,
        }
    }

    async fn set_device_faulty(
        &self,
        host: &str,
        uuid: &str,
        has_sys_xs: bool,
    ) -> Result<FaultOutcome> {
        match self.cluster.storage.set_device_faulty(host, uuid).await {
            Ok(()) if has_sys_xs => PostconditionSnafu {
                reason: format!(
                    "faulting system metadata device {uuid} on {host} should have failed"
                ),
            }
            .fail(),
            Ok(()) => {
                // Register the compensating reset for teardown.
                self.pending_resets
                    .lock()
                    .push((host.to_owned(), uuid.to_owned()));
                Ok(FaultOutcome::Applied)
            }
            Err(error) if has_sys_xs => {
                info!(%host, %uuid, "device fault refused as expected: {error}");
                self.verify_host_ranks_down(host).await?;
                Ok(FaultOutcome::RefusedSysMetadata)
            }
            Err(error) => Err(error),
        }
    }

    /// Faulting a system metadata device takes the hosting engine down;
    /// confirm its ranks left the joined state.
    async fn verify_host_ranks_down(&self, host: &str) -> Result<()> {
        let ranks = self.cluster.system.host_ranks(host).await?;
        self.rank_check
            .poll(
                || self.cluster.system.rank_states(&ranks),
                |states| {
                    states.values().all(|state| {
                        matches!(state, RankState::Stopped | RankState::Excluded)
                    })
                },
            )
            .await?
            .expect_converged(&format!("ranks on {host} to stop after device fault"))
            .map(|_| ())
    }

    /// Best-effort compensating resets, run at teardown regardless of the
    /// test outcome. Errors are collected, never raised.
    pub async fn run_cleanup(&self) -> Vec<String> {
        let pending = std::mem::take(&mut *self.pending_resets.lock());
        let mut errors = Vec::new();
        for (host, uuid) in pending {
            if let Err(error) =
                self.cluster.storage.led_identify_reset(&host, &uuid).await
            {
                warn!(%host, %uuid, "device reset failed: {error}");
                errors.push(format!("Error resetting device {uuid}: {error}"));
            }
        }
        errors
    }
}
