//! Whole-system engine stop/restart with rank-state verification.

use std::time::Duration;

use tracing::info;

use crate::{
    cluster::{ClusterHandle, RankState},
    error::{PostconditionSnafu, Result},
    poller::Poller,
};

/// Drives clean shutdown and restart of every engine in the cluster, as the
/// replay scenarios need around a WAL-replay restart.
pub struct SystemManager {
    cluster: ClusterHandle,
    rank_check: Poller,
}

impl SystemManager {
    pub fn new(cluster: ClusterHandle) -> Self {
        Self {
            cluster,
            rank_check: Poller::attempts(Duration::from_secs(1), 5),
        }
    }

    /// Override the rank-state verification cadence.
    pub fn with_rank_check(mut self, interval: Duration, attempts: u32) -> Self {
        self.rank_check = Poller::attempts(interval, attempts);
        self
    }

    /// Stop every engine rank and verify none is left running.
    pub async fn stop_engines(&self) -> Result<()> {
        info!("shutting down the engines");
        let ranks = self.cluster.system.all_ranks().await?;
        self.cluster.system.stop_ranks(&ranks, true).await?;
        self.check_rank_states(&ranks, &[RankState::Stopped, RankState::Excluded])
            .await
    }

    /// Restart the engines and verify every rank joined.
    pub async fn restart_engines(&self) -> Result<()> {
        info!("restarting the engines");
        let ranks = self.cluster.system.all_ranks().await?;
        self.cluster.system.start_ranks(&ranks).await?;
        self.check_rank_states(&ranks, &[RankState::Joined]).await
    }

    /// Poll with a bounded attempt count until every rank is in one of the
    /// allowed states; the failure names the ranks that never transitioned.
    pub async fn check_rank_states(
        &self,
        ranks: &[u32],
        allowed: &[RankState],
    ) -> Result<()> {
        let outcome = self
            .rank_check
            .poll(
                || self.cluster.system.rank_states(ranks),
                |states| {
                    ranks.iter().all(|rank| {
                        states
                            .get(rank)
                            .map_or(false, |state| allowed.contains(state))
                    })
                },
            )
            .await?;

        if outcome.converged() {
            return Ok(());
        }

        let mut stragglers: Vec<String> = match &outcome.last {
            Some(states) => ranks
                .iter()
                .filter_map(|rank| match states.get(rank) {
                    Some(state) if allowed.contains(state) => None,
                    Some(state) => Some(format!("{rank}={state}")),
                    None => Some(format!("{rank}=unknown")),
                })
                .collect(),
            None => ranks.iter().map(|rank| format!("{rank}=unknown")).collect(),
        };
        stragglers.sort();

        PostconditionSnafu {
            reason: format!(
                "ranks failed to reach {:?}: {}",
                allowed
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join("/"),
                stragglers.join(", ")
            ),
        }
        .fail()
    }
}
