//! Concurrent fault-under-load campaigns.
//!
//! A campaign runs one I/O workload pass while fault actions land on the
//! cluster, to exercise the rebuild-under-load path. Faults are delayed
//! until the load is in flight, fire together, and are joined before the
//! load; every task failure is aggregated, never propagated.

use std::{collections::HashSet, sync::Arc, time::Duration};

use futures::future::join_all;
use parking_lot::Mutex;
use snafu::ensure;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    error::{PreconditionSnafu, Result},
    fault::{FaultAction, FaultInjector},
    workload::{LoadGenerator, Workload},
};

/// Aggregated outcome of one campaign.
#[derive(Debug, Clone, Default)]
pub struct CampaignResult {
    pub failures: Vec<String>,
}

impl CampaignResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct ConcurrentCampaign {
    generator: LoadGenerator,
    injector: Arc<FaultInjector>,
    workload: Workload,
    faults: Vec<FaultAction>,
    fault_delay: Duration,
}

impl ConcurrentCampaign {
    pub fn new(
        generator: LoadGenerator,
        injector: Arc<FaultInjector>,
        workload: Workload,
    ) -> Self {
        Self {
            generator,
            injector,
            workload,
            faults: Vec::new(),
            fault_delay: Duration::from_secs(30),
        }
    }

    pub fn with_fault(mut self, action: FaultAction) -> Self {
        self.faults.push(action);
        self
    }

    pub fn with_faults(mut self, actions: Vec<FaultAction>) -> Self {
        self.faults.extend(actions);
        self
    }

    /// Wall-clock wait between load start and fault start.
    pub fn with_fault_delay(mut self, delay: Duration) -> Self {
        self.fault_delay = delay;
        self
    }

    /// Launch the load task, wait for it to be in flight, fire every fault
    /// task together, join the fault tasks, then join the load task.
    ///
    /// Worker failures (including panics) land in the result; the only
    /// error this returns is a campaign precondition violation.
    pub async fn run(&self) -> Result<CampaignResult> {
        self.check_distinct_targets()?;

        let failures = Arc::new(Mutex::new(Vec::new()));

        let load = {
            let generator = self.generator.clone();
            let workload = self.workload.clone();
            let failures = failures.clone();
            tokio::spawn(async move {
                match generator.run(&workload).await {
                    Ok(metrics) => {
                        info!(
                            write_mib_s = metrics.write_mib_s,
                            read_mib_s = metrics.read_mib_s,
                            "load pass finished"
                        );
                    }
                    Err(error) => {
                        failures.lock().push(format!("FAIL - load: {error}"));
                    }
                }
            })
        };

        let mut fault_tasks: Vec<JoinHandle<()>> = Vec::new();
        if !self.faults.is_empty() {
            tokio::time::sleep(self.fault_delay).await;
            for action in &self.faults {
                let injector = self.injector.clone();
                let action = action.clone();
                let failures = failures.clone();
                fault_tasks.push(tokio::spawn(async move {
                    if let Err(error) = injector.apply(&action).await {
                        failures
                            .lock()
                            .push(format!("FAIL - {}: {error}", action.describe()));
                    }
                }));
            }
        }

        // Fault tasks are joined strictly before the load task; fault
        // completion does not imply load completion.
        for joined in join_all(fault_tasks).await {
            if joined.is_err() {
                warn!("fault task panicked");
                failures.lock().push("FAIL - fault task panicked".to_owned());
            }
        }
        if load.await.is_err() {
            warn!("load task panicked");
            failures.lock().push("FAIL - load task panicked".to_owned());
        }

        let failures = std::mem::take(&mut *failures.lock());
        Ok(CampaignResult { failures })
    }

    /// At most one fault may be in flight per rank, per (rank, target) pair
    /// and per device within one campaign.
    fn check_distinct_targets(&self) -> Result<()> {
        let mut ranks = HashSet::new();
        let mut targets = HashSet::new();
        let mut devices = HashSet::new();
        for action in &self.faults {
            let duplicate = match action {
                FaultAction::KillRank { rank, .. } => !ranks.insert(*rank),
                FaultAction::ExcludeTarget { rank, target } => {
                    !targets.insert((*rank, *target))
                }
                FaultAction::SetDeviceFaulty { uuid, .. } => {
                    !devices.insert(uuid.clone())
                }
            };
            ensure!(
                !duplicate,
                PreconditionSnafu {
                    reason: format!("duplicate fault: {}", action.describe()),
                }
            );
        }
        Ok(())
    }
}
