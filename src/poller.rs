//! Convergence polling against external state.
//!
//! The cluster's internal state is only observable through periodic queries;
//! a [`Poller`] sleeps, queries, evaluates a predicate and repeats until the
//! predicate holds or the deadline policy gives up.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use tracing::debug;

use crate::error::{ConvergenceTimeoutSnafu, Result};

/// Deadline policy: give up on a wall-clock timeout, or after a bounded
/// number of attempts.
#[derive(Debug, Clone, Copy)]
pub enum Deadline {
    Timeout(Duration),
    Attempts(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollVerdict {
    /// The predicate held on the last observed state.
    Converged,
    /// The wall-clock deadline elapsed first.
    TimedOut,
    /// The attempt budget ran out first.
    Exhausted,
}

/// Outcome of one polling run.
#[derive(Debug, Clone)]
pub struct PollOutcome<S> {
    pub verdict: PollVerdict,
    pub last: Option<S>,
    pub elapsed: Duration,
    pub attempts: u32,
}

impl<S> PollOutcome<S> {
    pub fn converged(&self) -> bool {
        self.verdict == PollVerdict::Converged
    }

    /// Fatal-deadline policy: unwrap the converged state, or turn the
    /// outcome into a convergence error for the caller to propagate.
    pub fn expect_converged(self, what: &str) -> Result<S> {
        match self.verdict {
            PollVerdict::Converged => {
                Ok(self.last.expect("converged poll carries a state"))
            }
            _ => ConvergenceTimeoutSnafu {
                what,
                attempts: self.attempts,
                elapsed: self.elapsed,
            }
            .fail(),
        }
    }
}

/// Cooperative convergence poller: sleep `interval`, query, evaluate,
/// repeat until the predicate holds or the deadline gives up.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    deadline: Deadline,
}

impl Poller {
    pub fn new(interval: Duration, deadline: Deadline) -> Self {
        Self { interval, deadline }
    }

    pub fn timeout(interval: Duration, timeout: Duration) -> Self {
        Self::new(interval, Deadline::Timeout(timeout))
    }

    pub fn attempts(interval: Duration, attempts: u32) -> Self {
        Self::new(interval, Deadline::Attempts(attempts))
    }

    /// Poll until `predicate` holds for a queried state. Query errors
    /// propagate immediately; a missed deadline is returned as a verdict,
    /// not an error.
    pub async fn poll<S, Q, F, P>(&self, mut query: Q, predicate: P) -> Result<PollOutcome<S>>
    where
        Q: FnMut() -> F,
        F: Future<Output = Result<S>>,
        P: Fn(&S) -> bool,
    {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            tokio::time::sleep(self.interval).await;
            attempts += 1;

            let state = query().await?;
            if predicate(&state) {
                return Ok(PollOutcome {
                    verdict: PollVerdict::Converged,
                    last: Some(state),
                    elapsed: start.elapsed(),
                    attempts,
                });
            }

            debug!(attempts, "predicate not yet satisfied");

            let verdict = match self.deadline {
                Deadline::Timeout(timeout) if start.elapsed() >= timeout => {
                    Some(PollVerdict::TimedOut)
                }
                Deadline::Attempts(budget) if attempts >= budget => {
                    Some(PollVerdict::Exhausted)
                }
                _ => None,
            };
            if let Some(verdict) = verdict {
                return Ok(PollOutcome {
                    verdict,
                    last: Some(state),
                    elapsed: start.elapsed(),
                    attempts,
                });
            }
        }
    }
}
