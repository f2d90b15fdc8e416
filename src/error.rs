use std::time::Duration;

use snafu::Snafu;

/// Errors which can be encountered while driving the cluster under test.
///
/// Task-local failures inside concurrent campaign workers are captured as
/// strings and aggregated (see `campaign`); everything else is immediately
/// fatal to the calling test.
#[derive(Debug, Snafu, Clone)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Precondition failed: {reason}"))]
    Precondition { reason: String },

    #[snafu(display("{command} command failed: {error}"))]
    CommandFailed { command: String, error: String },

    #[snafu(display(
        "Timed out waiting for {what} after {attempts} attempts in {elapsed:?}"
    ))]
    ConvergenceTimeout {
        what: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[snafu(display("Postcondition failed: {reason}"))]
    Postcondition { reason: String },

    #[snafu(display("Data integrity check failed: {reason}"))]
    DataIntegrity { reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
