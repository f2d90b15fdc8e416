//! Fault injection and rebuild test support.
//!
//! This crate drives a distributed data-engine cluster through engineered
//! failures and verifies that its state converges back to an expected
//! shape. The cluster itself is external; the harness talks to it through
//! the interfaces in [`cluster`] and only ever observes it by polling.
//!
//! The moving parts:
//! - [`campaign`] runs an I/O workload concurrently with fault injection,
//! - [`rebuild`] sequences a full rebuild exercise end to end,
//! - [`poller`] waits for external state to converge on a predicate,
//! - [`sim`] is the in-memory cluster used by this crate's own tests.

use once_cell::sync::OnceCell;

pub mod campaign;
pub mod cluster;
pub mod container;
pub mod error;
pub mod fault;
pub mod poller;
pub mod pool;
pub mod rebuild;
pub mod sim;
pub mod system;
pub mod workload;

pub use error::{Error, Result};

static TRACING: OnceCell<()> = OnceCell::new();

/// Initialize tracing for a test run. Safe to call from every test; only
/// the first call installs the subscriber.
pub fn harness_test_init(log_level: Option<&str>) {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(log_level.unwrap_or("info"))
            .with_test_writer()
            .init();
    });
}

/// Generates a UUID and returns its string representation.
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}
