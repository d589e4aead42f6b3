//! # faultline-scenarios
//!
//! The fault-injection scenarios: a shared lifecycle (applicability
//! gating, setup, invoke with statistics, teardown, audit), a catalog
//! of concrete scenarios built on the cluster model, and a sequential
//! runner that drives them with a seeded random source.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod runner;
pub mod scenario;
pub mod scenarios;
pub mod stats;

#[cfg(test)]
pub(crate) mod testutil;

pub use catalog::catalog;
pub use runner::{RunReport, ScenarioRunner, ScenarioSummary};
pub use scenario::{AuditCheck, Outcome, Scenario, ScenarioContext, ScenarioCore};
pub use stats::ScenarioStats;

/// Install the default tracing subscriber, honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
