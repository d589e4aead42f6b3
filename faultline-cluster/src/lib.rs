//! # faultline-cluster
//!
//! The cluster state model the faultline scenarios are written against:
//! per-node observed status, partition discovery, quorum evaluation, and
//! fencing-cleanup bookkeeping, plus the contracts for the two external
//! collaborators every deployment supplies — the cluster-manager command/
//! pattern template table and the distributed log-convergence watcher.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod component;
pub mod env;
pub mod model;
pub mod resource;
pub mod templates;
pub mod watch;

pub use component::Component;
pub use env::TestEnv;
pub use model::{ClusterModel, NodeProbe, ObservedStatus};
pub use resource::ClusterResource;
pub use templates::ClusterTemplates;
pub use watch::{LogWatch, WatchFactory};
