//! Shared fixtures for scenario tests: a mock cluster made of a
//! scratch directory, the mock template table, the mock watcher, and a
//! loopback executor.

use std::sync::Arc;

use async_trait::async_trait;

use faultline_cluster::templates::mock::MockTemplates;
use faultline_cluster::watch::mock::{MockWatchFactory, WatchPlan};
use faultline_cluster::{ClusterModel, ObservedStatus, TestEnv};
use faultline_exec::{RemoteExec, RemoteShell};

use crate::scenario::{AuditCheck, ScenarioContext};

pub(crate) struct Fixture {
    pub dir: tempfile::TempDir,
    pub templates: MockTemplates,
    pub watches: MockWatchFactory,
    pub cx: ScenarioContext,
}

/// Build a mock cluster over the given node names. All timing knobs
/// are collapsed so settle loops run without sleeping; fencing watches
/// default to "nothing fenced".
pub(crate) fn fixture(nodes: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let templates = MockTemplates::new(dir.path(), nodes);
    let watches = MockWatchFactory::new();
    watches.on_default("fencing", WatchPlan::match_none());
    watches.on_default("component-fencing", WatchPlan::match_none());

    let env = Arc::new(TestEnv {
        nodes: nodes.iter().map(|n| n.to_string()).collect(),
        dead_time_secs: 5,
        stable_time_secs: 0,
        start_time_secs: 5,
        unsafe_tests: true,
        experimental_tests: true,
        loop_tests: false,
        fencing_enabled: true,
        at_boot: false,
        settle_retries: 3,
        settle_delay_secs: 0,
        seed: Some(42),
    });
    let exec = Arc::new(RemoteExec::new(RemoteShell::loopback()));
    let model = ClusterModel::new(
        Arc::clone(&env),
        exec,
        Arc::new(templates.clone()),
        Arc::new(watches.clone()),
    );
    let cx = ScenarioContext::new(env, model);

    Fixture {
        dir,
        templates,
        watches,
        cx,
    }
}

/// Mark every node up without probing.
pub(crate) fn mark_all_up(cx: &mut ScenarioContext) {
    for node in cx.env.nodes.clone() {
        cx.model.set_status(&node, ObservedStatus::Up);
    }
}

/// Audit asserting the observed partition count matches expectations.
pub(crate) struct PartitionCountAudit;

#[async_trait]
impl AuditCheck for PartitionCountAudit {
    fn name(&self) -> &str {
        "partition-count"
    }

    async fn check(&self, model: &mut ClusterModel) -> bool {
        match model.find_partitions().await {
            Ok(partitions) => partitions.len() == model.partitions_expected,
            Err(_) => false,
        }
    }
}
