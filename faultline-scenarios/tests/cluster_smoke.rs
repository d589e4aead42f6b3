//! Live-cluster smoke tests.
//!
//! These run against a real Pacemaker/corosync cluster reachable over
//! ssh as root, described by a TOML env file named in `FAULTLINE_ENV`.
//! No log-convergence watcher is wired up here, so probes rely on the
//! status command output alone; deployments plug their own
//! [`faultline_cluster::watch::WatchFactory`] for full runs.
//!
//! Run: `cargo test -p faultline-scenarios --test cluster_smoke -- --ignored`

use std::sync::Arc;

use serial_test::serial;

use faultline_cluster::templates::corosync::CorosyncTemplates;
use faultline_cluster::watch::mock::{MockWatchFactory, WatchPlan};
use faultline_cluster::{ClusterModel, NodeProbe, TestEnv};
use faultline_exec::{RemoteExec, RemoteShell};
use faultline_scenarios::scenario::ScenarioContext;
use faultline_scenarios::scenarios::stop_start::RestartScenario;
use faultline_scenarios::Scenario;

fn live_context() -> ScenarioContext {
    faultline_scenarios::init_logging();
    let path = std::env::var("FAULTLINE_ENV").expect("FAULTLINE_ENV not set");
    let env = Arc::new(TestEnv::from_file(std::path::Path::new(&path)).expect("env file"));

    let watches = MockWatchFactory::new();
    // No watcher: nothing ever matches, probes use command output.
    watches.on_default("node-idle", WatchPlan::match_none());
    watches.on_default("fencing", WatchPlan::match_none());

    let model = ClusterModel::new(
        Arc::clone(&env),
        Arc::new(RemoteExec::new(RemoteShell::default())),
        Arc::new(CorosyncTemplates::new()),
        Arc::new(watches),
    );
    ScenarioContext::new(env, model)
}

#[tokio::test]
#[serial]
#[ignore = "requires cluster"]
async fn probe_reaches_every_node() {
    let mut cx = live_context();
    for node in cx.env.nodes.clone() {
        let probe = cx.model.probe(&node).await.expect("probe failed");
        assert_ne!(
            probe,
            NodeProbe::Down,
            "expected {node} to be up before the run"
        );
    }
}

#[tokio::test]
#[serial]
#[ignore = "requires cluster"]
async fn healthy_cluster_has_quorum_and_one_partition() {
    let mut cx = live_context();
    cx.model.prepare().await.expect("prepare failed");
    let partitions = cx.model.find_partitions().await.expect("partition query");
    assert_eq!(partitions.len(), 1, "healthy cluster split: {partitions:?}");
    assert!(cx.model.has_quorum(None).await.expect("quorum query"));
}

#[tokio::test]
#[serial]
#[ignore = "requires cluster"]
async fn restart_one_node_end_to_end() {
    let mut cx = live_context();
    cx.model.prepare().await.expect("prepare failed");
    let node = cx.env.nodes.first().expect("env has nodes").clone();

    let mut restart = RestartScenario::new();
    let outcome = restart.run(&mut cx, &node).await;
    assert!(
        !outcome.is_failure(),
        "restart of {node} failed: {outcome:?}"
    );
}
