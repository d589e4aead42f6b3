//! Remote-managed node lifecycle.
//!
//! Converts one cluster node into a remote-managed node: its cluster
//! stack is stopped, the lightweight remote agent is started, and a
//! connection resource is attached from a surviving cluster node. One
//! failure mode is then exercised per variant, and teardown is
//! unconditional even on failure so remote-node definitions never leak
//! into subsequent scenarios.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use rand::{Rng, RngCore};
use tracing::{debug, error, warn};

use faultline_exec::ExecError;

use crate::scenario::{Outcome, Scenario, ScenarioContext, ScenarioCore};
use crate::scenarios::batch::BatchStart;
use crate::scenarios::stop_start::StopScenario;

const AGENT_RETRIES: u32 = 10;
const REMOTE_RSC: &str = "remote-rsc";

/// Which failure mode this instance exercises after conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMode {
    /// Set, query, and delete a permanent attribute on the remote node.
    Basic,
    /// Kill the agent: expect fencing, then restart and rejoin.
    KillAgent,
    /// Migrate the connection resource between cluster nodes.
    Migrate,
    /// Migrate, then fail the resource hosted on the remote node.
    RscFailure,
}

impl RemoteMode {
    fn scenario_name(self) -> &'static str {
        match self {
            RemoteMode::Basic => "remote-basic",
            RemoteMode::KillAgent => "remote-kill-agent",
            RemoteMode::Migrate => "remote-migrate",
            RemoteMode::RscFailure => "remote-rsc-fail",
        }
    }
}

/// Drive a cluster node through the remote-managed lifecycle.
pub struct RemoteNodeScenario {
    core: ScenarioCore,
    mode: RemoteMode,
    startall: BatchStart,
    stop: StopScenario,
    remote_node: String,
    agent_started: bool,
    node_added: bool,
    rsc_added: bool,
    use_reconnect_interval: bool,
    failed: bool,
    fail_reason: String,
}

impl RemoteNodeScenario {
    /// Create the scenario for one failure mode.
    pub fn new(mode: RemoteMode) -> Self {
        Self {
            core: ScenarioCore::new(mode.scenario_name()),
            mode,
            startall: BatchStart::new(),
            stop: StopScenario::new(),
            remote_node: String::new(),
            agent_started: false,
            node_added: false,
            rsc_added: false,
            use_reconnect_interval: false,
            failed: false,
            fail_reason: String::new(),
        }
    }

    fn reset(&mut self, cx: &mut ScenarioContext) {
        self.remote_node.clear();
        self.agent_started = false;
        self.node_added = false;
        self.rsc_added = false;
        self.use_reconnect_interval = cx.rng.gen_bool(0.5);
        self.failed = false;
        self.fail_reason.clear();
    }

    /// Record a failure; the first one becomes the reported reason.
    fn fail(&mut self, msg: String) {
        self.failed = true;
        error!("{msg}");
        if self.fail_reason.is_empty() {
            self.fail_reason = msg;
        }
    }

    /// A cluster node that is not the one being converted.
    fn other_node(&self, cx: &ScenarioContext, node: &str) -> String {
        cx.env
            .nodes
            .iter()
            .find(|n| *n != node)
            .cloned()
            .unwrap_or_else(|| node.to_string())
    }

    /// Make sure the shared agent key exists on every node. A key
    /// present everywhere is assumed to be the right one; otherwise it
    /// is regenerated across the fleet.
    async fn setup_env(&mut self, cx: &mut ScenarioContext, node: &str) -> Result<(), ExecError> {
        self.remote_node = format!("remote-{node}");
        let t = cx.templates();
        let key = t.remote_key_path();
        if cx.model.exec().exists_on_all(&key, &cx.env.nodes).await? {
            return Ok(());
        }

        debug!("regenerating the remote agent key on all nodes");
        let mut keyfile = tempfile::NamedTempFile::new()?;
        let mut key_bytes = vec![0u8; 4096];
        cx.rng.fill_bytes(&mut key_bytes);
        keyfile.write_all(&key_bytes)?;

        let local = keyfile.path().to_string_lossy().to_string();
        for n in cx.env.nodes.clone() {
            cx.run_on(&n, &format!("mkdir -p $(dirname {key})")).await?;
            let rc = cx
                .model
                .exec()
                .copy(&local, &format!("root@{n}:{key}"))
                .await?;
            if rc != 0 {
                warn!("could not install the agent key on {n}");
            }
            cx.run_on(&n, &format!("chmod 0640 {key}")).await?;
        }
        Ok(())
    }

    async fn start_agent(&mut self, cx: &mut ScenarioContext, node: &str) -> Result<(), ExecError> {
        let t = cx.templates();
        for _ in 0..AGENT_RETRIES {
            let result = cx.run_on(node, &t.remote_agent_start_cmd(node)).await?;
            if result.success() {
                self.agent_started = true;
                return Ok(());
            }
            if result.exit_code == 127 {
                // Agent not installed; retrying cannot help.
                warn!("remote agent command missing on {node}");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(cx.env.settle_delay_secs)).await;
        }
        Ok(())
    }

    async fn stop_agent(&mut self, cx: &mut ScenarioContext, node: &str) -> Result<(), ExecError> {
        let t = cx.templates();
        for _ in 0..AGENT_RETRIES {
            let result = cx.run_on(node, &t.remote_agent_stop_cmd(node)).await?;
            if result.success() || result.exit_code == 127 {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(cx.env.settle_delay_secs)).await;
        }
        Ok(())
    }

    /// Shut the cluster stack down on `node` and attach it as a
    /// remote-managed node instead.
    async fn start_metal(&mut self, cx: &mut ScenarioContext, node: &str) -> Result<(), ExecError> {
        let t = cx.templates();
        // Clear leftovers from an earlier run.
        cx.run_on(node, &t.delete_resource_cmd(REMOTE_RSC)).await?;
        cx.run_on(node, &t.delete_resource_cmd(&self.remote_node))
            .await?;

        if self.stop.run(cx, node).await.is_failure() {
            self.fail(format!("failed to shut down cluster node {node}"));
            return Ok(());
        }
        self.start_agent(cx, node).await?;
        if !self.agent_started {
            self.fail(format!("failed to start the remote agent on {node}"));
            return Ok(());
        }

        let patterns = [
            t.pat_resource_op_ok(&self.remote_node, "start"),
            t.pat_dc_idle(),
        ];
        let hosts = cx.env.nodes.clone();
        let mut watch = cx.arm("remote-init", &patterns, 120, &hosts).await;

        let other = self.other_node(cx, node);
        if self.use_reconnect_interval {
            cx.run_on(&other, &t.set_recheck_interval_cmd("45s")).await?;
        }
        let cmd =
            t.add_connection_resource_cmd(&self.remote_node, node, self.use_reconnect_interval);
        let result = cx.run_on(&other, &cmd).await?;
        if !result.success() {
            self.fail("connection resource creation failed".into());
            return Ok(());
        }
        self.node_added = true;

        self.core_mut().set_timer("remote-init");
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("remote-init");
        if !watch.unmatched_patterns().is_empty() {
            self.fail(format!(
                "unmatched patterns: {:?}",
                watch.unmatched_patterns()
            ));
        }
        Ok(())
    }

    /// Place a throwaway resource on the remote node.
    async fn add_dummy_rsc(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<(), ExecError> {
        if self.failed {
            return Ok(());
        }
        let t = cx.templates();
        let patterns = [
            t.pat_resource_remote_op_ok(REMOTE_RSC, "start", &self.remote_node),
            t.pat_dc_idle(),
        ];
        let hosts = cx.env.nodes.clone();
        let mut watch = cx.arm("remote-rsc", &patterns, 120, &hosts).await;

        let other = self.other_node(cx, node);
        let result = cx
            .run_on(&other, &t.add_dummy_resource_cmd(REMOTE_RSC, &self.remote_node))
            .await?;
        if !result.success() {
            self.fail("resource creation failed".into());
            return Ok(());
        }
        self.rsc_added = true;

        let result = cx
            .run_on(
                node,
                &t.move_resource_cmd(REMOTE_RSC, Some(&self.remote_node)),
            )
            .await?;
        if !result.success() {
            self.fail("failed to place the resource on the remote node".into());
            return Ok(());
        }

        self.core_mut().set_timer("remote-rsc");
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("remote-rsc");
        if !watch.unmatched_patterns().is_empty() {
            self.fail(format!(
                "unmatched patterns: {:?}",
                watch.unmatched_patterns()
            ));
        }
        Ok(())
    }

    /// Migrate the connection resource off its current host.
    async fn migrate_connection(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<(), ExecError> {
        if self.failed {
            return Ok(());
        }
        let t = cx.templates();
        let patterns = [
            t.pat_resource_op_ok(&self.remote_node, "migrate_to"),
            t.pat_resource_op_ok(&self.remote_node, "migrate_from"),
            t.pat_dc_idle(),
        ];
        let hosts = cx.env.nodes.clone();
        let mut watch = cx.arm("remote-migrate", &patterns, 120, &hosts).await;

        let result = cx
            .run_on(node, &t.move_resource_cmd(&self.remote_node, None))
            .await?;
        if !result.success() {
            self.fail("failed to move the remote node connection resource".into());
            return Ok(());
        }

        self.core_mut().set_timer("remote-migrate");
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("remote-migrate");
        if !watch.unmatched_patterns().is_empty() {
            self.fail(format!(
                "unmatched patterns: {:?}",
                watch.unmatched_patterns()
            ));
        }
        Ok(())
    }

    /// Fail the resource hosted on the remote node; it must recover
    /// there.
    async fn fail_rsc(&mut self, cx: &mut ScenarioContext, node: &str) -> Result<(), ExecError> {
        if self.failed {
            return Ok(());
        }
        let t = cx.templates();
        let patterns = [
            t.pat_resource_remote_op_ok(REMOTE_RSC, "stop", &self.remote_node),
            t.pat_resource_remote_op_ok(REMOTE_RSC, "start", &self.remote_node),
            t.pat_dc_idle(),
        ];
        let hosts = cx.env.nodes.clone();
        let mut watch = cx.arm("remote-rsc-fail", &patterns, 120, &hosts).await;

        debug!("failing the resource on the remote node");
        cx.run_on(node, &t.fail_resource_cmd(REMOTE_RSC, &self.remote_node))
            .await?;

        self.core_mut().set_timer("remote-rsc-fail");
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("remote-rsc-fail");
        if !watch.unmatched_patterns().is_empty() {
            self.fail(format!(
                "unmatched patterns during resource failure: {:?}",
                watch.unmatched_patterns()
            ));
        }
        Ok(())
    }

    /// Kill the agent; the remote node must be fenced, then rejoin
    /// once the agent is restarted.
    async fn fail_connection(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<(), ExecError> {
        if self.failed {
            return Ok(());
        }
        let t = cx.templates();
        let fence_patterns = [
            t.pat_fencing_ok(&self.remote_node),
            t.pat_node_fenced(&self.remote_node),
        ];
        let hosts = cx.env.nodes.clone();
        let mut watch = cx.arm("remote-fence", &fence_patterns, 120, &hosts).await;

        debug!("force-stopping the remote agent; fencing expected");
        self.stop_agent(cx, node).await?;

        self.core_mut().set_timer("remote-fence");
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("remote-fence");
        if !watch.unmatched_patterns().is_empty() {
            self.fail(format!(
                "unmatched patterns: {:?}",
                watch.unmatched_patterns()
            ));
            return Ok(());
        }

        debug!("waiting for the remote node host to answer again");
        for _ in 0..cx.env.settle_retries {
            if cx.run_on(node, "true").await?.success() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(cx.env.settle_delay_secs)).await;
        }

        let mut patterns = vec![t.pat_resource_op_ok(&self.remote_node, "start")];
        if self.rsc_added {
            patterns.push(t.pat_resource_remote_op_ok(REMOTE_RSC, "start", &self.remote_node));
        }
        let mut watch = cx.arm("remote-rejoin", &patterns, 240, &hosts).await;

        self.agent_started = false;
        self.start_agent(cx, node).await?;
        if !self.agent_started {
            self.fail(format!("failed to restart the remote agent on {node}"));
            return Ok(());
        }

        debug!("waiting for the remote node to rejoin after fencing");
        self.core_mut().set_timer("remote-rejoin");
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("remote-rejoin");
        if !watch.unmatched_patterns().is_empty() {
            self.fail(format!(
                "unmatched patterns: {:?}",
                watch.unmatched_patterns()
            ));
        }
        Ok(())
    }

    /// Permanent attributes must be settable on the remote node.
    async fn test_attributes(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<(), ExecError> {
        if self.failed {
            return Ok(());
        }
        let t = cx.templates();
        let rn = self.remote_node.clone();

        let result = cx
            .run_on(node, &t.set_node_attr_cmd(&rn, "testattr", "testval"))
            .await?;
        if !result.success() {
            self.fail("failed to set the remote node attribute".into());
            return Ok(());
        }
        let result = cx.run_on(node, &t.query_node_attr_cmd(&rn, "testattr")).await?;
        if !result.success() {
            self.fail("failed to get the remote node attribute".into());
            return Ok(());
        }
        let result = cx.run_on(node, &t.del_node_attr_cmd(&rn, "testattr")).await?;
        if !result.success() {
            self.fail("failed to delete the remote node attribute".into());
        }
        Ok(())
    }

    /// Unconditional teardown of everything the conversion created.
    async fn cleanup_metal(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<(), ExecError> {
        if !self.agent_started {
            return Ok(());
        }
        let t = cx.templates();
        let mut patterns = Vec::new();
        if self.rsc_added {
            patterns.push(t.pat_resource_op_ok(REMOTE_RSC, "stop"));
        }
        if self.node_added {
            patterns.push(t.pat_resource_op_ok(&self.remote_node, "stop"));
        }
        let hosts = cx.env.nodes.clone();
        let mut watch = cx.arm("remote-cleanup", &patterns, 120, &hosts).await;

        self.core_mut().set_timer("remote-cleanup");
        let other = self.other_node(cx, node);
        if self.use_reconnect_interval {
            debug!("cleaning up the recheck interval");
            cx.run_on(&other, &t.clear_recheck_interval_cmd()).await?;
        }
        if self.rsc_added {
            debug!("cleaning up the resource placed on the remote node");
            cx.run_on(node, &t.clear_moves_cmd(REMOTE_RSC)).await?;
            let result = cx.run_on(&other, &t.delete_resource_cmd(REMOTE_RSC)).await?;
            if !result.success() {
                self.fail(format!("removal of resource {REMOTE_RSC} failed"));
            }
        }
        if self.node_added {
            debug!("cleaning up the remote node connection resource");
            cx.run_on(node, &t.clear_moves_cmd(&self.remote_node)).await?;
            let result = cx
                .run_on(&other, &t.delete_resource_cmd(&self.remote_node))
                .await?;
            if !result.success() {
                self.fail(format!("removal of resource {} failed", self.remote_node));
            }
        }

        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("remote-cleanup");
        if !watch.unmatched_patterns().is_empty() {
            self.fail(format!(
                "unmatched patterns: {:?}",
                watch.unmatched_patterns()
            ));
        }

        self.stop_agent(cx, node).await?;

        debug!("waiting for the cluster to recover");
        cx.model.cluster_stable(None, false).await?;

        if self.node_added {
            debug!("purging the remote node from the membership records");
            cx.run_on(&other, &t.purge_node_cmd(&self.remote_node)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Scenario for RemoteNodeScenario {
    fn core(&self) -> &ScenarioCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ScenarioCore {
        &mut self.core
    }

    async fn is_applicable(&self, cx: &mut ScenarioContext) -> bool {
        if self.mode == RemoteMode::KillAgent && !cx.env.fencing_enabled {
            return false;
        }
        let t = cx.templates();
        for node in cx.env.nodes.clone() {
            match cx.run_on(&node, &t.remote_agent_check_cmd(&node)).await {
                Ok(result) if result.success() => {}
                _ => return false,
            }
        }
        true
    }

    async fn invoke(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<Outcome, ExecError> {
        self.reset(cx);

        if self.startall.run(cx, node).await.is_failure() {
            return Ok(self.core_mut().failure("setup failed, start all nodes failed"));
        }
        self.setup_env(cx, node).await?;
        self.start_metal(cx, node).await?;
        self.add_dummy_rsc(cx, node).await?;

        match self.mode {
            RemoteMode::Basic => self.test_attributes(cx, node).await?,
            RemoteMode::KillAgent => self.fail_connection(cx, node).await?,
            RemoteMode::Migrate => self.migrate_connection(cx, node).await?,
            RemoteMode::RscFailure => {
                // Migrating first verifies the migration kept control
                // of the remote node before we fail anything on it.
                self.migrate_connection(cx, node).await?;
                self.fail_rsc(cx, node).await?;
            }
        }

        // Unconditional: a failed run must not leak the remote node
        // definition into the next scenario.
        self.cleanup_metal(cx, node).await?;

        debug!("waiting for the cluster to recover");
        cx.model.cluster_stable(None, false).await?;

        if self.failed {
            let reason = self.fail_reason.clone();
            Ok(self.core_mut().failure(reason))
        } else {
            Ok(self.core_mut().success())
        }
    }

    fn errors_to_ignore(&self) -> Vec<String> {
        vec![
            "is running on remote.*which isn't allowed".into(),
            "Connection terminated".into(),
            "Failed to send remote".into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, mark_all_up};
    use faultline_cluster::watch::mock::WatchPlan;
    use faultline_cluster::ObservedStatus;

    fn seed_key(fx: &crate::testutil::Fixture) {
        std::fs::write(fx.dir.path().join("authkey"), "key").unwrap();
    }

    #[tokio::test]
    async fn remote_basic_full_cycle() {
        let mut fx = fixture(&["east", "west", "north"]);
        mark_all_up(&mut fx.cx);
        seed_key(&fx);

        let mut scenario = RemoteNodeScenario::new(RemoteMode::Basic);
        assert!(scenario.is_applicable(&mut fx.cx).await);
        let outcome = scenario.run(&mut fx.cx, "west").await;

        assert_eq!(outcome, Outcome::Success);
        // The converted node's cluster stack stays down; the agent was
        // stopped again by teardown.
        assert_eq!(fx.cx.model.status_of("west"), ObservedStatus::Down);
        assert!(!fx.templates.agent_running("west"));
        assert!(scenario.core().stats().consistent());
    }

    #[tokio::test]
    async fn kill_agent_expects_fencing_and_rejoin() {
        let mut fx = fixture(&["east", "west", "north"]);
        mark_all_up(&mut fx.cx);
        seed_key(&fx);

        let mut scenario = RemoteNodeScenario::new(RemoteMode::KillAgent);
        let outcome = scenario.run(&mut fx.cx, "west").await;

        assert_eq!(outcome, Outcome::Success);
        assert!(!fx.templates.agent_running("west"));
    }

    #[tokio::test]
    async fn migrate_and_rsc_failure_modes_succeed() {
        for mode in [RemoteMode::Migrate, RemoteMode::RscFailure] {
            let mut fx = fixture(&["east", "west", "north"]);
            mark_all_up(&mut fx.cx);
            seed_key(&fx);

            let mut scenario = RemoteNodeScenario::new(mode);
            let outcome = scenario.run(&mut fx.cx, "west").await;
            assert_eq!(outcome, Outcome::Success, "mode {mode:?}");
        }
    }

    #[tokio::test]
    async fn init_failure_still_tears_down() {
        let mut fx = fixture(&["east", "west", "north"]);
        mark_all_up(&mut fx.cx);
        seed_key(&fx);
        fx.watches.on("remote-init", WatchPlan::match_none());

        let mut scenario = RemoteNodeScenario::new(RemoteMode::Basic);
        let outcome = scenario.run(&mut fx.cx, "west").await;

        assert!(outcome.is_failure());
        // Cleanup ran regardless.
        assert!(!fx.templates.agent_running("west"));
    }

    #[tokio::test]
    async fn kill_agent_not_applicable_without_fencing() {
        let mut fx = fixture(&["east", "west"]);
        let mut env = (*fx.cx.env).clone();
        env.fencing_enabled = false;
        fx.cx.env = std::sync::Arc::new(env);

        let scenario = RemoteNodeScenario::new(RemoteMode::KillAgent);
        assert!(!scenario.is_applicable(&mut fx.cx).await);
    }
}
