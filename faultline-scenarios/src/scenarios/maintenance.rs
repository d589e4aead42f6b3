//! Maintenance mode: resources must stop being managed while it is on
//! and return to management when it ends.
//!
//! A throwaway resource is failed right after maintenance mode engages,
//! to verify recovery is deferred until maintenance mode is turned off.

use async_trait::async_trait;
use tracing::{debug, info};

use faultline_exec::ExecError;

use crate::scenario::{Outcome, Scenario, ScenarioContext, ScenarioCore};
use crate::scenarios::batch::BatchStart;

const DUMMY_RID: &str = "maintenance-dummy";
const WATCH_TIMEOUT_SECS: u64 = 60;

/// Toggle maintenance mode and verify managed-state bookkeeping.
pub struct MaintenanceModeScenario {
    core: ScenarioCore,
    startall: BatchStart,
}

impl MaintenanceModeScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("maintenance-mode"),
            startall: BatchStart::new(),
        }
    }

    /// Flip maintenance mode and wait for the expected signatures.
    /// Returns the unmatched patterns rendered for the failure report,
    /// or an empty string.
    async fn toggle(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
        on: bool,
    ) -> Result<String, ExecError> {
        let t = cx.templates();
        let mut patterns = vec![t.pat_dc_idle()];
        if on {
            // The dummy fails while unmanaged; the scheduler must see
            // the failure without recovering it.
            patterns.push(t.pat_failed_op(DUMMY_RID));
        } else {
            patterns.push(t.pat_resource_op_ok(DUMMY_RID, "stop_0"));
            patterns.push(t.pat_resource_op_ok(DUMMY_RID, "start_0"));
        }
        let hosts = cx.env.nodes.clone();
        let mut watch = cx
            .arm("maintenance-toggle", &patterns, WATCH_TIMEOUT_SECS, &hosts)
            .await;

        debug!("turning maintenance mode {}", if on { "on" } else { "off" });
        cx.run_on(node, &t.maintenance_cmd(on)).await?;
        if on {
            cx.run_on(node, &t.fail_resource_cmd(DUMMY_RID, node)).await?;
        }

        let timer = if on { "recover-on" } else { "recover-off" };
        self.core_mut().set_timer(timer);
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer(timer);

        let unmatched = watch.unmatched_patterns();
        if unmatched.is_empty() {
            Ok(String::new())
        } else {
            debug!("maintenance toggle patterns missing: {unmatched:?}");
            Ok(format!("{unmatched:?}"))
        }
    }

    async fn insert_dummy(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<String, ExecError> {
        let t = cx.templates();
        let patterns = [t.pat_resource_op_ok(DUMMY_RID, "start_0")];
        let hosts = cx.env.nodes.clone();
        let mut watch = cx
            .arm("maintenance-dummy-add", &patterns, WATCH_TIMEOUT_SECS, &hosts)
            .await;

        cx.run_on(node, &t.add_dummy_resource_cmd(DUMMY_RID, node))
            .await?;

        self.core_mut().set_timer("add-dummy");
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("add-dummy");

        let unmatched = watch.unmatched_patterns();
        if unmatched.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("{unmatched:?}"))
        }
    }

    async fn remove_dummy(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<String, ExecError> {
        let t = cx.templates();
        let patterns = [t.pat_resource_op_ok(DUMMY_RID, "stop_0")];
        let hosts = cx.env.nodes.clone();
        let mut watch = cx
            .arm(
                "maintenance-dummy-remove",
                &patterns,
                WATCH_TIMEOUT_SECS,
                &hosts,
            )
            .await;

        cx.run_on(node, &t.delete_resource_cmd(DUMMY_RID)).await?;

        self.core_mut().set_timer("remove-dummy");
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("remove-dummy");

        let unmatched = watch.unmatched_patterns();
        if unmatched.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("{unmatched:?}"))
        }
    }

    /// Ids of the managed resources as reported by `node`.
    async fn managed_resources(
        &self,
        cx: &ScenarioContext,
        node: &str,
    ) -> Result<Vec<String>, ExecError> {
        Ok(cx
            .model
            .list_resources(node)
            .await?
            .into_iter()
            .filter(|r| r.managed)
            .map(|r| r.id)
            .collect())
    }

    /// Every resource in `expected` must currently report the given
    /// managed state.
    async fn verify_resources(
        &self,
        cx: &ScenarioContext,
        node: &str,
        expected: &[String],
        managed: bool,
    ) -> Result<bool, ExecError> {
        let mut missing: Vec<String> = expected.to_vec();
        for rsc in cx.model.list_resources(node).await? {
            if rsc.managed == managed {
                missing.retain(|id| *id != rsc.id);
            }
        }
        if missing.is_empty() {
            debug!(
                node,
                managed, "found all resources in the expected managed state"
            );
            Ok(true)
        } else {
            info!(
                node,
                managed, "resources not in the expected managed state: {missing:?}"
            );
            Ok(false)
        }
    }
}

impl Default for MaintenanceModeScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for MaintenanceModeScenario {
    fn core(&self) -> &ScenarioCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ScenarioCore {
        &mut self.core
    }

    async fn invoke(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<Outcome, ExecError> {
        if self.startall.run(cx, node).await.is_failure() {
            return Ok(self.core_mut().failure("setup failed"));
        }

        // The managed set taken before maintenance mode is the
        // reference for both verifications.
        let managed = self.managed_resources(cx, node).await?;
        if managed.is_empty() {
            info!("no managed resources on {node}");
            return Ok(self.core_mut().skipped());
        }

        let mut fail_patterns = String::new();
        fail_patterns += &self.insert_dummy(cx, node).await?;
        fail_patterns += &self.toggle(cx, node, true).await?;
        let verified_unmanaged = self.verify_resources(cx, node, &managed, false).await?;
        fail_patterns += &self.toggle(cx, node, false).await?;
        let verified_managed = self.verify_resources(cx, node, &managed, true).await?;
        fail_patterns += &self.remove_dummy(cx, node).await?;

        cx.model.cluster_stable(None, false).await?;

        if !fail_patterns.is_empty() {
            return Ok(self
                .core_mut()
                .failure(format!("unmatched patterns: {fail_patterns}")));
        }
        if !verified_unmanaged {
            return Ok(self
                .core_mut()
                .failure("resources stayed managed during maintenance mode"));
        }
        if !verified_managed {
            return Ok(self
                .core_mut()
                .failure("resources did not return to managed after maintenance mode"));
        }
        Ok(self.core_mut().success())
    }

    fn errors_to_ignore(&self) -> Vec<String> {
        vec![
            format!("Updating failcount for {DUMMY_RID}"),
            format!("Recover {DUMMY_RID}"),
            "Unknown operation: fail".into(),
        ]
    }
}
