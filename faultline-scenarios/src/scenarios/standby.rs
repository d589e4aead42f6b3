//! Standby mode: a node in standby must evacuate all its resources.

use async_trait::async_trait;
use tracing::{debug, error};

use faultline_exec::ExecError;

use crate::scenario::{Outcome, Scenario, ScenarioContext, ScenarioCore};
use crate::scenarios::batch::BatchStart;

/// Put one node into standby, verify evacuation, and bring it back.
pub struct StandbyScenario {
    core: ScenarioCore,
    startall: BatchStart,
}

impl StandbyScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("standby"),
            startall: BatchStart::new(),
        }
    }
}

impl Default for StandbyScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for StandbyScenario {
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
            return Ok(self.core_mut().failure("start all nodes failed"));
        }

        debug!("make sure node {node} is active");
        if cx.model.standby_status(node).await? != "off"
            && !cx.model.set_standby(node, "off").await?
        {
            return Ok(self
                .core_mut()
                .failure(format!("can't set node {node} to active mode")));
        }
        cx.model.cluster_stable(None, false).await?;
        let status = cx.model.standby_status(node).await?;
        if status != "off" {
            return Ok(self.core_mut().failure(format!(
                "standby status of {node} is [{status}] but we expect [off]"
            )));
        }

        let t = cx.templates();
        let patterns = [t.pat_scheduler_engaged()];
        let hosts = cx.env.nodes.clone();
        let mut watch = cx
            .arm("standby", &patterns, cx.env.dead_time_secs + 10, &hosts)
            .await;

        debug!("setting node {node} to standby mode");
        if !cx.model.set_standby(node, "on").await? {
            return Ok(self
                .core_mut()
                .failure(format!("can't set node {node} to standby mode")));
        }
        self.core_mut().set_timer("on");
        if !watch.poll_until_all_matched(false).await {
            error!("patterns not found: {:?}", watch.unmatched_patterns());
            cx.model.set_standby(node, "off").await?;
            return Ok(self
                .core_mut()
                .failure(format!("cluster didn't react to standby change on {node}")));
        }
        cx.model.cluster_stable(None, false).await?;
        let status = cx.model.standby_status(node).await?;
        if status != "on" {
            return Ok(self.core_mut().failure(format!(
                "standby status of {node} is [{status}] but we expect [on]"
            )));
        }
        self.core_mut().log_timer("on");

        debug!("checking resources on {node}");
        let still_active = cx.model.active_resources(node).await?;
        if !still_active.is_empty() {
            let outcome = self.core_mut().failure(format!(
                "{node} set to standby, {still_active:?} is still running on it"
            ));
            cx.model.set_standby(node, "off").await?;
            return Ok(outcome);
        }

        debug!("setting node {node} to active mode");
        if !cx.model.set_standby(node, "off").await? {
            return Ok(self
                .core_mut()
                .failure(format!("can't set node {node} to active mode")));
        }
        self.core_mut().set_timer("off");
        cx.model.cluster_stable(None, false).await?;
        let status = cx.model.standby_status(node).await?;
        if status != "off" {
            return Ok(self.core_mut().failure(format!(
                "standby status of {node} is [{status}] but we expect [off]"
            )));
        }
        self.core_mut().log_timer("off");

        Ok(self.core_mut().success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, mark_all_up};

    #[tokio::test]
    async fn standby_round_trip_succeeds_when_node_evacuates() {
        let mut fx = fixture(&["east", "west"]);
        mark_all_up(&mut fx.cx);
        // A resource hosted elsewhere does not block standby.
        fx.templates
            .add_resource_line("Resource: id=web type=primitive host=west managed=1");

        let mut scenario = StandbyScenario::new();
        let outcome = scenario.run(&mut fx.cx, "east").await;

        assert_eq!(outcome, Outcome::Success);
        // Back in active mode afterwards.
        assert_eq!(fx.cx.model.standby_status("east").await.unwrap(), "off");
    }

    #[tokio::test]
    async fn resources_left_behind_fail_the_scenario() {
        let mut fx = fixture(&["east", "west"]);
        mark_all_up(&mut fx.cx);
        // Still hosted on the standby node after the switch.
        fx.templates
            .add_resource_line("Resource: id=web type=primitive host=east managed=1");

        let mut scenario = StandbyScenario::new();
        match scenario.run(&mut fx.cx, "east").await {
            Outcome::Failure(reason) => {
                assert!(reason.contains("still running"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // The node is put back into active mode even on failure.
        assert_eq!(fx.cx.model.standby_status("east").await.unwrap(), "off");
    }
}
