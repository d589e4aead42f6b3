//! Fail a random active resource and verify the cluster recovers it.

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info};

use faultline_exec::ExecError;

use crate::scenario::{Outcome, Scenario, ScenarioContext, ScenarioCore};
use crate::scenarios::batch::BatchStart;

const WATCH_TIMEOUT_SECS: u64 = 60;

/// Force-fail one resource on the target node and watch the recovery.
pub struct ResourceRecoverScenario {
    core: ScenarioCore,
    startall: BatchStart,
    rid: Option<String>,
}

impl ResourceRecoverScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("resource-recover"),
            startall: BatchStart::new(),
            rid: None,
        }
    }
}

impl Default for ResourceRecoverScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for ResourceRecoverScenario {
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

        let active = cx.model.active_resources(node).await?;
        if active.is_empty() {
            info!("no active resources on {node}");
            return Ok(self.core_mut().skipped());
        }
        let picked = active[cx.rng.gen_range(0..active.len())].clone();

        let Some(rsc) = cx
            .model
            .list_resources(node)
            .await?
            .into_iter()
            .find(|r| r.id == picked)
        else {
            return Ok(self
                .core_mut()
                .failure(format!("could not find {picked} in the resource list")));
        };
        // Anonymous clone instances recover under their clone id.
        let rid = rsc.clone_id.clone();
        self.rid = Some(rid.clone());
        debug!("failing resource {} aka. {rid}", rsc.id);

        let t = cx.templates();
        let mut patterns = vec![t.pat_failed_op(&rid)];
        if rsc.managed {
            patterns.push(t.pat_resource_op_ok(&rid, "stop_0"));
            if rsc.unique {
                patterns.push(t.pat_resource_op_ok(&rid, "start_0"));
            } else {
                // The replacement instance may come up under any name.
                patterns.push(t.pat_resource_op_ok(".*", "start_0"));
            }
        }
        let hosts = cx.env.nodes.clone();
        let mut watch = cx
            .arm("resource-recover", &patterns, WATCH_TIMEOUT_SECS, &hosts)
            .await;

        cx.run_on(node, &t.fail_resource_cmd(&rid, node)).await?;

        self.core_mut().set_timer("recover");
        watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("recover");

        cx.model.cluster_stable(None, false).await?;
        let recovered = cx.model.resource_location(&rid).await?;

        let unmatched = watch.unmatched_patterns();
        if !unmatched.is_empty() {
            return Ok(self
                .core_mut()
                .failure(format!("patterns not found: {unmatched:?}")));
        }
        if rsc.unique && recovered.len() > 1 {
            return Ok(self.core_mut().failure(format!(
                "{rid} is now active on more than one node: {recovered:?}"
            )));
        }
        if !recovered.is_empty() {
            debug!("{rid} is running on: {recovered:?}");
        } else if rsc.managed {
            return Ok(self
                .core_mut()
                .failure(format!("{rid} was not recovered and is inactive")));
        }
        Ok(self.core_mut().success())
    }

    fn errors_to_ignore(&self) -> Vec<String> {
        let Some(rid) = &self.rid else {
            return Vec::new();
        };
        vec![
            format!("Updating failcount for {rid}"),
            format!("Recover {rid}"),
            "Unknown operation: fail".into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, mark_all_up};
    use faultline_cluster::watch::mock::WatchPlan;

    #[tokio::test]
    async fn recovers_a_failed_unique_resource() {
        let mut fx = fixture(&["east", "west"]);
        mark_all_up(&mut fx.cx);
        fx.templates.add_resource_line(
            "Resource: id=web type=primitive host=east managed=1 unique=1",
        );
        fx.templates.set_resource_running("web", "east", true);

        let mut scenario = ResourceRecoverScenario::new();
        let outcome = scenario.run(&mut fx.cx, "east").await;

        assert_eq!(outcome, Outcome::Success);
        assert!(!scenario.errors_to_ignore().is_empty());
    }

    #[tokio::test]
    async fn skipped_with_no_active_resources() {
        let mut fx = fixture(&["east"]);
        mark_all_up(&mut fx.cx);

        let mut scenario = ResourceRecoverScenario::new();
        assert_eq!(scenario.run(&mut fx.cx, "east").await, Outcome::Skipped);
    }

    #[tokio::test]
    async fn duplicate_activation_of_unique_resource_fails() {
        let mut fx = fixture(&["east", "west"]);
        mark_all_up(&mut fx.cx);
        fx.templates.add_resource_line(
            "Resource: id=web type=primitive host=east managed=1 unique=1",
        );
        fx.templates.set_resource_running("web", "east", true);
        fx.templates.set_resource_running("web", "west", true);

        let mut scenario = ResourceRecoverScenario::new();
        match scenario.run(&mut fx.cx, "east").await {
            Outcome::Failure(reason) => {
                assert!(reason.contains("more than one node"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn managed_resource_left_inactive_fails() {
        let mut fx = fixture(&["east"]);
        mark_all_up(&mut fx.cx);
        fx.templates.add_resource_line(
            "Resource: id=web type=primitive host=east managed=1 unique=1",
        );
        // Never marked running anywhere.

        let mut scenario = ResourceRecoverScenario::new();
        match scenario.run(&mut fx.cx, "east").await {
            Outcome::Failure(reason) => {
                assert!(reason.contains("not recovered"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_recovery_patterns_fail() {
        let mut fx = fixture(&["east"]);
        mark_all_up(&mut fx.cx);
        fx.templates.add_resource_line(
            "Resource: id=web type=primitive host=east managed=1 unique=1",
        );
        fx.templates.set_resource_running("web", "east", true);
        fx.watches.on("resource-recover", WatchPlan::match_none());

        let mut scenario = ResourceRecoverScenario::new();
        match scenario.run(&mut fx.cx, "east").await {
            Outcome::Failure(reason) => assert!(reason.contains("patterns not found")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
