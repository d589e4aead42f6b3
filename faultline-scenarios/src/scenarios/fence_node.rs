//! Operator-initiated fencing of a live node.
//!
//! The fence request is fired from a random node. A timer-expired exit
//! usually means the victim hosted its own fence device and committed
//! suicide before confirming; the cluster re-fences as needed, so it is
//! logged rather than failed.

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error, warn};

use faultline_cluster::ObservedStatus;
use faultline_exec::ExecError;

use crate::scenario::{Outcome, Scenario, ScenarioContext, ScenarioCore};
use crate::scenarios::batch::BatchStart;

/// Exit code for "fencing timer expired" (194 - 256 = -62).
const FENCE_TIMER_EXPIRED_RC: i32 = 194;

/// Fence the target node and verify the cluster's reaction.
pub struct FenceNodeScenario {
    core: ScenarioCore,
    startall: BatchStart,
}

impl FenceNodeScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("fence-node"),
            startall: BatchStart::new(),
        }
    }
}

impl Default for FenceNodeScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for FenceNodeScenario {
    fn core(&self) -> &ScenarioCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ScenarioCore {
        &mut self.core
    }

    async fn is_applicable(&self, cx: &mut ScenarioContext) -> bool {
        cx.env.fencing_enabled && cx.env.nodes.len() >= 2
    }

    async fn invoke(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<Outcome, ExecError> {
        if self.startall.run(cx, node).await.is_failure() {
            return Ok(self.core_mut().failure("setup failed"));
        }

        let t = cx.templates();
        let mut patterns = vec![t.pat_fencing_ok(node), t.pat_node_fenced(node)];
        if cx.env.at_boot {
            debug!("expecting {node} to come back up");
            patterns.push(t.pat_peer_started(node));
        } else {
            debug!("expecting {node} to stay down");
            cx.model.set_status(node, ObservedStatus::Down);
        }

        let hosts = cx.env.nodes.clone();
        let timeout = 30 + cx.env.dead_time_secs + cx.env.stable_time_secs + cx.env.start_time_secs;
        let mut watch = cx.arm("fence-node", &patterns, timeout, &hosts).await;

        let origin = cx.env.nodes[cx.rng.gen_range(0..cx.env.nodes.len())].clone();
        let result = cx.run_on(&origin, &t.fence_node_cmd(node)).await?;

        if result.exit_code == FENCE_TIMER_EXPIRED_RC {
            // The victim fenced itself before it could confirm.
            warn!("fencing command on {origin} to fence {node} timed out");
        } else if result.exit_code != 0 && origin != node {
            warn!(
                rc = result.exit_code,
                "fencing command on {origin} failed to fence {node}"
            );
            cx.model.cluster_stable(None, false).await?;
        } else if result.exit_code != 0 {
            warn!(
                rc = result.exit_code,
                "locally originated fencing returned nonzero"
            );
        }

        self.core_mut().set_timer("fence");
        let matched = watch.poll_until_all_matched(false).await;
        self.core_mut().log_timer("fence");
        if !matched {
            error!("patterns not found: {:?}", watch.unmatched_patterns());
        }

        self.core_mut().set_timer("reform");
        debug!("waiting for the cluster to recover");
        cx.model.cluster_stable(None, false).await?;

        // Re-probe the victim before trusting anything about it.
        cx.model.probe(node).await?;

        debug!("waiting for the cluster to re-stabilize with all nodes");
        let stable = cx
            .model
            .cluster_stable(Some(cx.env.start_time_secs), false)
            .await?;

        if !matched {
            return Ok(self
                .core_mut()
                .failure("didn't find all expected fencing patterns"));
        }
        if !stable {
            return Ok(self.core_mut().failure("cluster did not become stable"));
        }
        self.core_mut().log_timer("reform");
        Ok(self.core_mut().success())
    }

    fn errors_to_ignore(&self) -> Vec<String> {
        vec![
            "Operation reboot of .* Timer expired".into(),
            "is active on 2 nodes attempting recovery".into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, mark_all_up};
    use faultline_cluster::watch::mock::WatchPlan;

    #[tokio::test]
    async fn fence_with_confirmation_succeeds() {
        let mut fx = fixture(&["east", "west", "north"]);
        mark_all_up(&mut fx.cx);

        let mut scenario = FenceNodeScenario::new();
        let outcome = scenario.run(&mut fx.cx, "west").await;
        assert_eq!(outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn fence_timer_expired_is_not_a_failure() {
        let mut fx = fixture(&["east", "west", "north"]);
        mark_all_up(&mut fx.cx);
        fx.templates.set_fence_rc(FENCE_TIMER_EXPIRED_RC);

        let mut scenario = FenceNodeScenario::new();
        let outcome = scenario.run(&mut fx.cx, "west").await;
        assert_eq!(outcome, Outcome::Success);
    }

    #[tokio::test]
    async fn missing_fence_confirmation_fails() {
        let mut fx = fixture(&["east", "west", "north"]);
        mark_all_up(&mut fx.cx);
        fx.watches.on("fence-node", WatchPlan::match_none());

        let mut scenario = FenceNodeScenario::new();
        match scenario.run(&mut fx.cx, "west").await {
            Outcome::Failure(reason) => {
                assert!(reason.contains("fencing patterns"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_applicable_without_fencing() {
        let mut fx = fixture(&["east", "west"]);
        let mut env = (*fx.cx.env).clone();
        env.fencing_enabled = false;
        fx.cx.env = std::sync::Arc::new(env);

        let scenario = FenceNodeScenario::new();
        assert!(!scenario.is_applicable(&mut fx.cx).await);
    }
}
