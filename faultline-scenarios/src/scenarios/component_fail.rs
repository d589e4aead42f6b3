//! Kill a random cluster-manager subprocess and watch the recovery.
//!
//! Two watches race: one for the graceful-recovery signatures, one for
//! fencing of the victim node. Fencing observed within the window is an
//! alternate success path, since a fenced node never finishes logging
//! its graceful recovery.

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error};

use faultline_cluster::{Component, ObservedStatus};
use faultline_exec::ExecError;

use crate::scenario::{Outcome, Scenario, ScenarioContext, ScenarioCore};
use crate::scenarios::batch::BatchStart;

/// Kill one randomly chosen component on the target node.
pub struct ComponentFailScenario {
    core: ScenarioCore,
    startall: BatchStart,
    okerr_patterns: Vec<String>,
}

impl ComponentFailScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("component-fail"),
            startall: BatchStart::new(),
            okerr_patterns: Vec::new(),
        }
    }
}

impl Default for ComponentFailScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for ComponentFailScenario {
    fn core(&self) -> &ScenarioCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ScenarioCore {
        &mut self.core
    }

    async fn is_applicable(&self, cx: &mut ScenarioContext) -> bool {
        cx.env.unsafe_tests
    }

    async fn invoke(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<Outcome, ExecError> {
        self.okerr_patterns.clear();

        if self.startall.run(cx, node).await.is_failure() {
            return Ok(self.core_mut().failure("setup failed"));
        }
        if !cx
            .model
            .cluster_stable(Some(cx.env.stable_time_secs), false)
            .await?
        {
            return Ok(self.core_mut().failure("setup failed - unstable"));
        }

        let node_is_dc = cx.model.is_node_dc(node).await?;
        let t = cx.templates();

        // Coordinator-only components are pointless targets elsewhere.
        let candidates: Vec<Component> = t
            .components()
            .into_iter()
            .filter(|c| !c.dc_only || node_is_dc)
            .collect();
        if candidates.is_empty() {
            return Ok(self.core_mut().skipped());
        }
        let chosen = candidates[cx.rng.gen_range(0..candidates.len())].clone();
        debug!(
            component = %chosen.name,
            dc = node_is_dc,
            reboots = chosen.triggers_reboot,
            "chose component to kill"
        );
        self.core_mut().bump(&chosen.name);

        let mut patterns = vec![
            t.pat_child_killed(node, &chosen.name),
            t.pat_child_respawn(node, &chosen.name),
        ];
        patterns.extend(chosen.pats.iter().cloned());
        if node_is_dc {
            patterns.extend(chosen.dc_pats.iter().cloned());
        }
        if chosen.triggers_reboot {
            // The node goes down and must come back.
            for other in cx.model.up_nodes() {
                if other != node {
                    patterns.push(t.pat_they_stopped(&other, node));
                }
            }
            patterns.push(t.pat_peer_started(node));
            patterns.push(t.pat_local_started(node));
        }
        self.okerr_patterns.extend(chosen.badnews_ignore.iter().cloned());
        self.okerr_patterns.extend(patterns.iter().cloned());

        let hosts = cx.env.nodes.clone();
        let fence_pats = [t.pat_fencing_ok(node)];
        let mut fence_watch = cx
            .arm("component-fencing", &fence_pats, cx.env.dead_time_secs, &hosts)
            .await;
        let timeout =
            cx.env.dead_time_secs + cx.env.stable_time_secs + cx.env.start_time_secs;
        let mut watch = cx.arm("component-fail", &patterns, timeout, &hosts).await;

        chosen.kill(cx.model.exec(), node).await?;

        debug!("waiting for the cluster to recover");
        cx.model.cluster_stable(None, false).await?;

        if let Some(line) = fence_watch.poll_once().await {
            // Fencing preempts the graceful-recovery signatures.
            debug!("node was fenced instead: {line}");
            self.okerr_patterns.push(t.pat_fencing_start(node));
            if !cx.env.at_boot {
                cx.model.set_status(node, ObservedStatus::Down);
            }
            return Ok(self.core_mut().success());
        }

        let matched = watch.poll_until_all_matched(true).await;
        if !matched {
            error!("patterns not found: {:?}", watch.unmatched_patterns());
        }

        debug!("waiting for the cluster to re-stabilize with all nodes");
        let stable = cx
            .model
            .cluster_stable(Some(cx.env.start_time_secs), false)
            .await?;

        if !matched {
            return Ok(self
                .core_mut()
                .failure(format!("didn't find all expected {} patterns", chosen.name)));
        }
        if !stable {
            return Ok(self.core_mut().failure(format!(
                "cluster did not become stable after killing {}",
                chosen.name
            )));
        }
        Ok(self.core_mut().success())
    }

    fn errors_to_ignore(&self) -> Vec<String> {
        // Refers to the most recent kill; its noise may surface later.
        self.okerr_patterns.clone()
    }
}
