//! Single-node membership toggles.
//!
//! Stop and start are the building blocks most other scenarios
//! compose; they are not registered in the catalog themselves.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, warn};

use faultline_cluster::{NodeProbe, ObservedStatus};
use faultline_exec::ExecError;

use crate::scenario::{Outcome, Scenario, ScenarioContext, ScenarioCore};

/// Deactivate the cluster manager on one node.
pub struct StopScenario {
    core: ScenarioCore,
}

impl StopScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("stop"),
        }
    }
}

impl Default for StopScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for StopScenario {
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
        if cx.model.status_of(node) != ObservedStatus::Up {
            return Ok(self.core_mut().skipped());
        }

        let t = cx.templates();
        // We can always notice ourselves stopping; every other active
        // node needs to notice this one left.
        let mut patterns = vec![t.pat_we_stopped(node)];
        for other in cx.model.up_nodes() {
            if other != node {
                patterns.push(t.pat_they_stopped(&other, node));
            }
        }
        let hosts = cx.env.nodes.clone();
        let mut watch = cx.arm("stop", &patterns, cx.env.dead_time_secs, &hosts).await;

        if cx.model.exec().local_node() == Some(node) {
            self.core_mut().bump("us");
        } else if cx.model.up_count() <= 1 {
            self.core_mut().bump("all");
        } else {
            self.core_mut().bump("them");
        }

        cx.model.stop_node(node).await?;
        let all_matched = watch.poll_until_all_matched(false).await;
        let unmatched = watch.unmatched_patterns();
        for pattern in &unmatched {
            error!("shutdown pattern not found: {pattern}");
        }

        cx.model
            .cluster_stable(Some(cx.env.dead_time_secs), false)
            .await?;

        if all_matched || cx.model.up_count() == 0 {
            return Ok(self.core_mut().success());
        }
        if unmatched.len() >= cx.model.up_count() {
            return Ok(self
                .core_mut()
                .failure(format!("no match against ({})", unmatched.join("||"))));
        }
        Ok(self.core_mut().failure("missing shutdown pattern"))
    }
}

/// Activate the cluster manager on one node.
pub struct StartScenario {
    core: ScenarioCore,
}

impl StartScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("start"),
        }
    }
}

impl Default for StartScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for StartScenario {
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
        if cx.model.up_count() == 0 {
            self.core_mut().bump("us");
        } else {
            self.core_mut().bump("them");
        }

        if cx.model.status_of(node) != ObservedStatus::Down {
            return Ok(self.core_mut().skipped());
        }

        let t = cx.templates();
        let up_pattern = if cx.model.up_count() == 0 {
            t.pat_local_started(node)
        } else {
            t.pat_peer_started(node)
        };
        let mut patterns = vec![up_pattern, t.pat_infra_up(node), t.pat_cluster_up(node)];
        if cx.model.up_count() > 0 {
            patterns.push(t.pat_dc_idle());
        }
        let hosts = cx.env.nodes.clone();
        let mut watch = cx
            .arm("start", &patterns, cx.env.start_time_secs, &hosts)
            .await;

        if !cx.model.start_node(node).await? {
            return Ok(self
                .core_mut()
                .failure(format!("start command failed on {node}")));
        }
        if !watch.poll_until_all_matched(false).await {
            for pattern in watch.unmatched_patterns() {
                warn!("startup pattern not found: {pattern}");
            }
            cx.model.probe(node).await?;
            return Ok(self
                .core_mut()
                .failure(format!("missing startup pattern on {node}")));
        }
        if !cx
            .model
            .cluster_stable(Some(cx.env.start_time_secs), false)
            .await?
        {
            return Ok(self.core_mut().failure("cluster did not stabilize after start"));
        }
        Ok(self.core_mut().success())
    }
}

/// If the node is running, stop it; if it is stopped, start it.
pub struct FlipScenario {
    core: ScenarioCore,
    start: StartScenario,
    stop: StopScenario,
}

impl FlipScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("flip"),
            start: StartScenario::new(),
            stop: StopScenario::new(),
        }
    }

    fn resolve(&mut self, sub: Outcome, transition: &str) -> Outcome {
        self.core_mut().bump(transition);
        if sub.is_failure() {
            self.core_mut().failure(format!("{transition} failure"))
        } else {
            self.core_mut().success()
        }
    }
}

impl Default for FlipScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for FlipScenario {
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
        match cx.model.status_of(node) {
            ObservedStatus::Up => {
                self.core_mut().bump("stopped");
                let sub = self.stop.run(cx, node).await;
                // Give the cluster time to recognize the departure.
                tokio::time::sleep(Duration::from_secs(cx.env.stable_time_secs)).await;
                Ok(self.resolve(sub, "up->down"))
            }
            ObservedStatus::Down => {
                self.core_mut().bump("started");
                let sub = self.start.run(cx, node).await;
                Ok(self.resolve(sub, "down->up"))
            }
            ObservedStatus::Unknown => Ok(self.core_mut().skipped()),
        }
    }
}

/// Stop and restart one node, starting it first if it was down.
pub struct RestartScenario {
    core: ScenarioCore,
    start: StartScenario,
    stop: StopScenario,
}

impl RestartScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("restart"),
            start: StartScenario::new(),
            stop: StopScenario::new(),
        }
    }
}

impl Default for RestartScenario {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scenario for RestartScenario {
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
        self.core_mut().bump(&format!("node:{node}"));

        if cx.model.probe(node).await? == NodeProbe::Down {
            self.core_mut().bump("was_stopped");
            if self.start.run(cx, node).await.is_failure() {
                return Ok(self
                    .core_mut()
                    .failure(format!("start (setup) failure: {node}")));
            }
        }

        self.core_mut().set_timer("test");
        if self.stop.run(cx, node).await.is_failure() {
            return Ok(self.core_mut().failure(format!("stop failure: {node}")));
        }
        if self.start.run(cx, node).await.is_failure() {
            return Ok(self.core_mut().failure(format!("start failure: {node}")));
        }
        self.core_mut().log_timer("test");
        Ok(self.core_mut().success())
    }
}
