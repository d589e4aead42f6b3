//! Sequential scenario driver.
//!
//! One coordinating thread of control runs everything: it filters the
//! catalog by applicability, then repeatedly picks a random scenario
//! and a random target node from the seeded random source, invokes the
//! scenario, and audits the cluster afterwards.

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use faultline_exec::ExecError;

use crate::scenario::{Scenario, ScenarioContext};
use crate::stats::ScenarioStats;

/// Final statistics for one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    /// Scenario name.
    pub name: String,
    /// Its counters.
    #[serde(flatten)]
    pub stats: ScenarioStats,
}

/// The report produced by a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Requested iteration count.
    pub iterations: usize,
    /// Per-scenario statistics, catalog order.
    pub scenarios: Vec<ScenarioSummary>,
}

impl RunReport {
    /// Render the report as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Drives scenarios sequentially against one cluster.
pub struct ScenarioRunner {
    scenarios: Vec<Box<dyn Scenario>>,
    iterations: usize,
}

impl ScenarioRunner {
    /// Create a runner over a scenario set.
    pub fn new(scenarios: Vec<Box<dyn Scenario>>, iterations: usize) -> Self {
        Self {
            scenarios,
            iterations,
        }
    }

    /// Run the requested number of iterations and report.
    pub async fn run(&mut self, cx: &mut ScenarioContext) -> Result<RunReport, ExecError> {
        cx.model.prepare().await?;

        let mut applicable = Vec::new();
        for (index, scenario) in self.scenarios.iter_mut().enumerate() {
            if scenario.is_applicable(cx).await {
                applicable.push(index);
            } else {
                info!("{} is not applicable, skipping it", scenario.name());
            }
        }

        if applicable.is_empty() || cx.env.nodes.is_empty() {
            warn!("nothing to run: no applicable scenarios or no nodes");
        } else {
            for iteration in 0..self.iterations {
                let index = applicable[cx.rng.gen_range(0..applicable.len())];
                let node = cx.env.nodes[cx.rng.gen_range(0..cx.env.nodes.len())].clone();
                let scenario = &mut self.scenarios[index];
                let name = scenario.name().to_string();
                info!(iteration, scenario = %name, node = %node, "running scenario");

                let outcome = scenario.run(cx, &node).await;
                debug!(scenario = %name, ?outcome, "scenario finished");

                if !scenario.audit(cx).await {
                    warn!(scenario = %name, "audit failed after scenario");
                }
            }
        }

        Ok(RunReport {
            iterations: self.iterations,
            scenarios: self
                .scenarios
                .iter()
                .map(|s| ScenarioSummary {
                    name: s.name().to_string(),
                    stats: s.core().stats().clone(),
                })
                .collect(),
        })
    }
}
