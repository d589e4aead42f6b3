//! Partition the cluster into isolated groups, audit both sides, then
//! heal and wait for a single reformed partition.
//!
//! Errors along the way are accumulated and reported as one combined
//! failure at the end, so each invocation still resolves to exactly one
//! outcome. A cluster that does not reform fails fast; there is no
//! interactive override.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, error};

use faultline_exec::ExecError;

use crate::scenario::{Outcome, Scenario, ScenarioContext, ScenarioCore};
use crate::scenarios::batch::BatchStart;

/// Split the node set into random isolated groups and heal them again.
pub struct SplitBrainScenario {
    core: ScenarioCore,
    startall: BatchStart,
}

impl SplitBrainScenario {
    /// Create the scenario.
    pub fn new() -> Self {
        Self {
            core: ScenarioCore::new("split-brain"),
            startall: BatchStart::new(),
        }
    }
}

impl Default for SplitBrainScenario {
    fn default() -> Self {
        Self::new()
    }
}

/// Cut every member of `group` off from the rest of the cluster.
async fn isolate_group(cx: &mut ScenarioContext, group: &[String]) -> Result<bool, ExecError> {
    let others: Vec<String> = cx
        .env
        .nodes
        .iter()
        .filter(|n| !group.contains(n))
        .cloned()
        .collect();
    if others.is_empty() {
        return Ok(true);
    }
    debug!(?group, ?others, "creating partition");
    for node in group {
        if !cx.model.isolate_node(node, &others).await? {
            error!("could not isolate {node}");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Restore traffic between `group` and the rest of the cluster.
async fn heal_group(cx: &mut ScenarioContext, group: &[String]) -> Result<(), ExecError> {
    let others: Vec<String> = cx
        .env
        .nodes
        .iter()
        .filter(|n| !group.contains(n))
        .cloned()
        .collect();
    if others.is_empty() {
        return Ok(());
    }
    debug!(?group, ?others, "healing partition");
    for node in group {
        cx.model.unisolate_node(node, &others).await?;
    }
    Ok(())
}

/// Bounded-retry wait until the observed partition count matches.
async fn settle_to(cx: &mut ScenarioContext, expected: usize) -> Result<bool, ExecError> {
    for _ in 0..cx.env.settle_retries {
        if cx.model.find_partitions().await?.len() == expected {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_secs(cx.env.settle_delay_secs)).await;
    }
    Ok(false)
}

#[async_trait]
impl Scenario for SplitBrainScenario {
    fn core(&self) -> &ScenarioCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ScenarioCore {
        &mut self.core
    }

    async fn is_applicable(&self, cx: &mut ScenarioContext) -> bool {
        cx.env.experimental_tests && cx.env.nodes.len() > 2
    }

    async fn invoke(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<Outcome, ExecError> {
        if self.startall.run(cx, node).await.is_failure() {
            return Ok(self.core_mut().failure("setup failed"));
        }

        let nodes = cx.env.nodes.clone();
        // Random group assignment, retried until at least two groups
        // are non-empty.
        let groups: Vec<Vec<String>> = loop {
            let mut buckets: BTreeMap<usize, Vec<String>> = BTreeMap::new();
            for n in &nodes {
                buckets
                    .entry(cx.rng.gen_range(1..=nodes.len()))
                    .or_default()
                    .push(n.clone());
            }
            if buckets.len() > 1 {
                break buckets.into_values().collect();
            }
        };
        debug!("created {} partitions", groups.len());
        for (i, group) in groups.iter().enumerate() {
            debug!("partition[{i}]: {group:?}");
        }
        self.core_mut().bump(&format!("partitions:{}", groups.len()));

        let t = cx.templates();
        let mut errors: Vec<String> = Vec::new();

        // Fencing would kill the isolated side before we can audit it.
        cx.run_on(node, &t.set_fencing_cmd(false)).await?;

        for group in &groups {
            if !isolate_group(cx, group).await? {
                errors.push(format!("could not isolate {group:?}"));
            }
        }

        let expected = groups.len();
        if !settle_to(cx, expected).await? {
            errors.push("expected partitions were not created".into());
        }
        if !cx.model.cluster_stable(None, false).await? {
            errors.push("partitioned cluster not stable".into());
        }

        // Audit each side with the raised expectation in place.
        cx.model.partitions_expected = expected;
        if !self.audit(cx).await {
            errors.push("audits failed".into());
        }
        cx.model.partitions_expected = 1;

        for group in &groups {
            heal_group(cx, group).await?;
        }

        if !settle_to(cx, 1).await? {
            // Fail fast; skip the remaining waits but still restore
            // fencing below.
            errors.push("cluster did not reform".into());
        } else {
            let mut complete = false;
            for _ in 0..cx.env.settle_retries {
                let partitions = cx.model.find_partitions().await?;
                if partitions.first().map(|p| p.len()) == Some(nodes.len()) {
                    complete = true;
                    break;
                }
                tokio::time::sleep(Duration::from_secs(cx.env.settle_delay_secs)).await;
            }
            if !complete {
                errors.push("cluster did not completely reform".into());
            } else if !cx
                .model
                .cluster_stable(Some(cx.env.start_time_secs * 4), false)
                .await?
            {
                errors.push("reformed cluster not stable".into());
            }
        }

        if cx.env.fencing_enabled {
            cx.run_on(node, &t.set_fencing_cmd(true)).await?;
        }
        cx.model.cluster_stable(None, false).await?;

        if errors.is_empty() {
            Ok(self.core_mut().success())
        } else {
            Ok(self.core_mut().failure(errors.join("; ")))
        }
    }

    fn errors_to_ignore(&self) -> Vec<String> {
        vec![
            "Another DC detected:".into(),
            "Application of an update diff failed".into(),
            "not in our membership list".into(),
            "node.*returning after partition".into(),
        ]
    }
}
