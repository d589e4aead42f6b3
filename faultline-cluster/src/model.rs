//! The cluster state model.
//!
//! Tracks what the harness believes about every node, discovers
//! partitions, evaluates quorum, and reconciles fencing that happened
//! while a scenario was waiting for convergence. The status map is the
//! only broadly shared mutable state in the harness; it is written only
//! by the sequential driver, never from async completions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use faultline_exec::{AsyncCommandHandle, ExecError, RemoteExec};
use tracing::{debug, warn};

use crate::env::TestEnv;
use crate::resource::ClusterResource;
use crate::templates::ClusterTemplates;
use crate::watch::{LogWatch, WatchFactory};

/// Grace delay before the second pass of a double-checked stability wait.
const DOUBLE_CHECK_GRACE_SECS: u64 = 5;

/// What the harness last confirmed about a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedStatus {
    /// Never probed.
    Unknown,
    /// Cluster manager answered on the last probe or action.
    Up,
    /// Cluster manager was confirmed absent.
    Down,
}

impl fmt::Display for ObservedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservedStatus::Unknown => write!(f, "unknown"),
            ObservedStatus::Up => write!(f, "up"),
            ObservedStatus::Down => write!(f, "down"),
        }
    }
}

/// Outcome of one status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeProbe {
    /// The manager did not answer "ok".
    Down,
    /// Up, but not yet settled.
    Unstable,
    /// Up and settled (idle marker seen or idle watch converged).
    Stable,
}

/// Per-node expected/observed state plus partition, quorum, and fencing
/// bookkeeping. One instance drives one cluster.
pub struct ClusterModel {
    env: Arc<TestEnv>,
    exec: Arc<RemoteExec>,
    templates: Arc<dyn ClusterTemplates>,
    watches: Arc<dyn WatchFactory>,
    status: HashMap<String, ObservedStatus>,
    /// How many partitions the audits should currently expect.
    pub partitions_expected: usize,
}

impl ClusterModel {
    /// Build the model for the nodes named in `env`.
    pub fn new(
        env: Arc<TestEnv>,
        exec: Arc<RemoteExec>,
        templates: Arc<dyn ClusterTemplates>,
        watches: Arc<dyn WatchFactory>,
    ) -> Self {
        let status = env
            .nodes
            .iter()
            .map(|n| (n.clone(), ObservedStatus::Unknown))
            .collect();
        Self {
            env,
            exec,
            templates,
            watches,
            status,
            partitions_expected: 1,
        }
    }

    /// The environment this model runs against.
    pub fn env(&self) -> &Arc<TestEnv> {
        &self.env
    }

    /// The executor used for all commands.
    pub fn exec(&self) -> &Arc<RemoteExec> {
        &self.exec
    }

    /// The cluster-manager template table.
    pub fn templates(&self) -> &Arc<dyn ClusterTemplates> {
        &self.templates
    }

    /// The convergence-watch factory.
    pub fn watches(&self) -> &Arc<dyn WatchFactory> {
        &self.watches
    }

    /// Last confirmed status of a node.
    pub fn status_of(&self, node: &str) -> ObservedStatus {
        self.status
            .get(node)
            .copied()
            .unwrap_or(ObservedStatus::Unknown)
    }

    /// Overwrite a node's observed status.
    pub fn set_status(&mut self, node: &str, status: ObservedStatus) {
        self.status.insert(node.to_string(), status);
    }

    /// Nodes currently believed up, in environment order.
    pub fn up_nodes(&self) -> Vec<String> {
        self.env
            .nodes
            .iter()
            .filter(|n| self.status_of(n) == ObservedStatus::Up)
            .cloned()
            .collect()
    }

    /// Count of nodes currently believed up.
    pub fn up_count(&self) -> usize {
        self.up_nodes().len()
    }

    /// Reset bookkeeping before a run: heal any leftover isolation and
    /// probe every node.
    pub async fn prepare(&mut self) -> Result<(), ExecError> {
        self.partitions_expected = 1;
        let nodes = self.env.nodes.clone();
        for node in &nodes {
            self.status.insert(node.clone(), ObservedStatus::Unknown);
            let others: Vec<String> = nodes.iter().filter(|n| *n != node).cloned().collect();
            self.unisolate_node(node, &others).await?;
            self.probe(node).await?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Probing
    // ----------------------------------------------------------------

    /// Probe one node and correct its observed status.
    ///
    /// The status output is checked before the idle watch: log
    /// collection can lose messages, the command response cannot.
    pub async fn probe(&mut self, node: &str) -> Result<NodeProbe, ExecError> {
        let idle_pats = self.templates.pat_node_idle(node);
        let hosts = [node.to_string()];
        let mut idle_watch = self
            .watches
            .arm(
                "node-idle",
                &idle_pats,
                Duration::from_secs(self.env.dead_time_secs),
                &hosts,
            )
            .await;

        let result = self
            .exec
            .run(Some(node), &self.templates.status_cmd(node))
            .await?;
        let text = result.stdout_text();
        debug!(node, "node status: {:?}", text);

        if !result.success() || !text.contains(&self.templates.ok_marker()) {
            if self.status_of(node) == ObservedStatus::Up {
                warn!(node, "node status is down but we think it should be up");
            }
            self.set_status(node, ObservedStatus::Down);
            return Ok(NodeProbe::Down);
        }

        if self.status_of(node) == ObservedStatus::Down {
            warn!(node, "node status is up but we think it should be down: {text}");
        }
        self.set_status(node, ObservedStatus::Up);

        if self
            .templates
            .idle_markers()
            .iter()
            .any(|m| text.contains(m.as_str()))
        {
            return Ok(NodeProbe::Stable);
        }
        if idle_watch.poll_once().await.is_some() {
            return Ok(NodeProbe::Stable);
        }
        warn!(node, "node is unstable: {text}");
        Ok(NodeProbe::Unstable)
    }

    /// Is the node up at all?
    pub async fn node_up(&mut self, node: &str) -> Result<bool, ExecError> {
        Ok(self.probe(node).await? != NodeProbe::Down)
    }

    /// Is the node up and settled? Being up and being stable are not
    /// the same question.
    pub async fn node_stable(&mut self, node: &str) -> Result<bool, ExecError> {
        Ok(self.probe(node).await? == NodeProbe::Stable)
    }

    /// Is this node the coordinator right now?
    pub async fn is_node_dc(&self, node: &str) -> Result<bool, ExecError> {
        let result = self
            .exec
            .run(Some(node), &self.templates.status_cmd(node))
            .await?;
        let text = result.stdout_text();
        Ok(self
            .templates
            .dc_markers()
            .iter()
            .any(|m| text.contains(m.as_str())))
    }

    // ----------------------------------------------------------------
    // Membership transitions
    // ----------------------------------------------------------------

    /// Start the cluster stack on a node, blocking.
    pub async fn start_node(&mut self, node: &str) -> Result<bool, ExecError> {
        debug!(node, "starting cluster stack");
        let result = self
            .exec
            .run(Some(node), &self.templates.start_cmd(node))
            .await?;
        if result.success() {
            self.set_status(node, ObservedStatus::Up);
            Ok(true)
        } else {
            warn!(node, rc = result.exit_code, "start command failed");
            self.probe(node).await?;
            Ok(false)
        }
    }

    /// Stop the cluster stack on a node, blocking.
    pub async fn stop_node(&mut self, node: &str) -> Result<bool, ExecError> {
        debug!(node, "stopping cluster stack");
        let result = self
            .exec
            .run(Some(node), &self.templates.stop_cmd(node))
            .await?;
        if result.success() {
            self.set_status(node, ObservedStatus::Down);
            Ok(true)
        } else {
            warn!(node, rc = result.exit_code, "stop command failed");
            self.probe(node).await?;
            Ok(false)
        }
    }

    /// Fire the start command without waiting. The status is recorded
    /// optimistically; later probes confirm or correct it.
    pub fn start_node_noblock(&mut self, node: &str) -> Result<AsyncCommandHandle, ExecError> {
        debug!(node, "starting cluster stack (non-blocking)");
        let handle = self.exec.spawn(Some(node), &self.templates.start_cmd(node))?;
        self.set_status(node, ObservedStatus::Up);
        Ok(handle)
    }

    /// Fire the stop command without waiting.
    pub fn stop_node_noblock(&mut self, node: &str) -> Result<AsyncCommandHandle, ExecError> {
        debug!(node, "stopping cluster stack (non-blocking)");
        let handle = self.exec.spawn(Some(node), &self.templates.stop_cmd(node))?;
        self.set_status(node, ObservedStatus::Down);
        Ok(handle)
    }

    /// Cut traffic between `node` and every listed peer.
    pub async fn isolate_node(&mut self, node: &str, others: &[String]) -> Result<bool, ExecError> {
        for target in others {
            let cmd = self.templates.break_comm_cmd(node, target);
            let result = self.exec.run(Some(node), &cmd).await?;
            if !result.success() {
                warn!(node, target = %target, "could not cut traffic");
                return Ok(false);
            }
        }
        debug!(node, ?others, "node isolated");
        Ok(true)
    }

    /// Restore traffic between `node` and every listed peer. Healing
    /// tolerates rules that were already removed.
    pub async fn unisolate_node(&mut self, node: &str, others: &[String]) -> Result<(), ExecError> {
        for target in others {
            let cmd = self.templates.fix_comm_cmd(node, target);
            let _ = self.exec.run(Some(node), &cmd).await?;
        }
        Ok(())
    }

    // ----------------------------------------------------------------
    // Partitions and quorum
    // ----------------------------------------------------------------

    /// Ask every up node for its membership view and deduplicate the
    /// normalized answers. Down nodes are skipped; malformed responses
    /// are logged and excluded.
    pub async fn find_partitions(&mut self) -> Result<Vec<Vec<String>>, ExecError> {
        let mut partitions: Vec<Vec<String>> = Vec::new();
        let nodes = self.env.nodes.clone();
        for node in &nodes {
            if self.status_of(node) != ObservedStatus::Up {
                debug!(node, "node is down, skipping membership query");
                continue;
            }
            let result = self
                .exec
                .run(Some(node), &self.templates.membership_cmd(node))
                .await?;
            let text = result.stdout_text();
            if !result.success() || text.trim().is_empty() {
                warn!(node, "bad membership details");
                continue;
            }
            let mut members: Vec<String> =
                text.split_whitespace().map(str::to_string).collect();
            members.sort();
            if partitions.contains(&members) {
                debug!(node, "membership view consistent with existing entries");
            } else {
                debug!(node, partition = ?members, "adding partition");
                partitions.push(members);
            }
        }
        debug!(?partitions, "found partitions");
        Ok(partitions)
    }

    /// Query the quorum indicator across up nodes (the full set unless
    /// a subset is given) and return the first confident answer.
    /// Defaults to false when no node answers confidently.
    pub async fn has_quorum(&self, subset: Option<&[String]>) -> Result<bool, ExecError> {
        let nodes = subset.unwrap_or(self.env.nodes.as_slice());
        for node in nodes {
            if self.status_of(node) != ObservedStatus::Up {
                continue;
            }
            let result = self
                .exec
                .run(Some(node), &self.templates.quorum_cmd(node))
                .await?;
            let text = result.stdout_text();
            if text.contains('1') {
                return Ok(true);
            }
            if text.contains('0') {
                return Ok(false);
            }
            warn!(node, "unexpected quorum answer: {:?}", text);
        }
        Ok(false)
    }

    // ----------------------------------------------------------------
    // Stability
    // ----------------------------------------------------------------

    /// Wait for one partition to report itself idle.
    pub async fn partition_stable(
        &mut self,
        members: &[String],
        timeout_secs: u64,
    ) -> Result<bool, ExecError> {
        if members.is_empty() {
            debug!("cluster is inactive");
            return Ok(true);
        }
        debug!(?members, "waiting for cluster stability");
        let pats = [self.templates.pat_dc_idle()];
        let mut watch = self
            .watches
            .arm(
                "cluster-stable",
                &pats,
                Duration::from_secs(timeout_secs),
                members,
            )
            .await;

        // Have each member dump its current state into the logs.
        for node in members {
            let _ = self
                .exec
                .run(Some(node), &self.templates.status_cmd(node))
                .await?;
        }

        while let Some(line) = watch.poll_once().await {
            debug!("{line}");
            if members.iter().any(|n| line.contains(n.as_str())) {
                return Ok(true);
            }
        }
        warn!(?members, timeout_secs, "partition not idle");
        Ok(false)
    }

    /// True only if every discovered partition independently confirms
    /// stability. `double_check` re-verifies after a short grace delay
    /// to catch resources whose placement depends on transient
    /// attributes that settle slightly later.
    pub async fn cluster_stable(
        &mut self,
        timeout_secs: Option<u64>,
        double_check: bool,
    ) -> Result<bool, ExecError> {
        let timeout = timeout_secs.unwrap_or(self.env.dead_time_secs);
        let partitions = self.find_partitions().await?;
        for partition in &partitions {
            if !self.partition_stable(partition, timeout).await? {
                return Ok(false);
            }
        }
        if double_check {
            tokio::time::sleep(Duration::from_secs(DOUBLE_CHECK_GRACE_SECS)).await;
            for partition in &partitions {
                if !self.partition_stable(partition, timeout).await? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    // ----------------------------------------------------------------
    // Fencing bookkeeping
    // ----------------------------------------------------------------

    /// Arm a watch for fencing confirmations against any node, to be
    /// reconciled later by [`Self::fencing_cleanup`].
    pub async fn prepare_fencing_watcher(&mut self) -> Box<dyn LogWatch> {
        let pats: Vec<String> = self
            .env
            .nodes
            .iter()
            .map(|n| self.templates.pat_fencing_ok(n))
            .collect();
        let hosts = self.env.nodes.clone();
        self.watches
            .arm(
                "fencing",
                &pats,
                Duration::from_secs(self.env.dead_time_secs),
                &hosts,
            )
            .await
    }

    /// Reconcile which nodes were fenced while the caller was waiting
    /// for convergence.
    ///
    /// Returns `None` when the cluster cannot stabilize afterwards (the
    /// caller should treat the scenario as failed), otherwise the list
    /// of fenced nodes whose "became active" patterns should be excused.
    pub async fn fencing_cleanup(
        &mut self,
        scenario: &str,
        watch: &mut dyn LogWatch,
    ) -> Result<Option<Vec<String>>, ExecError> {
        let mut fenced: Vec<String> = Vec::new();
        while let Some(line) = watch.poll_once().await {
            let hit = self
                .env
                .nodes
                .iter()
                .find(|n| line.contains(n.as_str()))
                .cloned();
            match hit {
                Some(node) if !fenced.contains(&node) => {
                    warn!(scenario, node = %node, "node was fenced mid-scenario");
                    fenced.push(node);
                }
                Some(_) => {}
                None => debug!(scenario, "unattributable fencing match: {line}"),
            }
        }

        if fenced.is_empty() {
            return Ok(Some(fenced));
        }

        for node in fenced.clone() {
            self.set_status(&node, ObservedStatus::Down);
            if self.env.at_boot {
                // Fenced nodes reboot straight back into the cluster.
                for _ in 0..self.env.settle_retries {
                    if self.probe(&node).await? != NodeProbe::Down {
                        break;
                    }
                    tokio::time::sleep(Duration::from_secs(self.env.settle_delay_secs)).await;
                }
            }
        }

        if !self
            .cluster_stable(Some(self.env.start_time_secs), false)
            .await?
        {
            warn!(scenario, "cluster did not stabilize after fencing");
            return Ok(None);
        }
        Ok(Some(fenced))
    }

    // ----------------------------------------------------------------
    // Resources and standby
    // ----------------------------------------------------------------

    /// Parse the resource listing as reported by one node.
    pub async fn list_resources(&self, node: &str) -> Result<Vec<ClusterResource>, ExecError> {
        let result = self
            .exec
            .run(Some(node), &self.templates.list_resources_cmd())
            .await?;
        Ok(result
            .stdout
            .iter()
            .filter_map(|l| ClusterResource::parse(l))
            .collect())
    }

    /// Ids of the primitive resources active on `node`.
    pub async fn active_resources(&self, node: &str) -> Result<Vec<String>, ExecError> {
        Ok(self
            .list_resources(node)
            .await?
            .into_iter()
            .filter(|r| r.rtype == "primitive" && r.host.as_deref() == Some(node))
            .map(|r| r.id)
            .collect())
    }

    /// Up nodes on which `rid` is currently active.
    pub async fn resource_location(&self, rid: &str) -> Result<Vec<String>, ExecError> {
        let mut hosts = Vec::new();
        for node in &self.env.nodes {
            if self.status_of(node) != ObservedStatus::Up {
                continue;
            }
            let cmd = self.templates.resource_running_cmd(rid, node);
            let result = self.exec.run(Some(node), &cmd).await?;
            if result.exit_code == 127 {
                warn!(node, "resource probe command not installed");
            } else if result.success() {
                hosts.push(node.clone());
            }
        }
        Ok(hosts)
    }

    /// Current standby state of a node ("on"/"off").
    pub async fn standby_status(&self, node: &str) -> Result<String, ExecError> {
        let result = self
            .exec
            .run(Some(node), &self.templates.standby_query_cmd(node))
            .await?;
        let out = result.stdout_text().trim().to_string();
        if out.is_empty() {
            return Ok("off".into());
        }
        debug!(node, "standby result: {out}");
        Ok(out)
    }

    /// Put a node into ("on") or out of ("off") standby.
    pub async fn set_standby(&self, node: &str, status: &str) -> Result<bool, ExecError> {
        let result = self
            .exec
            .run(Some(node), &self.templates.standby_cmd(node, status))
            .await?;
        Ok(result.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::mock::MockTemplates;
    use crate::watch::mock::{MockWatchFactory, WatchPlan};
    use faultline_exec::RemoteShell;

    fn fixture(
        nodes: &[&str],
    ) -> (
        tempfile::TempDir,
        MockTemplates,
        MockWatchFactory,
        ClusterModel,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let templates = MockTemplates::new(dir.path(), nodes);
        let watches = MockWatchFactory::new();
        watches.on_default("fencing", WatchPlan::match_none());
        let env = TestEnv {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            dead_time_secs: 5,
            stable_time_secs: 0,
            start_time_secs: 5,
            settle_retries: 2,
            settle_delay_secs: 0,
            ..TestEnv::default()
        };
        let model = ClusterModel::new(
            Arc::new(env),
            Arc::new(RemoteExec::new(RemoteShell::loopback())),
            Arc::new(templates.clone()),
            Arc::new(watches.clone()),
        );
        (dir, templates, watches, model)
    }

    fn mark_all_up(model: &mut ClusterModel) {
        for node in model.env().nodes.clone() {
            model.set_status(&node, ObservedStatus::Up);
        }
    }

    #[tokio::test]
    async fn probe_reports_stable_node_and_marks_it_up() {
        let (_dir, _t, _w, mut model) = fixture(&["east", "west"]);
        assert_eq!(model.status_of("east"), ObservedStatus::Unknown);
        assert_eq!(model.probe("east").await.unwrap(), NodeProbe::Stable);
        assert_eq!(model.status_of("east"), ObservedStatus::Up);
    }

    #[tokio::test]
    async fn probe_corrects_status_to_down() {
        let (_dir, templates, _w, mut model) = fixture(&["east"]);
        model.set_status("east", ObservedStatus::Up);
        templates.set_status_output("east", "stopped");
        assert_eq!(model.probe("east").await.unwrap(), NodeProbe::Down);
        assert_eq!(model.status_of("east"), ObservedStatus::Down);
    }

    #[tokio::test]
    async fn probe_without_idle_marker_or_watch_match_is_unstable() {
        let (_dir, templates, watches, mut model) = fixture(&["east"]);
        templates.set_status_output("east", "ok starting up");
        watches.on("node-idle", WatchPlan::match_none());
        assert_eq!(model.probe("east").await.unwrap(), NodeProbe::Unstable);
        assert_eq!(model.status_of("east"), ObservedStatus::Up);
    }

    #[tokio::test]
    async fn stop_then_start_tracks_observed_status() {
        let (_dir, _t, _w, mut model) = fixture(&["east"]);
        model.set_status("east", ObservedStatus::Up);

        assert!(model.stop_node("east").await.unwrap());
        assert_eq!(model.status_of("east"), ObservedStatus::Down);

        assert!(model.start_node("east").await.unwrap());
        assert_eq!(model.status_of("east"), ObservedStatus::Up);
    }

    #[tokio::test]
    async fn healthy_cluster_has_exactly_one_partition() {
        let (_dir, _t, _w, mut model) = fixture(&["east", "west", "north"]);
        mark_all_up(&mut model);
        let partitions = model.find_partitions().await.unwrap();
        assert_eq!(partitions, vec![vec!["east", "north", "west"]]);
    }

    #[tokio::test]
    async fn find_partitions_is_order_independent() {
        let nodes = ["east", "west", "north", "south"];
        let (_dir, templates, _w, mut model) = fixture(&nodes);
        mark_all_up(&mut model);
        for n in ["east", "west"] {
            templates.set_view(n, &["east", "west"]);
        }
        for n in ["north", "south"] {
            templates.set_view(n, &["north", "south"]);
        }

        let mut forward = model.find_partitions().await.unwrap();
        forward.sort();

        // Same views probed in reverse node order.
        let reversed: Vec<&str> = nodes.iter().rev().copied().collect();
        let env = TestEnv {
            nodes: reversed.iter().map(|n| n.to_string()).collect(),
            ..model.env().as_ref().clone()
        };
        let mut backward_model = ClusterModel::new(
            Arc::new(env),
            Arc::clone(model.exec()),
            Arc::clone(model.templates()),
            Arc::clone(model.watches()),
        );
        mark_all_up(&mut backward_model);
        let mut backward = backward_model.find_partitions().await.unwrap();
        backward.sort();

        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 2);
    }

    #[tokio::test]
    async fn find_partitions_skips_down_nodes() {
        let (_dir, _t, _w, mut model) = fixture(&["east", "west"]);
        model.set_status("east", ObservedStatus::Up);
        model.set_status("west", ObservedStatus::Down);
        let partitions = model.find_partitions().await.unwrap();
        assert_eq!(partitions.len(), 1);
    }

    #[tokio::test]
    async fn quorum_first_confident_answer_wins() {
        let (_dir, templates, _w, mut model) = fixture(&["east", "west"]);
        mark_all_up(&mut model);
        assert!(model.has_quorum(None).await.unwrap());

        templates.set_quorum_output("east", "no idea");
        templates.set_quorum_output("west", "0");
        assert!(!model.has_quorum(None).await.unwrap());
    }

    #[tokio::test]
    async fn quorum_never_true_when_all_answers_ambiguous() {
        let (_dir, templates, _w, mut model) = fixture(&["east", "west"]);
        mark_all_up(&mut model);
        templates.set_quorum_output("east", "maybe");
        templates.set_quorum_output("west", "???");
        assert!(!model.has_quorum(None).await.unwrap());
    }

    #[tokio::test]
    async fn cluster_stable_when_partition_reports_idle() {
        let (_dir, _t, _w, mut model) = fixture(&["east", "west"]);
        mark_all_up(&mut model);
        assert!(model.cluster_stable(None, false).await.unwrap());
    }

    #[tokio::test]
    async fn cluster_unstable_when_watch_never_converges() {
        let (_dir, _t, watches, mut model) = fixture(&["east", "west"]);
        mark_all_up(&mut model);
        watches.on("cluster-stable", WatchPlan::match_none());
        assert!(!model.cluster_stable(None, false).await.unwrap());
    }

    #[tokio::test]
    async fn fencing_cleanup_reports_fenced_nodes() {
        let (_dir, templates, watches, mut model) = fixture(&["east", "west"]);
        mark_all_up(&mut model);
        watches.on(
            "fencing",
            WatchPlan::with_lines(vec![templates.pat_fencing_ok("west")]),
        );
        let mut watch = model.prepare_fencing_watcher().await;
        let fenced = model
            .fencing_cleanup("test", watch.as_mut())
            .await
            .unwrap()
            .expect("cluster stabilized");
        assert_eq!(fenced, vec!["west"]);
        assert_eq!(model.status_of("west"), ObservedStatus::Down);
    }

    #[tokio::test]
    async fn fencing_cleanup_without_matches_is_empty() {
        let (_dir, _t, _w, mut model) = fixture(&["east"]);
        mark_all_up(&mut model);
        let mut watch = model.prepare_fencing_watcher().await;
        let fenced = model
            .fencing_cleanup("test", watch.as_mut())
            .await
            .unwrap()
            .unwrap();
        assert!(fenced.is_empty());
    }

    #[tokio::test]
    async fn active_resources_filters_primitives_on_node() {
        let (_dir, templates, _w, mut model) = fixture(&["east", "west"]);
        mark_all_up(&mut model);
        templates.add_resource_line("Resource: id=web type=primitive host=east managed=1");
        templates.add_resource_line("Resource: id=db type=primitive host=west managed=1");
        templates.add_resource_line("Resource: id=group1 type=group host=east managed=1");
        let active = model.active_resources("east").await.unwrap();
        assert_eq!(active, vec!["web"]);
    }

    #[tokio::test]
    async fn resource_location_reports_hosting_up_nodes() {
        let (_dir, templates, _w, mut model) = fixture(&["east", "west"]);
        mark_all_up(&mut model);
        templates.set_resource_running("web", "west", true);
        let hosts = model.resource_location("web").await.unwrap();
        assert_eq!(hosts, vec!["west"]);
    }

    #[tokio::test]
    async fn standby_round_trip() {
        let (_dir, _t, _w, model) = fixture(&["east"]);
        assert_eq!(model.standby_status("east").await.unwrap(), "off");
        assert!(model.set_standby("east", "on").await.unwrap());
        assert_eq!(model.standby_status("east").await.unwrap(), "on");
    }

    #[tokio::test]
    async fn dc_detection_uses_status_markers() {
        let (_dir, templates, _w, model) = fixture(&["east"]);
        assert!(!model.is_node_dc("east").await.unwrap());
        templates.set_status_output("east", "ok S_IDLE DC");
        assert!(model.is_node_dc("east").await.unwrap());
    }
}
