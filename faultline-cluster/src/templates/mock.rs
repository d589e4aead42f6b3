//! Mock template table for testing.
//!
//! Commands are local shell snippets over a scratch directory, so unit
//! tests exercise the full command path through a loopback executor
//! without a live cluster: node status, membership views, standby state
//! and node attributes are all plain files the tests can inspect and
//! preload. Patterns are literal tokens the mock watcher echoes back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::component::Component;

use super::ClusterTemplates;

#[derive(Debug)]
struct MockInner {
    dir: PathBuf,
    nodes: Vec<String>,
}

/// Template table backed by files under a scratch directory.
#[derive(Debug, Clone)]
pub struct MockTemplates {
    inner: Arc<MockInner>,
}

impl MockTemplates {
    /// Create the table over `dir` for the given node set.
    ///
    /// Every node starts with a full membership view.
    pub fn new(dir: &Path, nodes: &[&str]) -> Self {
        let inner = Arc::new(MockInner {
            dir: dir.to_path_buf(),
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
        });
        let this = Self { inner };
        let full = this.full_view();
        for node in nodes {
            std::fs::write(this.path(&format!("view-{node}")), &full).unwrap();
        }
        this
    }

    fn path(&self, name: &str) -> PathBuf {
        self.inner.dir.join(name)
    }

    fn full_view(&self) -> String {
        self.inner.nodes.join(" ")
    }

    /// Override the status-command output for a node.
    pub fn set_status_output(&self, node: &str, text: &str) {
        std::fs::write(self.path(&format!("status-{node}")), text).unwrap();
    }

    /// Override the quorum-command output for a node.
    pub fn set_quorum_output(&self, node: &str, text: &str) {
        std::fs::write(self.path(&format!("quorum-{node}")), text).unwrap();
    }

    /// Override a node's membership view.
    pub fn set_view(&self, node: &str, members: &[&str]) {
        std::fs::write(self.path(&format!("view-{node}")), members.join(" ")).unwrap();
    }

    /// Append one line to the resource listing.
    pub fn add_resource_line(&self, line: &str) {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path("resources"))
            .unwrap();
        writeln!(f, "{line}").unwrap();
    }

    /// Mark a resource as active (or not) on a node.
    pub fn set_resource_running(&self, rid: &str, node: &str, running: bool) {
        let p = self.path(&format!("running-{rid}-{node}"));
        if running {
            std::fs::write(p, "").unwrap();
        } else {
            let _ = std::fs::remove_file(p);
        }
    }

    /// Set the exit code of the fence command.
    pub fn set_fence_rc(&self, rc: i32) {
        std::fs::write(self.path("fence-rc"), rc.to_string()).unwrap();
    }

    /// True if the remote agent was started on `node`.
    pub fn agent_running(&self, node: &str) -> bool {
        self.path(&format!("agent-{node}")).exists()
    }
}

impl ClusterTemplates for MockTemplates {
    fn status_cmd(&self, node: &str) -> String {
        format!(
            "cat {p} 2>/dev/null || echo 'ok S_IDLE'",
            p = self.path(&format!("status-{node}")).display()
        )
    }

    fn quorum_cmd(&self, node: &str) -> String {
        format!(
            "cat {p} 2>/dev/null || echo 1",
            p = self.path(&format!("quorum-{node}")).display()
        )
    }

    fn membership_cmd(&self, node: &str) -> String {
        format!(
            "cat {p} 2>/dev/null",
            p = self.path(&format!("view-{node}")).display()
        )
    }

    fn start_cmd(&self, node: &str) -> String {
        format!(
            "printf 'ok S_IDLE' > {p}",
            p = self.path(&format!("status-{node}")).display()
        )
    }

    fn stop_cmd(&self, node: &str) -> String {
        format!(
            "printf 'stopped' > {p}",
            p = self.path(&format!("status-{node}")).display()
        )
    }

    fn break_comm_cmd(&self, node: &str, target: &str) -> String {
        let ours = self.path(&format!("view-{node}"));
        let theirs = self.path(&format!("view-{target}"));
        format!(
            "sed -i 's/{target}//g' {ours}; sed -i 's/{node}//g' {theirs}",
            ours = ours.display(),
            theirs = theirs.display()
        )
    }

    fn fix_comm_cmd(&self, node: &str, target: &str) -> String {
        let full = self.full_view();
        let ours = self.path(&format!("view-{node}"));
        let theirs = self.path(&format!("view-{target}"));
        format!(
            "printf '{full}' > {ours}; printf '{full}' > {theirs}",
            ours = ours.display(),
            theirs = theirs.display()
        )
    }

    fn standby_query_cmd(&self, node: &str) -> String {
        format!(
            "cat {p} 2>/dev/null || echo off",
            p = self.path(&format!("standby-{node}")).display()
        )
    }

    fn standby_cmd(&self, node: &str, status: &str) -> String {
        format!(
            "printf '{status}' > {p}",
            p = self.path(&format!("standby-{node}")).display()
        )
    }

    fn set_fencing_cmd(&self, _enabled: bool) -> String {
        "true".into()
    }

    fn maintenance_cmd(&self, on: bool) -> String {
        // Maintenance mode flips every resource's managed flag.
        let p = self.path("resources");
        let (from, to) = if on { ("1", "0") } else { ("0", "1") };
        format!(
            "sed -i 's/managed={from}/managed={to}/g' {p} 2>/dev/null || true",
            p = p.display()
        )
    }

    fn list_resources_cmd(&self) -> String {
        format!(
            "cat {p} 2>/dev/null || true",
            p = self.path("resources").display()
        )
    }

    fn fail_resource_cmd(&self, _rid: &str, _node: &str) -> String {
        "true".into()
    }

    fn move_resource_cmd(&self, _rid: &str, _node: Option<&str>) -> String {
        "true".into()
    }

    fn clear_moves_cmd(&self, _rid: &str) -> String {
        "true".into()
    }

    fn delete_resource_cmd(&self, _rid: &str) -> String {
        "true".into()
    }

    fn add_connection_resource_cmd(&self, _rid: &str, _server: &str, _reconnect: bool) -> String {
        "true".into()
    }

    fn add_dummy_resource_cmd(&self, _rid: &str, _node: &str) -> String {
        "true".into()
    }

    fn resource_running_cmd(&self, rid: &str, node: &str) -> String {
        format!(
            "test -f {p}",
            p = self.path(&format!("running-{rid}-{node}")).display()
        )
    }

    fn set_recheck_interval_cmd(&self, _value: &str) -> String {
        "true".into()
    }

    fn clear_recheck_interval_cmd(&self) -> String {
        "true".into()
    }

    fn set_node_attr_cmd(&self, node: &str, name: &str, value: &str) -> String {
        format!(
            "printf '{value}' > {p}",
            p = self.path(&format!("attr-{node}-{name}")).display()
        )
    }

    fn query_node_attr_cmd(&self, node: &str, name: &str) -> String {
        format!(
            "cat {p}",
            p = self.path(&format!("attr-{node}-{name}")).display()
        )
    }

    fn del_node_attr_cmd(&self, node: &str, name: &str) -> String {
        format!(
            "rm {p}",
            p = self.path(&format!("attr-{node}-{name}")).display()
        )
    }

    fn remote_agent_start_cmd(&self, node: &str) -> String {
        format!(
            "printf on > {p}",
            p = self.path(&format!("agent-{node}")).display()
        )
    }

    fn remote_agent_stop_cmd(&self, node: &str) -> String {
        format!(
            "rm -f {p}",
            p = self.path(&format!("agent-{node}")).display()
        )
    }

    fn remote_agent_check_cmd(&self, _node: &str) -> String {
        "true".into()
    }

    fn remote_key_path(&self) -> String {
        self.path("authkey").display().to_string()
    }

    fn purge_node_cmd(&self, _node: &str) -> String {
        "true".into()
    }

    fn fence_node_cmd(&self, _node: &str) -> String {
        format!(
            "exit $(cat {p} 2>/dev/null || echo 0)",
            p = self.path("fence-rc").display()
        )
    }

    fn ok_marker(&self) -> String {
        "ok".into()
    }

    fn idle_markers(&self) -> Vec<String> {
        vec!["S_IDLE".into(), "S_NOT_DC".into()]
    }

    fn dc_markers(&self) -> Vec<String> {
        vec!["DC".into()]
    }

    fn pat_we_stopped(&self, node: &str) -> String {
        format!("STOPPED {node}")
    }

    fn pat_they_stopped(&self, observer: &str, departed: &str) -> String {
        format!("SAW-LOST {observer} {departed}")
    }

    fn pat_local_started(&self, node: &str) -> String {
        format!("FIRST-UP {node}")
    }

    fn pat_peer_started(&self, node: &str) -> String {
        format!("JOINED {node}")
    }

    fn pat_infra_up(&self, node: &str) -> String {
        format!("INFRA-UP {node}")
    }

    fn pat_cluster_up(&self, node: &str) -> String {
        format!("MANAGER-UP {node}")
    }

    fn pat_dc_idle(&self) -> String {
        "DC-IDLE".into()
    }

    fn pat_node_idle(&self, node: &str) -> Vec<String> {
        vec![format!("IDLE {node}")]
    }

    fn pat_fencing_ok(&self, node: &str) -> String {
        format!("FENCED {node}")
    }

    fn pat_fencing_start(&self, node: &str) -> String {
        format!("FENCING {node}")
    }

    fn pat_node_fenced(&self, node: &str) -> String {
        format!("PEER-FENCED {node}")
    }

    fn pat_child_killed(&self, node: &str, comp: &str) -> String {
        format!("KILLED {node} {comp}")
    }

    fn pat_child_respawn(&self, node: &str, comp: &str) -> String {
        format!("RESPAWNED {node} {comp}")
    }

    fn pat_resource_op_ok(&self, rid: &str, op: &str) -> String {
        format!("RSC-OK {rid} {op}")
    }

    fn pat_resource_remote_op_ok(&self, rid: &str, op: &str, node: &str) -> String {
        format!("RSC-REMOTE-OK {rid} {op} {node}")
    }

    fn pat_failed_op(&self, rid: &str) -> String {
        format!("FAILED-OP {rid}")
    }

    fn pat_scheduler_engaged(&self) -> String {
        "SCHEDULER".into()
    }

    fn components(&self) -> Vec<Component> {
        vec![
            Component {
                name: "quorum-daemon".into(),
                kill_cmd: "true".into(),
                pats: vec!["RECOVERED quorum-daemon".into()],
                dc_pats: vec![],
                badnews_ignore: vec![],
                triggers_reboot: false,
                dc_only: false,
            },
            Component {
                name: "scheduler".into(),
                kill_cmd: "true".into(),
                pats: vec!["RECOVERED scheduler".into()],
                dc_pats: vec!["DC-RECOVERED scheduler".into()],
                badnews_ignore: vec![],
                triggers_reboot: false,
                dc_only: true,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_start_full() {
        let dir = tempfile::tempdir().unwrap();
        let t = MockTemplates::new(dir.path(), &["east", "west"]);
        let view = std::fs::read_to_string(dir.path().join("view-east")).unwrap();
        assert_eq!(view, "east west");
        let _ = t;
    }

    #[test]
    fn status_override_is_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let t = MockTemplates::new(dir.path(), &["east"]);
        t.set_status_output("east", "stopped");
        let cmd = t.status_cmd("east");
        assert!(cmd.contains("status-east"));
    }
}
