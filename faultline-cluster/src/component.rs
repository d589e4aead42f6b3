//! Cluster-manager subprocess descriptions.

use faultline_exec::{ExecError, RemoteExec};
use tracing::debug;

/// One named cluster-manager subprocess and what killing it looks like.
///
/// Constructed once per cluster-manager implementation and immutable
/// afterwards; scenarios that inject process failure pick one at random.
#[derive(Debug, Clone)]
pub struct Component {
    /// Logical process name.
    pub name: String,
    /// Command that kills the process on a node.
    pub kill_cmd: String,
    /// Log patterns signalling the death and its handling.
    pub pats: Vec<String>,
    /// Extra patterns expected only when the node is the coordinator.
    pub dc_pats: Vec<String>,
    /// Known-noise patterns to ignore while this component recovers.
    pub badnews_ignore: Vec<String>,
    /// Whether killing this component always reboots the node.
    pub triggers_reboot: bool,
    /// Whether this component is only meaningful on the coordinator.
    pub dc_only: bool,
}

impl Component {
    /// Kill this component on `node`. The exit code is data: a dead
    /// process may make the kill command itself fail.
    pub async fn kill(&self, exec: &RemoteExec, node: &str) -> Result<i32, ExecError> {
        debug!(component = %self.name, node, "killing component");
        let result = exec.run(Some(node), &self.kill_cmd).await?;
        Ok(result.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_exec::RemoteShell;

    #[tokio::test]
    async fn kill_runs_the_kill_command() {
        let exec = RemoteExec::new(RemoteShell::loopback());
        let comp = Component {
            name: "cib".into(),
            kill_cmd: "exit 7".into(),
            pats: vec![],
            dc_pats: vec![],
            badnews_ignore: vec![],
            triggers_reboot: false,
            dc_only: false,
        };
        let rc = comp.kill(&exec, "east").await.unwrap();
        assert_eq!(rc, 7);
    }
}
