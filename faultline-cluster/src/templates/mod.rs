//! Contract for the cluster-manager command and pattern template table.
//!
//! Every command the harness sends and every log signature it waits for
//! is owned by the target cluster manager, not by the harness. This
//! trait is the seam: a deployment supplies one implementation per
//! cluster-manager flavor. [`corosync::CorosyncTemplates`] is the
//! built-in table for Pacemaker on corosync; [`mock::MockTemplates`]
//! backs the unit tests with local shell state.

use crate::component::Component;

pub mod corosync;
pub mod mock;

/// Command and log-pattern templates for one cluster-manager flavor.
///
/// Command methods return full shell command strings ready to hand to
/// the executor; pattern methods return regex fragments for the
/// convergence watcher. Positional arguments are substituted by the
/// implementation.
pub trait ClusterTemplates: Send + Sync {
    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Dump the cluster manager's state on a node.
    fn status_cmd(&self, node: &str) -> String;
    /// Report the quorum indicator ("1"/"0") on a node.
    fn quorum_cmd(&self, node: &str) -> String;
    /// Dump the node's view of cluster membership.
    fn membership_cmd(&self, node: &str) -> String;
    /// Start the cluster stack on a node.
    fn start_cmd(&self, node: &str) -> String;
    /// Stop the cluster stack on a node.
    fn stop_cmd(&self, node: &str) -> String;
    /// Run on `node`: drop traffic from `target`.
    fn break_comm_cmd(&self, node: &str, target: &str) -> String;
    /// Run on `node`: restore traffic from `target`.
    fn fix_comm_cmd(&self, node: &str, target: &str) -> String;
    /// Query a node's standby state ("on"/"off").
    fn standby_query_cmd(&self, node: &str) -> String;
    /// Put a node into or out of standby.
    fn standby_cmd(&self, node: &str, status: &str) -> String;
    /// Enable or disable fencing cluster-wide.
    fn set_fencing_cmd(&self, enabled: bool) -> String;
    /// Enter or leave cluster-wide maintenance mode.
    fn maintenance_cmd(&self, on: bool) -> String;
    /// List configured resources.
    fn list_resources_cmd(&self) -> String;
    /// Inject a failure into a resource on a node.
    fn fail_resource_cmd(&self, rid: &str, node: &str) -> String;
    /// Move a resource (to a specific node when given).
    fn move_resource_cmd(&self, rid: &str, node: Option<&str>) -> String;
    /// Clear move constraints left by [`Self::move_resource_cmd`].
    fn clear_moves_cmd(&self, rid: &str) -> String;
    /// Delete a resource definition.
    fn delete_resource_cmd(&self, rid: &str) -> String;
    /// Define the connection resource for a remote-managed node.
    fn add_connection_resource_cmd(&self, rid: &str, server: &str, reconnect: bool) -> String;
    /// Define a throwaway resource pinned to a node.
    fn add_dummy_resource_cmd(&self, rid: &str, node: &str) -> String;
    /// Run on `node`: exit 0 iff the resource is active there.
    fn resource_running_cmd(&self, rid: &str, node: &str) -> String;
    /// Set the cluster recheck interval.
    fn set_recheck_interval_cmd(&self, value: &str) -> String;
    /// Clear the cluster recheck interval.
    fn clear_recheck_interval_cmd(&self) -> String;
    /// Set a permanent node attribute.
    fn set_node_attr_cmd(&self, node: &str, name: &str, value: &str) -> String;
    /// Query a permanent node attribute.
    fn query_node_attr_cmd(&self, node: &str, name: &str) -> String;
    /// Delete a permanent node attribute.
    fn del_node_attr_cmd(&self, node: &str, name: &str) -> String;
    /// Start the lightweight remote agent on a node.
    fn remote_agent_start_cmd(&self, node: &str) -> String;
    /// Stop the remote agent on a node.
    fn remote_agent_stop_cmd(&self, node: &str) -> String;
    /// Exit 0 iff the remote agent is installed on a node.
    fn remote_agent_check_cmd(&self, node: &str) -> String;
    /// Path of the shared authentication key for the remote agent.
    fn remote_key_path(&self) -> String;
    /// Purge a departed node from the membership records.
    fn purge_node_cmd(&self, node: &str) -> String;
    /// Ask the cluster to fence a node.
    fn fence_node_cmd(&self, node: &str) -> String;

    // ------------------------------------------------------------------
    // Status-output markers
    // ------------------------------------------------------------------

    /// Substring of the status output confirming the manager answers.
    fn ok_marker(&self) -> String;
    /// Substrings of the status output marking a settled node.
    fn idle_markers(&self) -> Vec<String>;
    /// Substrings of the status output marking the coordinator.
    fn dc_markers(&self) -> Vec<String>;

    // ------------------------------------------------------------------
    // Log patterns
    // ------------------------------------------------------------------

    /// A node announced its own departure.
    fn pat_we_stopped(&self, node: &str) -> String;
    /// `observer` noticed that `departed` left.
    fn pat_they_stopped(&self, observer: &str, departed: &str) -> String;
    /// First node of the cluster became operational.
    fn pat_local_started(&self, node: &str) -> String;
    /// A node joined an already-running cluster.
    fn pat_peer_started(&self, node: &str) -> String;
    /// Membership layer came up on a node.
    fn pat_infra_up(&self, node: &str) -> String;
    /// Cluster manager came up on a node.
    fn pat_cluster_up(&self, node: &str) -> String;
    /// The coordinator settled into the idle state.
    fn pat_dc_idle(&self) -> String;
    /// Patterns confirming a single node settled, for probe watches.
    fn pat_node_idle(&self, node: &str) -> Vec<String>;
    /// A fencing operation against `node` completed OK.
    fn pat_fencing_ok(&self, node: &str) -> String;
    /// A fencing operation against `node` was initiated.
    fn pat_fencing_start(&self, node: &str) -> String;
    /// Peers recorded `node` as fenced.
    fn pat_node_fenced(&self, node: &str) -> String;
    /// The supervisor saw `comp` die on `node`.
    fn pat_child_killed(&self, node: &str, comp: &str) -> String;
    /// The supervisor respawned `comp` on `node`.
    fn pat_child_respawn(&self, node: &str, comp: &str) -> String;
    /// Operation `op` on resource `rid` completed OK.
    fn pat_resource_op_ok(&self, rid: &str, op: &str) -> String;
    /// Operation `op` on `rid` completed OK on a remote-managed node.
    fn pat_resource_remote_op_ok(&self, rid: &str, op: &str, node: &str) -> String;
    /// The scheduler processed a failed operation for `rid`.
    fn pat_failed_op(&self, rid: &str) -> String;
    /// The scheduler was engaged (any policy recomputation).
    fn pat_scheduler_engaged(&self) -> String;

    /// The killable subprocesses of this cluster manager.
    fn components(&self) -> Vec<Component>;
}
