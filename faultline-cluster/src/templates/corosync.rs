//! Template table for Pacemaker on corosync.

use crate::component::Component;

use super::ClusterTemplates;

/// Commands and log signatures for a Pacemaker/corosync cluster.
#[derive(Debug, Clone, Default)]
pub struct CorosyncTemplates;

impl CorosyncTemplates {
    /// Create the default table.
    pub fn new() -> Self {
        Self
    }
}

impl ClusterTemplates for CorosyncTemplates {
    fn status_cmd(&self, node: &str) -> String {
        format!("crmadmin -t 60000 -S {node} 2>/dev/null")
    }

    fn quorum_cmd(&self, _node: &str) -> String {
        "crm_node -q".into()
    }

    fn membership_cmd(&self, _node: &str) -> String {
        "crm_node -p".into()
    }

    fn start_cmd(&self, _node: &str) -> String {
        "service corosync start && service pacemaker start".into()
    }

    fn stop_cmd(&self, _node: &str) -> String {
        "service pacemaker stop; service corosync stop".into()
    }

    fn break_comm_cmd(&self, _node: &str, target: &str) -> String {
        format!("iptables -A INPUT -s {target} -j DROP >/dev/null 2>&1")
    }

    fn fix_comm_cmd(&self, _node: &str, target: &str) -> String {
        format!("iptables -D INPUT -s {target} -j DROP >/dev/null 2>&1")
    }

    fn standby_query_cmd(&self, node: &str) -> String {
        format!("crm_attribute -QG -N {node} -n standby -l forever -d off 2>/dev/null")
    }

    fn standby_cmd(&self, node: &str, status: &str) -> String {
        format!("crm_attribute -V -N {node} -n standby -l forever -v {status}")
    }

    fn set_fencing_cmd(&self, enabled: bool) -> String {
        if enabled {
            "crm_attribute -V -D -n stonith-enabled".into()
        } else {
            "crm_attribute -V -n stonith-enabled -v false".into()
        }
    }

    fn maintenance_cmd(&self, on: bool) -> String {
        format!("crm_attribute -V -n maintenance-mode -v {on}")
    }

    fn list_resources_cmd(&self) -> String {
        "crm_resource -c".into()
    }

    fn fail_resource_cmd(&self, rid: &str, node: &str) -> String {
        format!("crm_resource -V -F -r {rid} -H {node} >/dev/null 2>&1")
    }

    fn move_resource_cmd(&self, rid: &str, node: Option<&str>) -> String {
        match node {
            Some(n) => format!("crm_resource -M -r {rid} -N {n} -f"),
            None => format!("crm_resource -M -r {rid}"),
        }
    }

    fn clear_moves_cmd(&self, rid: &str) -> String {
        format!("crm_resource -U -r {rid}")
    }

    fn delete_resource_cmd(&self, rid: &str) -> String {
        format!("crm_resource -D -r {rid} -t primitive")
    }

    fn add_connection_resource_cmd(&self, rid: &str, server: &str, reconnect: bool) -> String {
        let mut attrs = format!(r#"<nvpair id="{rid}-server" name="server" value="{server}"/>"#);
        if reconnect {
            attrs.push_str(&format!(
                r#"<nvpair id="{rid}-reconnect" name="reconnect_interval" value="60s"/>"#
            ));
        }
        format!(
            r#"cibadmin -C -o resources -X '<primitive class="ocf" id="{rid}" provider="pacemaker" type="remote"><instance_attributes id="{rid}-attrs">{attrs}</instance_attributes><operations><op id="{rid}-monitor" interval="60s" name="monitor"/><op id="{rid}-start" interval="0" name="start" timeout="120"/></operations></primitive>'"#
        )
    }

    fn add_dummy_resource_cmd(&self, rid: &str, node: &str) -> String {
        format!(
            r#"cibadmin -C -o resources -X '<primitive class="ocf" id="{rid}" provider="pacemaker" type="Dummy"><operations><op id="{rid}-monitor" interval="10s" name="monitor"/></operations></primitive>' && cibadmin -C -o constraints -X '<rsc_location id="location-{rid}-{node}" node="{node}" rsc="{rid}" score="INFINITY"/>'"#
        )
    }

    fn resource_running_cmd(&self, rid: &str, node: &str) -> String {
        format!("crm_resource -W -r {rid} 2>/dev/null | grep -q {node}")
    }

    fn set_recheck_interval_cmd(&self, value: &str) -> String {
        format!("crm_attribute -V -n cluster-recheck-interval -v {value}")
    }

    fn clear_recheck_interval_cmd(&self) -> String {
        "crm_attribute -V -D -n cluster-recheck-interval".into()
    }

    fn set_node_attr_cmd(&self, node: &str, name: &str, value: &str) -> String {
        format!("crm_attribute -l forever -n {name} -v {value} -N {node}")
    }

    fn query_node_attr_cmd(&self, node: &str, name: &str) -> String {
        format!("crm_attribute -l forever -n {name} -Q -N {node}")
    }

    fn del_node_attr_cmd(&self, node: &str, name: &str) -> String {
        format!("crm_attribute -l forever -n {name} -D -N {node}")
    }

    fn remote_agent_start_cmd(&self, _node: &str) -> String {
        "service pacemaker_remote start".into()
    }

    fn remote_agent_stop_cmd(&self, _node: &str) -> String {
        "service pacemaker_remote stop".into()
    }

    fn remote_agent_check_cmd(&self, _node: &str) -> String {
        "type pacemaker_remoted >/dev/null 2>&1".into()
    }

    fn remote_key_path(&self) -> String {
        "/etc/pacemaker/authkey".into()
    }

    fn purge_node_cmd(&self, node: &str) -> String {
        format!("crm_node --force --remove {node}")
    }

    fn fence_node_cmd(&self, node: &str) -> String {
        format!("stonith_admin --reboot {node}")
    }

    fn ok_marker(&self) -> String {
        "ok".into()
    }

    fn idle_markers(&self) -> Vec<String> {
        vec!["S_IDLE".into(), "S_NOT_DC".into()]
    }

    fn dc_markers(&self) -> Vec<String> {
        vec![
            "S_IDLE".into(),
            "S_INTEGRATION".into(),
            "S_FINALIZE_JOIN".into(),
            "S_POLICY_ENGINE".into(),
            "S_TRANSITION_ENGINE".into(),
        ]
    }

    fn pat_we_stopped(&self, node: &str) -> String {
        format!(r"{node}\W.*Corosync Cluster Engine exiting normally")
    }

    fn pat_they_stopped(&self, observer: &str, departed: &str) -> String {
        format!(r"{observer}\W.*crmd.*Node {departed}(\[|\s).*state is now lost")
    }

    fn pat_local_started(&self, node: &str) -> String {
        format!(r"{node}\W.*The local CRM is operational")
    }

    fn pat_peer_started(&self, node: &str) -> String {
        format!(r"{node}\W.*State transition.*-> S_NOT_DC")
    }

    fn pat_infra_up(&self, node: &str) -> String {
        format!(r"{node}\W.*corosync.*Initializing transport")
    }

    fn pat_cluster_up(&self, node: &str) -> String {
        format!(r"{node}\W.*pacemakerd.*Starting Pacemaker")
    }

    fn pat_dc_idle(&self) -> String {
        r"crmd.*State transition.*-> S_IDLE".into()
    }

    fn pat_node_idle(&self, node: &str) -> Vec<String> {
        vec![
            r"Current ping state: (S_IDLE|S_NOT_DC)".into(),
            self.pat_peer_started(node),
            format!(r"{node}\W.*State transition.*-> S_IDLE"),
        ]
    }

    fn pat_fencing_ok(&self, node: &str) -> String {
        format!(r"stonith.*remote_op_done.*Operation reboot of {node} by .*: OK")
    }

    fn pat_fencing_start(&self, node: &str) -> String {
        format!(r"Initiating remote operation reboot for {node}")
    }

    fn pat_node_fenced(&self, node: &str) -> String {
        format!(r"crmd.*Peer {node} was terminated \(reboot\) by .* for .*: OK")
    }

    fn pat_child_killed(&self, node: &str, comp: &str) -> String {
        format!(r"{node}\W.*pacemakerd.*Child process {comp} terminated with signal 9")
    }

    fn pat_child_respawn(&self, node: &str, comp: &str) -> String {
        format!(r"{node}\W.*pacemakerd.*Respawning failed child process: {comp}")
    }

    fn pat_resource_op_ok(&self, rid: &str, op: &str) -> String {
        format!(r"crmd.*Operation {rid}_{op}.*:.*ok")
    }

    fn pat_resource_remote_op_ok(&self, rid: &str, op: &str, node: &str) -> String {
        format!(r"crmd.*Operation {rid}_{op}.*on {node}.*:.*ok")
    }

    fn pat_failed_op(&self, rid: &str) -> String {
        format!(r"pengine.*:\s+warning:.*Processing failed op \w+ for {rid} on")
    }

    fn pat_scheduler_engaged(&self) -> String {
        r"State transition .* -> S_POLICY_ENGINE".into()
    }

    fn components(&self) -> Vec<Component> {
        let common_ignore: Vec<String> = vec![
            "Pending action:".into(),
            "Lost connection to the CIB service".into(),
            "Connection to the CIB terminated".into(),
            r"Resource .* was active at shutdown".into(),
        ];

        let kill = |proc: &str| format!("killall -9 {proc}");

        vec![
            Component {
                name: "corosync".into(),
                kill_cmd: kill("corosync"),
                pats: vec![
                    r"State transition .* S_RECOVERY".into(),
                    r"crmd.*Input I_TERMINATE from do_recover".into(),
                    r"crmd.*I_ERROR.*crmd_cib_connection_destroy".into(),
                    r"State transition S_STARTING -> S_PENDING".into(),
                ],
                dc_pats: vec![],
                badnews_ignore: common_ignore.clone(),
                triggers_reboot: false,
                dc_only: false,
            },
            Component {
                name: "cib".into(),
                kill_cmd: kill("cib"),
                pats: vec![
                    r"State transition .* S_RECOVERY".into(),
                    r"Lost connection to the CIB service".into(),
                    r"crmd.*Input I_TERMINATE from do_recover".into(),
                ],
                dc_pats: vec![],
                badnews_ignore: common_ignore.clone(),
                triggers_reboot: false,
                dc_only: false,
            },
            Component {
                name: "lrmd".into(),
                kill_cmd: kill("lrmd"),
                pats: vec![
                    r"State transition .* S_RECOVERY".into(),
                    r"LRM Connection failed".into(),
                    r"crmd.*I_ERROR.*lrm_connection_destroy".into(),
                    r"State transition S_STARTING -> S_PENDING".into(),
                ],
                dc_pats: vec![],
                badnews_ignore: common_ignore.clone(),
                triggers_reboot: false,
                dc_only: false,
            },
            Component {
                name: "crmd".into(),
                kill_cmd: kill("crmd"),
                pats: vec![
                    r"State transition .* S_IDLE".into(),
                    r"State transition S_STARTING -> S_PENDING".into(),
                ],
                dc_pats: vec![],
                badnews_ignore: common_ignore.clone(),
                triggers_reboot: false,
                dc_only: false,
            },
            Component {
                name: "pengine".into(),
                kill_cmd: kill("pengine"),
                pats: vec![
                    r"State transition .* S_RECOVERY".into(),
                    r"crmd.*Input I_TERMINATE from do_recover".into(),
                    r"crmd.*CRIT.*: Connection to the Policy Engine failed".into(),
                ],
                dc_pats: vec![],
                badnews_ignore: common_ignore.clone(),
                triggers_reboot: false,
                dc_only: true,
            },
            Component {
                name: "stonithd".into(),
                kill_cmd: kill("stonithd"),
                pats: vec![],
                dc_pats: vec![
                    r"crmd.*CRIT.*: Fencing daemon connection failed".into(),
                    r"Attempting connection to fencing daemon".into(),
                ],
                badnews_ignore: common_ignore,
                triggers_reboot: false,
                dc_only: false,
            },
        ]
    }
}
