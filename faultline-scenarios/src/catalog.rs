//! The registered scenario set.
//!
//! Stop/start and the batch primitives are building blocks only; they
//! run as part of other scenarios and are not registered here.

use crate::scenario::Scenario;
use crate::scenarios::batch::{
    RestartOneByOneScenario, SimulStartScenario, SimulStopScenario, StartOneByOneScenario,
    StopOneByOneScenario,
};
use crate::scenarios::component_fail::ComponentFailScenario;
use crate::scenarios::fence_node::FenceNodeScenario;
use crate::scenarios::maintenance::MaintenanceModeScenario;
use crate::scenarios::remote_node::{RemoteMode, RemoteNodeScenario};
use crate::scenarios::resource_recover::ResourceRecoverScenario;
use crate::scenarios::split_brain::SplitBrainScenario;
use crate::scenarios::standby::StandbyScenario;
use crate::scenarios::stop_start::{FlipScenario, RestartScenario};

/// Every registered scenario, unfiltered. The runner applies
/// applicability gating against the live environment.
pub fn catalog() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(FlipScenario::new()),
        Box::new(RestartScenario::new()),
        Box::new(SimulStartScenario::new()),
        Box::new(SimulStopScenario::new()),
        Box::new(StartOneByOneScenario::new()),
        Box::new(StopOneByOneScenario::new()),
        Box::new(RestartOneByOneScenario::new()),
        Box::new(ComponentFailScenario::new()),
        Box::new(SplitBrainScenario::new()),
        Box::new(MaintenanceModeScenario::new()),
        Box::new(ResourceRecoverScenario::new()),
        Box::new(StandbyScenario::new()),
        Box::new(FenceNodeScenario::new()),
        Box::new(RemoteNodeScenario::new(RemoteMode::Basic)),
        Box::new(RemoteNodeScenario::new(RemoteMode::KillAgent)),
        Box::new(RemoteNodeScenario::new(RemoteMode::Migrate)),
        Box::new(RemoteNodeScenario::new(RemoteMode::RscFailure)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn scenario_names_are_unique() {
        let scenarios = catalog();
        let names: HashSet<String> = scenarios.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names.len(), scenarios.len());
    }

    #[test]
    fn remote_family_is_fully_registered() {
        let scenarios = catalog();
        for name in [
            "remote-basic",
            "remote-kill-agent",
            "remote-migrate",
            "remote-rsc-fail",
        ] {
            assert!(
                scenarios.iter().any(|s| s.name() == name),
                "missing {name}"
            );
        }
    }
}
