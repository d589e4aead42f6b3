//! Per-scenario statistics.

use serde::Serialize;
use std::collections::BTreeMap;

/// Counters for one scenario instance.
///
/// Increment-only: counters are never decremented, and every invocation
/// records exactly one of success/failure/skipped. Named sub-events
/// (a node name, a transition type, a component name) accumulate in
/// `events` for post-run reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioStats {
    /// Invocations.
    pub calls: u64,
    /// Invocations that succeeded.
    pub success: u64,
    /// Invocations that failed.
    pub failure: u64,
    /// Invocations skipped because a precondition was unmet.
    pub skipped: u64,
    /// Post-invocation audit failures, counted separately.
    pub audit_fail: u64,
    /// Named sub-event counts.
    pub events: BTreeMap<String, u64>,
}

impl ScenarioStats {
    /// Record an invocation.
    pub fn incr_calls(&mut self) {
        self.calls += 1;
    }

    /// Record a success.
    pub fn incr_success(&mut self) {
        self.success += 1;
    }

    /// Record a failure.
    pub fn incr_failure(&mut self) {
        self.failure += 1;
    }

    /// Record a skip.
    pub fn incr_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Record an audit failure.
    pub fn incr_audit_fail(&mut self) {
        self.audit_fail += 1;
    }

    /// Increment (or initialize) a named sub-event count.
    pub fn bump(&mut self, name: &str) {
        *self.events.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Every call was resolved to exactly one outcome.
    pub fn consistent(&self) -> bool {
        self.calls == self.success + self.failure + self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_counters_sum_to_calls() {
        let mut stats = ScenarioStats::default();
        stats.incr_calls();
        stats.incr_success();
        stats.incr_calls();
        stats.incr_failure();
        stats.incr_calls();
        stats.incr_skipped();
        assert!(stats.consistent());
        assert_eq!(stats.calls, 3);
    }

    #[test]
    fn audit_failures_do_not_affect_consistency() {
        let mut stats = ScenarioStats::default();
        stats.incr_calls();
        stats.incr_success();
        stats.incr_audit_fail();
        assert!(stats.consistent());
        assert_eq!(stats.audit_fail, 1);
    }

    #[test]
    fn events_accumulate_by_name() {
        let mut stats = ScenarioStats::default();
        stats.bump("node:east");
        stats.bump("node:east");
        stats.bump("up->down");
        assert_eq!(stats.events["node:east"], 2);
        assert_eq!(stats.events["up->down"], 1);
    }

    #[test]
    fn stats_serialize_to_json() {
        let mut stats = ScenarioStats::default();
        stats.incr_calls();
        stats.incr_success();
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"calls\":1"));
        assert!(json.contains("\"success\":1"));
    }
}
