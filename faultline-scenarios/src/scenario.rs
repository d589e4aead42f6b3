//! The scenario lifecycle: every fault-injection scenario is one
//! implementation of [`Scenario`], driven sequentially through
//! applicability gating, setup, invocation with statistics, teardown,
//! and audit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, warn};

use faultline_cluster::watch::LogWatch;
use faultline_cluster::{ClusterModel, ClusterTemplates, TestEnv};
use faultline_exec::{CommandResult, ExecError, RemoteExec};

use crate::stats::ScenarioStats;

/// The resolution of one scenario invocation.
///
/// `Skipped` means a precondition was unmet through no fault of the
/// system under test; it never counts as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The scenario did what it set out to do.
    Success,
    /// The scenario ran and the cluster misbehaved.
    Failure(String),
    /// The scenario did not apply right now.
    Skipped,
}

impl Outcome {
    /// True for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// True for [`Outcome::Failure`].
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// True for [`Outcome::Skipped`].
    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }
}

/// Name, statistics, and timers shared by every scenario.
#[derive(Debug)]
pub struct ScenarioCore {
    /// Scenario name, used in logs and reports.
    pub name: String,
    stats: ScenarioStats,
    timers: HashMap<String, Instant>,
    passed: bool,
}

impl ScenarioCore {
    /// Create the core for a named scenario.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stats: ScenarioStats::default(),
            timers: HashMap::new(),
            passed: true,
        }
    }

    /// The statistics collected so far.
    pub fn stats(&self) -> &ScenarioStats {
        &self.stats
    }

    /// Whether the current invocation has recorded no failure yet.
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Record an invocation and reset the per-run pass flag.
    pub fn begin_call(&mut self) {
        self.stats.incr_calls();
        self.passed = true;
    }

    /// Increment a named sub-event counter.
    pub fn bump(&mut self, name: &str) {
        self.stats.bump(name);
    }

    /// Record a success.
    pub fn success(&mut self) -> Outcome {
        self.stats.incr_success();
        Outcome::Success
    }

    /// Record a failure and log it with the scenario name.
    pub fn failure(&mut self, reason: impl Into<String>) -> Outcome {
        let reason = reason.into();
        self.passed = false;
        self.stats.incr_failure();
        error!("Test {:<24} FAILED: {reason}", self.name);
        Outcome::Failure(reason)
    }

    /// Record a skip.
    pub fn skipped(&mut self) -> Outcome {
        self.stats.incr_skipped();
        Outcome::Skipped
    }

    /// Record an audit failure; counted apart from scenario failures.
    pub fn record_audit_fail(&mut self) {
        self.passed = false;
        self.stats.incr_audit_fail();
    }

    /// Start (or restart) a named timer.
    pub fn set_timer(&mut self, key: &str) {
        self.timers.insert(key.to_string(), Instant::now());
    }

    /// Read and clear a named timer, logging the elapsed duration.
    pub fn log_timer(&mut self, key: &str) -> Option<Duration> {
        let elapsed = self.timers.remove(key)?.elapsed();
        debug!("{}:{key} runtime: {:.2}s", self.name, elapsed.as_secs_f64());
        Some(elapsed)
    }
}

/// An invariant checked against cluster state after every invocation.
///
/// Audits are supplied by the deployment; a failing audit means a side
/// effect of an earlier run leaked into this one.
#[async_trait]
pub trait AuditCheck: Send + Sync {
    /// Audit name for logs.
    fn name(&self) -> &str;
    /// True if the invariant holds.
    async fn check(&self, model: &mut ClusterModel) -> bool;
}

/// Everything a scenario needs to act on the cluster, owned by the
/// sequential driver and lent to one scenario at a time.
pub struct ScenarioContext {
    /// The run environment.
    pub env: Arc<TestEnv>,
    /// The cluster state model.
    pub model: ClusterModel,
    /// Seeded random source for reproducible selection.
    pub rng: StdRng,
    /// Audits attached to this run.
    pub audits: Vec<Box<dyn AuditCheck>>,
}

impl ScenarioContext {
    /// Build a context; the RNG is seeded from `env.seed` when set.
    pub fn new(env: Arc<TestEnv>, model: ClusterModel) -> Self {
        let rng = match env.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            env,
            model,
            rng,
            audits: Vec::new(),
        }
    }

    /// The template table, cloned out of the model.
    pub fn templates(&self) -> Arc<dyn ClusterTemplates> {
        Arc::clone(self.model.templates())
    }

    /// The executor, cloned out of the model.
    pub fn exec(&self) -> Arc<RemoteExec> {
        Arc::clone(self.model.exec())
    }

    /// Run a command on one node.
    pub async fn run_on(&self, node: &str, command: &str) -> Result<CommandResult, ExecError> {
        self.model.exec().run(Some(node), command).await
    }

    /// Arm a convergence watch.
    pub async fn arm(
        &self,
        label: &str,
        patterns: &[String],
        timeout_secs: u64,
        hosts: &[String],
    ) -> Box<dyn LogWatch> {
        self.model
            .watches()
            .arm(label, patterns, Duration::from_secs(timeout_secs), hosts)
            .await
    }

    fn audit_parts(&mut self) -> (&mut ClusterModel, &[Box<dyn AuditCheck>]) {
        (&mut self.model, &self.audits)
    }
}

/// One fault-injection scenario.
///
/// Concrete scenarios implement `invoke` (and override the hooks they
/// need); composition happens by owning other scenarios and calling
/// their [`Scenario::run`].
#[async_trait]
pub trait Scenario: Send + Sync {
    /// Shared name/statistics/timer state.
    fn core(&self) -> &ScenarioCore;
    /// Mutable access to the shared state.
    fn core_mut(&mut self) -> &mut ScenarioCore;

    /// Scenario name.
    fn name(&self) -> &str {
        &self.core().name
    }

    /// Whether this scenario may run in the current environment. An
    /// inapplicable scenario is never invoked and never counted.
    async fn is_applicable(&self, cx: &mut ScenarioContext) -> bool {
        let _ = cx;
        true
    }

    /// Establish preconditions. An error here is a setup failure:
    /// fatal to this invocation, never retried.
    async fn setup(&mut self, cx: &mut ScenarioContext, node: &str) -> Result<(), ExecError> {
        let _ = (cx, node);
        Ok(())
    }

    /// The scenario body. Transport errors propagate; everything else
    /// is resolved to an [`Outcome`] through the core helpers.
    async fn invoke(
        &mut self,
        cx: &mut ScenarioContext,
        node: &str,
    ) -> Result<Outcome, ExecError>;

    /// Undo scenario side effects. Runs even after a failed invoke.
    async fn teardown(&mut self, cx: &mut ScenarioContext, node: &str) -> Result<(), ExecError> {
        let _ = (cx, node);
        Ok(())
    }

    /// Log patterns that are expected noise while this scenario runs.
    fn errors_to_ignore(&self) -> Vec<String> {
        Vec::new()
    }

    /// Drive one full invocation: count the call, establish
    /// preconditions, invoke, and tear down. Exactly one of
    /// success/failure/skipped is recorded.
    async fn run(&mut self, cx: &mut ScenarioContext, node: &str) -> Outcome {
        self.core_mut().begin_call();
        if let Err(e) = self.setup(cx, node).await {
            return self.core_mut().failure(format!("setup failed: {e}"));
        }
        let outcome = match self.invoke(cx, node).await {
            Ok(outcome) => outcome,
            Err(e) => self.core_mut().failure(format!("transport failure: {e}")),
        };
        if let Err(e) = self.teardown(cx, node).await {
            warn!("{} teardown failed: {e}", self.core().name);
        }
        outcome
    }

    /// Run the attached audits; failures are counted separately from
    /// scenario failures.
    async fn audit(&mut self, cx: &mut ScenarioContext) -> bool {
        let mut passed = true;
        let name = self.core().name.clone();
        let (model, audits) = cx.audit_parts();
        for audit in audits {
            if !audit.check(model).await {
                error!("Internal {name} audit {} FAILED", audit.name());
                self.core_mut().record_audit_fail();
                passed = false;
            }
        }
        passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fixture, PartitionCountAudit};

    struct AlwaysSkips {
        core: ScenarioCore,
    }

    #[async_trait]
    impl Scenario for AlwaysSkips {
        fn core(&self) -> &ScenarioCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut ScenarioCore {
            &mut self.core
        }
        async fn invoke(
            &mut self,
            _cx: &mut ScenarioContext,
            _node: &str,
        ) -> Result<Outcome, ExecError> {
            Ok(self.core_mut().skipped())
        }
    }

    #[tokio::test]
    async fn run_records_exactly_one_outcome_per_call() {
        let mut fx = fixture(&["east"]);
        let mut scenario = AlwaysSkips {
            core: ScenarioCore::new("skippy"),
        };
        for _ in 0..3 {
            let outcome = scenario.run(&mut fx.cx, "east").await;
            assert!(outcome.is_skipped());
            assert!(scenario.core().stats().consistent());
        }
        assert_eq!(scenario.core().stats().calls, 3);
        assert_eq!(scenario.core().stats().skipped, 3);
    }

    #[tokio::test]
    async fn failing_audit_increments_audit_fail_only() {
        let mut fx = fixture(&["east"]);
        // One partition observed, two expected: the audit must fail.
        fx.cx.model.set_status("east", faultline_cluster::ObservedStatus::Up);
        fx.cx.model.partitions_expected = 2;
        fx.cx.audits.push(Box::new(PartitionCountAudit));

        let mut scenario = AlwaysSkips {
            core: ScenarioCore::new("skippy"),
        };
        scenario.run(&mut fx.cx, "east").await;
        assert!(!scenario.audit(&mut fx.cx).await);
        let stats = scenario.core().stats();
        assert_eq!(stats.audit_fail, 1);
        assert_eq!(stats.failure, 0);
        assert!(stats.consistent());
    }

    #[tokio::test]
    async fn timers_are_write_once_read_once() {
        let mut core = ScenarioCore::new("t");
        core.set_timer("phase");
        assert!(core.log_timer("phase").is_some());
        assert!(core.log_timer("phase").is_none());
    }

    #[test]
    fn seeded_contexts_draw_identical_sequences() {
        use rand::Rng;
        let fx_a = fixture(&["east"]);
        let fx_b = fixture(&["east"]);
        let mut rng_a = fx_a.cx.rng.clone();
        let mut rng_b = fx_b.cx.rng.clone();
        for _ in 0..8 {
            assert_eq!(rng_a.gen_range(0..100u32), rng_b.gen_range(0..100u32));
        }
    }
}
