//! Mock convergence watcher for testing.
//!
//! Plans are registered per watch label; arming a watch consumes the
//! next plan for that label, or falls back to "everything matched" with
//! one synthesized line per host and pattern.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{LogWatch, WatchFactory};

/// Scripted behavior for one armed watch.
#[derive(Debug, Clone, Default)]
pub struct WatchPlan {
    /// Whether `poll_until_all_matched` reports full convergence.
    pub all_matched: bool,
    /// Lines returned by `poll_once`, in order. When empty and
    /// `all_matched`, lines are synthesized per host and pattern.
    pub lines: Vec<String>,
    /// Patterns reported unmatched. When empty and not `all_matched`,
    /// every armed pattern is reported unmatched.
    pub unmatched: Vec<String>,
}

impl WatchPlan {
    /// Every pattern matches; lines are synthesized from hosts/patterns.
    pub fn match_all() -> Self {
        Self {
            all_matched: true,
            ..Default::default()
        }
    }

    /// Nothing matches; every pattern is reported unmatched.
    pub fn match_none() -> Self {
        Self::default()
    }

    /// Full convergence with explicit matched lines.
    pub fn with_lines(lines: Vec<String>) -> Self {
        Self {
            all_matched: true,
            lines,
            ..Default::default()
        }
    }

    /// Partial convergence: the given patterns stay unmatched.
    pub fn partial(unmatched: Vec<String>) -> Self {
        Self {
            all_matched: false,
            unmatched,
            ..Default::default()
        }
    }
}

/// A record of one `arm` call, for assertions.
#[derive(Debug, Clone)]
pub struct ArmedRecord {
    /// Watch label.
    pub label: String,
    /// Patterns that were armed.
    pub patterns: Vec<String>,
    /// Hosts that were watched.
    pub hosts: Vec<String>,
}

#[derive(Debug, Default)]
struct MockWatchFactoryInner {
    plans: HashMap<String, VecDeque<WatchPlan>>,
    defaults: HashMap<String, WatchPlan>,
    armed: Vec<ArmedRecord>,
}

/// Mock watch factory for testing.
#[derive(Debug, Default)]
pub struct MockWatchFactory {
    inner: Arc<Mutex<MockWatchFactoryInner>>,
}

impl MockWatchFactory {
    /// Create a factory whose every watch defaults to full convergence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plan for the next watch armed with `label`.
    pub fn on(&self, label: &str, plan: WatchPlan) {
        let mut inner = self.inner.lock().unwrap();
        inner.plans.entry(label.to_string()).or_default().push_back(plan);
    }

    /// Set the sticky fallback plan for `label`, used whenever its
    /// queue is empty.
    pub fn on_default(&self, label: &str, plan: WatchPlan) {
        let mut inner = self.inner.lock().unwrap();
        inner.defaults.insert(label.to_string(), plan);
    }

    /// All `arm` calls seen so far.
    pub fn armed(&self) -> Vec<ArmedRecord> {
        self.inner.lock().unwrap().armed.clone()
    }

    /// The `arm` calls seen for one label.
    pub fn armed_for(&self, label: &str) -> Vec<ArmedRecord> {
        self.armed()
            .into_iter()
            .filter(|r| r.label == label)
            .collect()
    }
}

impl Clone for MockWatchFactory {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl WatchFactory for MockWatchFactory {
    async fn arm(
        &self,
        label: &str,
        patterns: &[String],
        _timeout: Duration,
        hosts: &[String],
    ) -> Box<dyn LogWatch> {
        let plan = {
            let mut inner = self.inner.lock().unwrap();
            inner.armed.push(ArmedRecord {
                label: label.to_string(),
                patterns: patterns.to_vec(),
                hosts: hosts.to_vec(),
            });
            inner
                .plans
                .get_mut(label)
                .and_then(VecDeque::pop_front)
                .or_else(|| inner.defaults.get(label).cloned())
                .unwrap_or_else(WatchPlan::match_all)
        };

        let lines = if plan.lines.is_empty() && plan.all_matched {
            // One synthesized "matched" line per host and pattern.
            hosts
                .iter()
                .flat_map(|h| patterns.iter().map(move |p| format!("{h} {p}")))
                .collect()
        } else {
            plan.lines.clone()
        };
        let unmatched = if plan.unmatched.is_empty() && !plan.all_matched {
            patterns.to_vec()
        } else {
            plan.unmatched.clone()
        };

        Box::new(MockWatch {
            all_matched: plan.all_matched,
            lines: lines.into(),
            unmatched,
        })
    }
}

/// A scripted watch handed out by [`MockWatchFactory`].
#[derive(Debug)]
pub struct MockWatch {
    all_matched: bool,
    lines: VecDeque<String>,
    unmatched: Vec<String>,
}

#[async_trait]
impl LogWatch for MockWatch {
    async fn poll_once(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    async fn poll_until_all_matched(&mut self, _allow_repeats: bool) -> bool {
        self.all_matched
    }

    fn unmatched_patterns(&self) -> Vec<String> {
        self.unmatched.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_plan_matches_all_with_synthesized_lines() {
        let factory = MockWatchFactory::new();
        let mut watch = factory
            .arm(
                "t",
                &["PAT".to_string()],
                Duration::from_secs(1),
                &["east".to_string()],
            )
            .await;
        assert!(watch.poll_until_all_matched(false).await);
        assert_eq!(watch.poll_once().await.as_deref(), Some("east PAT"));
        assert!(watch.unmatched_patterns().is_empty());
    }

    #[tokio::test]
    async fn match_none_reports_all_patterns_unmatched() {
        let factory = MockWatchFactory::new();
        factory.on("t", WatchPlan::match_none());
        let mut watch = factory
            .arm(
                "t",
                &["A".to_string(), "B".to_string()],
                Duration::from_secs(1),
                &[],
            )
            .await;
        assert!(!watch.poll_until_all_matched(false).await);
        assert_eq!(watch.unmatched_patterns(), vec!["A", "B"]);
        assert!(watch.poll_once().await.is_none());
    }

    #[tokio::test]
    async fn plans_are_consumed_in_order_per_label() {
        let factory = MockWatchFactory::new();
        factory.on("t", WatchPlan::match_none());
        let mut first = factory.arm("t", &[], Duration::ZERO, &[]).await;
        let mut second = factory.arm("t", &[], Duration::ZERO, &[]).await;
        assert!(!first.poll_until_all_matched(false).await);
        assert!(second.poll_until_all_matched(false).await);
    }

    #[tokio::test]
    async fn sticky_default_survives_repeated_arms() {
        let factory = MockWatchFactory::new();
        factory.on_default("t", WatchPlan::match_none());
        for _ in 0..3 {
            let mut watch = factory.arm("t", &[], Duration::ZERO, &[]).await;
            assert!(!watch.poll_until_all_matched(false).await);
        }
        // A queued plan still takes precedence over the default.
        factory.on("t", WatchPlan::match_all());
        let mut watch = factory.arm("t", &[], Duration::ZERO, &[]).await;
        assert!(watch.poll_until_all_matched(false).await);
    }

    #[tokio::test]
    async fn armed_calls_are_recorded() {
        let factory = MockWatchFactory::new();
        factory
            .arm(
                "label",
                &["P".to_string()],
                Duration::ZERO,
                &["west".to_string()],
            )
            .await;
        let armed = factory.armed_for("label");
        assert_eq!(armed.len(), 1);
        assert_eq!(armed[0].patterns, vec!["P"]);
        assert_eq!(armed[0].hosts, vec!["west"]);
    }
}
