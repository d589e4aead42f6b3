//! Contract for the distributed log-convergence watcher.
//!
//! The watcher itself lives outside this crate: it tails logs on a set
//! of hosts and reports when expected signatures appear. Scenarios only
//! need to arm a watch, poll it, and ask for leftovers.

use async_trait::async_trait;
use std::time::Duration;

pub mod mock;

/// One armed convergence watch.
#[async_trait]
pub trait LogWatch: Send {
    /// Return the next matched line, or `None` if nothing new matched
    /// within the watch's window.
    async fn poll_once(&mut self) -> Option<String>;

    /// Block until every armed pattern has matched or the timeout
    /// elapses; true only on full convergence. `allow_repeats` lets one
    /// log line satisfy a pattern more than once.
    async fn poll_until_all_matched(&mut self, allow_repeats: bool) -> bool;

    /// Patterns that have not matched yet.
    fn unmatched_patterns(&self) -> Vec<String>;
}

/// Arms convergence watches.
#[async_trait]
pub trait WatchFactory: Send + Sync {
    /// Start watching `hosts` for `patterns`, bounded by `timeout`.
    ///
    /// The label names the watch in logs and diagnostics.
    async fn arm(
        &self,
        label: &str,
        patterns: &[String],
        timeout: Duration,
        hosts: &[String],
    ) -> Box<dyn LogWatch>;
}
