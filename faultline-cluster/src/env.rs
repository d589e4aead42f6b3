//! Harness environment configuration.
//!
//! Loaded from a TOML file (default: `faultline.toml`). Every timing and
//! gating knob the scenarios consult lives here, so a test run is fully
//! described by one file plus a seed.

use serde::Deserialize;
use std::path::PathBuf;

/// Environment for one harness run.
#[derive(Debug, Clone, Deserialize)]
pub struct TestEnv {
    /// Cluster node host names, in fixed order.
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Seconds to wait for the cluster to notice a dead node.
    #[serde(default = "default_dead_time")]
    pub dead_time_secs: u64,
    /// Seconds to allow state to settle after a transition.
    #[serde(default = "default_stable_time")]
    pub stable_time_secs: u64,
    /// Seconds to wait for a node to come up.
    #[serde(default = "default_start_time")]
    pub start_time_secs: u64,

    /// Gate for scenarios that can wedge a cluster.
    #[serde(default)]
    pub unsafe_tests: bool,
    /// Gate for experimental scenarios.
    #[serde(default)]
    pub experimental_tests: bool,
    /// Gate for long-running loop scenarios.
    #[serde(default)]
    pub loop_tests: bool,

    /// Whether fencing is configured on the target cluster.
    #[serde(default = "default_true")]
    pub fencing_enabled: bool,
    /// Whether a fenced node reboots and rejoins on its own.
    #[serde(default)]
    pub at_boot: bool,

    /// Bounded-retry count for partition/convergence settle loops.
    #[serde(default = "default_settle_retries")]
    pub settle_retries: u32,
    /// Sleep between settle retries, in seconds.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// RNG seed for reproducible scenario and partition selection.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_dead_time() -> u64 {
    300
}

fn default_stable_time() -> u64 {
    30
}

fn default_start_time() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_settle_retries() -> u32 {
    30
}

fn default_settle_delay() -> u64 {
    10
}

impl Default for TestEnv {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            dead_time_secs: default_dead_time(),
            stable_time_secs: default_stable_time(),
            start_time_secs: default_start_time(),
            unsafe_tests: false,
            experimental_tests: false,
            loop_tests: false,
            fencing_enabled: default_true(),
            at_boot: false,
            settle_retries: default_settle_retries(),
            settle_delay_secs: default_settle_delay(),
            seed: None,
        }
    }
}

impl TestEnv {
    /// Load the environment from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, EnvError> {
        let content = std::fs::read_to_string(path).map_err(|e| EnvError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| EnvError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Environment loading errors.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    /// Failed to read the environment file.
    #[error("failed to read env file {path}: {source}")]
    Read {
        /// Path to the environment file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the environment file.
    #[error("failed to parse env file {path}: {source}")]
    Parse {
        /// Path to the environment file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_env_is_valid() {
        let env = TestEnv::default();
        assert!(env.nodes.is_empty());
        assert_eq!(env.dead_time_secs, 300);
        assert!(env.fencing_enabled);
        assert!(!env.unsafe_tests);
    }

    #[test]
    fn env_from_toml_string() {
        let toml = r#"
nodes = ["east", "west", "north"]
dead_time_secs = 60
unsafe_tests = true
fencing_enabled = false
seed = 42
"#;
        let env: TestEnv = toml::from_str(toml).unwrap();
        assert_eq!(env.nodes, vec!["east", "west", "north"]);
        assert_eq!(env.dead_time_secs, 60);
        assert!(env.unsafe_tests);
        assert!(!env.fencing_enabled);
        assert_eq!(env.seed, Some(42));
    }

    #[test]
    fn env_missing_fields_use_defaults() {
        let env: TestEnv = toml::from_str(r#"nodes = ["east"]"#).unwrap();
        assert_eq!(env.stable_time_secs, 30);
        assert_eq!(env.settle_retries, 30);
        assert_eq!(env.seed, None);
    }
}
