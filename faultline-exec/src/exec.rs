//! The executor: blocking and asynchronous command dispatch, file copy,
//! and fleet-wide existence checks.

use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::handle::{AsyncCommandHandle, CompletedCommand};
use crate::shell::{escape_single_quotes, RemoteShell};

/// Errors from the execution layer.
///
/// A non-zero exit code is not an error here; callers decide what it
/// means. This layer fails only when a command cannot be launched.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The local process could not be spawned at all.
    #[error("failed to launch command: {0}")]
    Launch(#[from] std::io::Error),
}

/// Captured outcome of one command invocation.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (0 = success; -1 if terminated by signal).
    pub exit_code: i32,
    /// Standard output, split into lines in order.
    pub stdout: Vec<String>,
    /// Standard error, split into lines in order.
    pub stderr: Vec<String>,
}

impl CommandResult {
    /// True if the command exited 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout re-joined into a single string for substring checks.
    pub fn stdout_text(&self) -> String {
        self.stdout.join("\n")
    }

    fn from_output(output: std::process::Output) -> Self {
        let lines = |bytes: &[u8]| {
            String::from_utf8_lossy(bytes)
                .lines()
                .map(str::to_string)
                .collect()
        };
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: lines(&output.stdout),
            stderr: lines(&output.stderr),
        }
    }
}

/// Runs commands on cluster nodes, locally or through the remote shell.
#[derive(Debug, Clone)]
pub struct RemoteExec {
    shell: RemoteShell,
    local_node: Option<String>,
}

impl RemoteExec {
    /// Create an executor over the given shell.
    pub fn new(shell: RemoteShell) -> Self {
        Self {
            shell,
            local_node: None,
        }
    }

    /// Name this machine so commands targeting it skip the remote shell.
    pub fn with_local_node(mut self, name: impl Into<String>) -> Self {
        self.local_node = Some(name.into().to_lowercase());
        self
    }

    /// The configured local node name, if any.
    pub fn local_node(&self) -> Option<&str> {
        self.local_node.as_deref()
    }

    /// Compute the string that will run `command` on `host`.
    ///
    /// `None`, `"localhost"`, or this machine's own name run the command
    /// unmodified; anything else goes through the remote shell with
    /// single quotes escaped so the remote end sees it verbatim.
    pub fn wrap(&self, host: Option<&str>, command: &str) -> String {
        match host {
            None => command.to_string(),
            Some(h)
                if h.eq_ignore_ascii_case("localhost")
                    || self
                        .local_node
                        .as_deref()
                        .is_some_and(|us| h.eq_ignore_ascii_case(us)) =>
            {
                command.to_string()
            }
            Some(h) => format!(
                "{} {} '{}'",
                self.shell.command,
                h,
                escape_single_quotes(command)
            ),
        }
    }

    /// Run a command and wait for it, capturing exit code and output.
    pub async fn run(&self, host: Option<&str>, command: &str) -> Result<CommandResult, ExecError> {
        let wrapped = self.wrap(host, command);
        let output = Command::new("sh").arg("-c").arg(&wrapped).output().await?;
        let result = CommandResult::from_output(output);
        debug!(
            host = host.unwrap_or("localhost"),
            rc = result.exit_code,
            "cmd: {command}"
        );
        for line in &result.stderr {
            debug!("cmd: stderr: {line}");
        }
        Ok(result)
    }

    /// Spawn a command without waiting.
    ///
    /// A dedicated worker task owns the child: it drains stdout/stderr
    /// while waiting (so a full pipe can never deadlock the child),
    /// reaps the process, and delivers one [`CompletedCommand`] through
    /// the returned handle.
    pub fn spawn(&self, host: Option<&str>, command: &str) -> Result<AsyncCommandHandle, ExecError> {
        let wrapped = self.wrap(host, command);
        let child = Command::new("sh")
            .arg("-c")
            .arg(&wrapped)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let pid = child.id();
        let peer = host.unwrap_or("localhost").to_string();
        let cmd = command.to_string();
        debug!(host = %peer, pid = ?pid, "cmd: async: {cmd}");

        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            match child.wait_with_output().await {
                Ok(output) => {
                    let result = CommandResult::from_output(output);
                    debug!(host = %peer, pid = ?pid, rc = result.exit_code, "cmd: async done");
                    for line in &result.stderr {
                        debug!(pid = ?pid, "cmd: stderr: {line}");
                    }
                    // The receiver may be gone; the process is reaped either way.
                    let _ = tx.send(CompletedCommand { pid, result });
                }
                Err(e) => {
                    warn!(host = %peer, pid = ?pid, "cmd: async wait failed: {e}");
                }
            }
        });

        Ok(AsyncCommandHandle::new(pid, rx, task))
    }

    /// Copy a file with the remote-copy command; returns its exit code.
    ///
    /// No timeout is enforced — a long copy blocks the caller.
    pub async fn copy(&self, source: &str, target: &str) -> Result<i32, ExecError> {
        let cmd = format!(
            "{} '{}' '{}'",
            self.shell.copy_command,
            escape_single_quotes(source),
            escape_single_quotes(target)
        );
        let output = Command::new("sh").arg("-c").arg(&cmd).output().await?;
        let rc = output.status.code().unwrap_or(-1);
        debug!(rc, "cmd: {cmd}");
        Ok(rc)
    }

    /// True only if `path` is readable on every listed host.
    ///
    /// Short-circuits on the first host that reports otherwise.
    pub async fn exists_on_all(&self, path: &str, hosts: &[String]) -> Result<bool, ExecError> {
        for host in hosts {
            let result = self.run(Some(host), &format!("test -r {path}")).await?;
            if !result.success() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> RemoteExec {
        RemoteExec::new(RemoteShell::default()).with_local_node("thisnode")
    }

    fn loopback() -> RemoteExec {
        RemoteExec::new(RemoteShell::loopback())
    }

    #[test]
    fn wrap_none_is_passthrough() {
        assert_eq!(local().wrap(None, "echo hi"), "echo hi");
    }

    #[test]
    fn wrap_localhost_is_passthrough() {
        assert_eq!(local().wrap(Some("localhost"), "echo hi"), "echo hi");
        assert_eq!(local().wrap(Some("LOCALHOST"), "echo hi"), "echo hi");
    }

    #[test]
    fn wrap_own_name_is_passthrough() {
        assert_eq!(local().wrap(Some("thisnode"), "echo hi"), "echo hi");
    }

    #[test]
    fn wrap_remote_host_quotes_command() {
        let wrapped = local().wrap(Some("node1"), "echo 'hi'");
        assert!(wrapped.starts_with("ssh "));
        assert!(wrapped.contains(" node1 "));
        assert!(wrapped.ends_with(r"'echo '\''hi'\'''"));
    }

    #[tokio::test]
    async fn run_captures_stdout_lines() {
        let result = loopback().run(None, "printf 'one\\ntwo\\n'").await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn run_nonzero_exit_is_data_not_error() {
        let result = loopback().run(None, "exit 3").await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn run_captures_stderr() {
        let result = loopback().run(None, "echo oops >&2").await.unwrap();
        assert_eq!(result.stderr, vec!["oops"]);
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn loopback_discards_host() {
        let result = loopback()
            .run(Some("node-that-does-not-exist"), "echo reached")
            .await
            .unwrap();
        assert_eq!(result.stdout, vec!["reached"]);
    }

    #[tokio::test]
    async fn spawn_delivers_completion_once() {
        let handle = loopback().spawn(None, "echo async-done").unwrap();
        let done = handle.wait().await.expect("worker delivered");
        assert!(done.result.success());
        assert_eq!(done.result.stdout, vec!["async-done"]);
    }

    #[tokio::test]
    async fn spawn_dropped_handle_reaps_process() {
        let exec = loopback();
        let handle = exec.spawn(None, "echo ignored").unwrap();
        drop(handle);
        // The worker still drains and reaps; nothing to observe but no hang.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn copy_returns_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dst = dir.path().join("dst.txt");
        std::fs::write(&src, "payload").unwrap();

        let rc = loopback()
            .copy(src.to_str().unwrap(), dst.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(rc, 0);
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "payload");
    }

    #[tokio::test]
    async fn exists_on_all_true_when_every_host_has_it() {
        let hosts = vec!["alpha".to_string(), "beta".to_string()];
        assert!(loopback().exists_on_all("/dev/null", &hosts).await.unwrap());
    }

    #[tokio::test]
    async fn exists_on_all_short_circuits_on_missing() {
        let hosts = vec!["alpha".to_string(), "beta".to_string()];
        assert!(!loopback()
            .exists_on_all("/definitely/not/here", &hosts)
            .await
            .unwrap());
    }
}
