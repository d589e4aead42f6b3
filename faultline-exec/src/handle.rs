//! Handle for an in-flight asynchronous remote command.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::exec::CommandResult;

/// The completion record of an asynchronous command.
#[derive(Debug)]
pub struct CompletedCommand {
    /// OS process id of the worker's child, if it was still known at spawn.
    pub pid: Option<u32>,
    /// Captured exit code and output.
    pub result: CommandResult,
}

/// An in-flight remote command.
///
/// The executor owns the worker task that waits on the child process;
/// completion is delivered at most once through the embedded channel.
/// Dropping the handle does not leak the process — the worker still
/// drains its output and reaps it.
#[derive(Debug)]
pub struct AsyncCommandHandle {
    pid: Option<u32>,
    rx: oneshot::Receiver<CompletedCommand>,
    _task: JoinHandle<()>,
}

impl AsyncCommandHandle {
    pub(crate) fn new(
        pid: Option<u32>,
        rx: oneshot::Receiver<CompletedCommand>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            pid,
            rx,
            _task: task,
        }
    }

    /// Process id of the spawned command, if known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the command to complete.
    ///
    /// Returns `None` if the worker died before delivering a result
    /// (the wait on the child itself failed).
    pub async fn wait(self) -> Option<CompletedCommand> {
        self.rx.await.ok()
    }
}
