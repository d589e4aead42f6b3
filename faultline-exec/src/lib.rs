//! # faultline-exec
//!
//! Remote command execution for the faultline harness.
//!
//! Commands are dispatched to cluster nodes through a configurable
//! remote-shell wrapper (ssh by default), either blocking or as a
//! fire-and-forget worker whose completion is delivered exactly once.
//! A non-zero exit code is data, not an error: only a command that
//! cannot be launched at all fails at this layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod exec;
pub mod handle;
pub mod shell;

pub use exec::{CommandResult, ExecError, RemoteExec};
pub use handle::{AsyncCommandHandle, CompletedCommand};
pub use shell::RemoteShell;
