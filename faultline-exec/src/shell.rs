//! Remote-shell and remote-copy command prefixes.

/// The command prefixes used to reach other hosts.
///
/// The defaults wrap commands in ssh/scp; both are overridable so a
/// deployment can substitute its own transport (a container exec
/// wrapper, a test loopback, ...).
#[derive(Debug, Clone)]
pub struct RemoteShell {
    /// Remote-shell prefix; the target host and the quoted command are
    /// appended to it.
    pub command: String,
    /// Remote-copy prefix; quoted source and destination are appended.
    pub copy_command: String,
}

impl Default for RemoteShell {
    fn default() -> Self {
        Self {
            // -n: no stdin, -x: no X11,
            // ServerAliveInterval/CountMax: disconnect after 3*5s of silence
            command: "ssh -l root -n -x -o ServerAliveInterval=5 -o ConnectTimeout=10 \
                      -o TCPKeepAlive=yes -o ServerAliveCountMax=3"
                .into(),
            // -B: batch mode, -q: no stats
            copy_command: "scp -B -q".into(),
        }
    }
}

impl RemoteShell {
    /// Build a shell with explicit remote-shell and copy prefixes.
    pub fn new(command: impl Into<String>, copy_command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            copy_command: copy_command.into(),
        }
    }

    /// A loopback shell for tests: discards the host argument and
    /// evaluates the command locally.
    ///
    /// The wrapped form is `sh -c 'eval "$2"' -- <host> '<command>'`,
    /// so `$2` is the original command regardless of the host name.
    pub fn loopback() -> Self {
        Self {
            command: r#"sh -c 'eval "$2"' --"#.into(),
            copy_command: "cp".into(),
        }
    }
}

/// Escape embedded single quotes so the remote shell receives the
/// command verbatim inside a single-quoted argument.
pub(crate) fn escape_single_quotes(cmd: &str) -> String {
    cmd.replace('\'', r"'\''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_plain_command_unchanged() {
        assert_eq!(escape_single_quotes("echo hello"), "echo hello");
    }

    #[test]
    fn escape_embedded_quote() {
        assert_eq!(escape_single_quotes("echo 'hi'"), r"echo '\''hi'\''");
    }

    #[test]
    fn default_shell_uses_ssh_and_scp() {
        let shell = RemoteShell::default();
        assert!(shell.command.starts_with("ssh "));
        assert!(shell.copy_command.starts_with("scp "));
    }
}
