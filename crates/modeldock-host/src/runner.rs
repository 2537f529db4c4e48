//! Host command runner trait and the shell-backed implementation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use modeldock_core::shell_quote;
use tracing::{debug, warn};

use crate::output::CommandOutput;
use crate::ssh;
use crate::target::ExecTarget;

/// Runs commands on hosts.
#[async_trait]
pub trait HostRunner: Send + Sync {
    /// Run `command` on `target`, killing it once `timeout` elapses.
    ///
    /// Never fails: spawn errors and timeouts are reported through the
    /// exit code of the returned [`CommandOutput`].
    async fn run(&self, target: &ExecTarget, command: &str, timeout: Duration) -> CommandOutput;

    /// Run `command` with elevated rights (non-interactive `sudo`).
    async fn run_privileged(
        &self,
        target: &ExecTarget,
        command: &str,
        timeout: Duration,
    ) -> CommandOutput {
        self.run(target, &privileged(command), timeout).await
    }
}

/// Wrap a command so it runs under `sudo -n`.
pub fn privileged(command: &str) -> String {
    format!("sudo -n sh -c {}", shell_quote(command))
}

/// Production runner: `sh -c` locally, `ssh` for remote hosts.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostRunner for ShellRunner {
    async fn run(&self, target: &ExecTarget, command: &str, timeout: Duration) -> CommandOutput {
        let (program, cmd) = if target.is_local() {
            debug!("[{}] sh -c {}", target.id, command);
            let mut cmd = std::process::Command::new("sh");
            cmd.arg("-c").arg(command);
            ("sh".to_string(), cmd)
        } else {
            let inv = ssh::invocation(target, command);
            debug!("[{}] ssh {} -- {}", target.id, target.destination(), command);
            let mut cmd = std::process::Command::new(&inv.program);
            cmd.args(&inv.args);
            for (key, value) in &inv.env {
                cmd.env(key, value);
            }
            (inv.program, cmd)
        };
        spawn_with_timeout(&program, cmd, timeout).await
    }
}

/// Spawn `cmd`, capture its output and enforce `timeout`.
///
/// The child leads its own process group; on timeout the whole group gets
/// SIGTERM, and the child is SIGKILLed when its handle is dropped.
async fn spawn_with_timeout(
    program: &str,
    mut cmd: std::process::Command,
    timeout: Duration,
) -> CommandOutput {
    cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut cmd = tokio::process::Command::from(cmd);
    cmd.kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn {}: {}", program, e);
            return CommandOutput::spawn_failure(program, &e);
        }
    };
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => CommandOutput::from_output(output),
        Ok(Err(e)) => CommandOutput::new(1, "", format!("failed to wait for {program}: {e}")),
        Err(_) => {
            if let Some(pid) = pid {
                terminate_group(pid);
            }
            warn!("{} timed out after {}ms", program, timeout.as_millis());
            CommandOutput::timeout(timeout)
        }
    }
}

/// Send SIGTERM to a process group.
fn terminate_group(pgid: u32) {
    #[cfg(unix)]
    unsafe {
        libc::killpg(pgid as libc::pid_t, libc::SIGTERM);
    }
    #[cfg(not(unix))]
    let _ = pgid;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
    use std::time::Instant;

    #[test]
    fn test_privileged_wraps_in_sudo() {
        assert_eq!(privileged("modprobe amdgpu"), "sudo -n sh -c 'modprobe amdgpu'");
    }

    struct Echo;

    #[async_trait]
    impl HostRunner for Echo {
        async fn run(&self, _target: &ExecTarget, command: &str, _timeout: Duration) -> CommandOutput {
            CommandOutput::new(0, command, "")
        }
    }

    #[tokio::test]
    async fn test_run_privileged_defaults_to_sudo() {
        let out = Echo
            .run_privileged(&ExecTarget::local("l"), "echo 'hi'", Duration::from_secs(1))
            .await;
        assert_eq!(out.stdout, r"sudo -n sh -c 'echo '\''hi'\'''");
    }

    #[tokio::test]
    async fn test_local_captures_output() {
        let runner = ShellRunner::new();
        let out = runner
            .run(&ExecTarget::local("local"), "echo hello; echo oops >&2", Duration::from_secs(5))
            .await;
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_local_reports_exit_code() {
        let runner = ShellRunner::new();
        let out = runner
            .run(&ExecTarget::local("local"), "exit 3", Duration::from_secs(5))
            .await;
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn test_local_timeout_reports_124() {
        let runner = ShellRunner::new();
        let started = Instant::now();
        let out = runner
            .run(&ExecTarget::local("local"), "sleep 5", Duration::from_millis(200))
            .await;
        assert_eq!(out.exit_code, TIMEOUT_EXIT_CODE);
        assert!(out.timed_out());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_127() {
        let out = spawn_with_timeout(
            "definitely-not-a-binary",
            std::process::Command::new("definitely-not-a-binary-modeldock"),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(out.exit_code, SPAWN_FAILURE_EXIT_CODE);
        assert!(out.stderr.contains("failed to spawn"));
    }
}
