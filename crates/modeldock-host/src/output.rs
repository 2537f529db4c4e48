//! Transport-independent command result.

use std::process::Output;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reported when a command is killed for exceeding its timeout,
/// matching coreutils `timeout`.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the process could not be spawned at all.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Result of one command on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    #[serde(rename = "exitCode")]
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }

    pub(crate) fn from_output(output: Output) -> Self {
        Self {
            exit_code: exit_code(&output.status),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }

    pub(crate) fn timeout(after: Duration) -> Self {
        Self::new(
            TIMEOUT_EXIT_CODE,
            "",
            format!("command timed out after {}ms", after.as_millis()),
        )
    }

    pub(crate) fn spawn_failure(program: &str, err: &std::io::Error) -> Self {
        Self::new(
            SPAWN_FAILURE_EXIT_CODE,
            "",
            format!("failed to spawn {program}: {err}"),
        )
    }

    /// Most useful diagnostic text: stderr, else stdout, trimmed.
    pub fn detail(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Exit code, or `128 + signal` for signal-terminated processes.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_prefers_stderr() {
        let out = CommandOutput::new(1, "partial\n", "  boom \n");
        assert_eq!(out.detail(), "boom");
        let out = CommandOutput::new(1, "only stdout\n", "");
        assert_eq!(out.detail(), "only stdout");
    }

    #[test]
    fn test_timeout_is_distinguished() {
        let out = CommandOutput::timeout(Duration::from_secs(3));
        assert!(out.timed_out());
        assert!(!out.success());
        assert!(out.stderr.contains("3000ms"));
    }

    #[test]
    fn test_serialized_shape() {
        let out = CommandOutput::new(0, "ok", "");
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["exitCode"], 0);
        assert_eq!(json["stdout"], "ok");
    }
}
