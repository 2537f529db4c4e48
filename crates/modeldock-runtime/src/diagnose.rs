//! Failure message enrichment.

use modeldock_core::shell_quote;
use modeldock_host::{CommandOutput, ExecTarget};
use once_cell::sync::Lazy;
use regex::Regex;

/// Lines of the model log attached to a failed health probe.
pub const LOG_TAIL_LINES: usize = 40;

/// `sh: 1: llama-server: not found`, `bash: llama-server: command not found`
static NOT_FOUND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|\s)([A-Za-z0-9_./+-]+): (?:command )?not found\s*$").unwrap()
});

/// `<kind> failed on <host> (exit N): <detail>`
pub fn failure_message(kind: &str, host_id: &str, output: &CommandOutput) -> String {
    let detail = output.detail();
    if detail.is_empty() {
        format!("{kind} failed on {host_id} (exit {})", output.exit_code)
    } else {
        format!("{kind} failed on {host_id} (exit {}): {detail}", output.exit_code)
    }
}

/// Command that prints the tail of a model log on the target host.
pub fn log_tail_command(log_file: &str) -> String {
    format!("tail -n {LOG_TAIL_LINES} {} 2>/dev/null", shell_quote(log_file))
}

/// Explain a "command not found" from a non-interactive SSH session.
///
/// Remote commands run without the login shell's profile, so binaries in
/// `~/.local/bin` and similar are not on `PATH`.
pub fn missing_command_hint(target: &ExecTarget, output: &CommandOutput) -> Option<String> {
    if target.is_local() {
        return None;
    }
    let text = format!("{}\n{}", output.stderr, output.stdout);
    let caps = NOT_FOUND_RE.captures(&text)?;
    let program = caps.get(1)?.as_str();
    Some(format!(
        "`{program}` was not found on {host}. Non-interactive SSH sessions do not load \
         your shell profile, so PATH is minimal there. Use an absolute path in the \
         command template or export PATH at its start.",
        host = target.id,
    ))
}
