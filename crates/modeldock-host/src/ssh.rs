//! Non-interactive SSH invocation building.

use crate::target::ExecTarget;

/// Environment variable `sshpass -e` reads the password from.
const SSHPASS_ENV: &str = "SSHPASS";

/// Seconds ssh waits for the TCP connection before giving up.
pub const CONNECT_TIMEOUT_SEC: u32 = 10;

/// A fully-built ssh process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshInvocation {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment for the child (never logged).
    pub env: Vec<(String, String)>,
}

/// Build the invocation that runs `command` on `target`.
///
/// Key-based hosts run in batch mode so ssh never prompts. Hosts with a
/// password go through `sshpass -e`; the password travels in the child's
/// environment, not on the command line.
pub fn invocation(target: &ExecTarget, command: &str) -> SshInvocation {
    let mut args = Vec::new();
    let mut env = Vec::new();
    let program;

    match &target.password {
        Some(password) => {
            program = "sshpass".to_string();
            args.push("-e".to_string());
            args.push("ssh".to_string());
            env.push((SSHPASS_ENV.to_string(), password.clone()));
        }
        None => {
            program = "ssh".to_string();
        }
    }

    let batch_mode = if target.password.is_some() { "no" } else { "yes" };
    for opt in [
        format!("BatchMode={batch_mode}"),
        "StrictHostKeyChecking=no".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "LogLevel=ERROR".to_string(),
        format!("ConnectTimeout={CONNECT_TIMEOUT_SEC}"),
    ] {
        args.push("-o".to_string());
        args.push(opt);
    }

    if let Some(port) = target.port {
        args.push("-p".to_string());
        args.push(port.to_string());
    }
    if let Some(key) = target.key_path.as_deref().filter(|k| !k.is_empty()) {
        args.push("-i".to_string());
        args.push(expand_home(key));
    }

    args.push(target.destination());
    args.push("--".to_string());
    args.push(command.to_string());

    SshInvocation { program, args, env }
}

/// Expand a leading `~/` against the local home directory.
fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) if !home.is_empty() => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modeldock_core::Transport;

    fn ssh_target() -> ExecTarget {
        ExecTarget {
            id: "gpu-box".into(),
            transport: Transport::Ssh,
            host: Some("10.0.0.7".into()),
            port: Some(2222),
            user: Some("ops".into()),
            key_path: Some("/keys/id_ed25519".into()),
            password: None,
        }
    }

    #[test]
    fn test_key_based_invocation() {
        let inv = invocation(&ssh_target(), "nvidia-smi -L");
        assert_eq!(inv.program, "ssh");
        assert!(inv.env.is_empty());
        assert!(inv.args.contains(&"BatchMode=yes".to_string()));
        assert!(inv.args.contains(&"StrictHostKeyChecking=no".to_string()));

        let p = inv.args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(inv.args[p + 1], "2222");
        let i = inv.args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(inv.args[i + 1], "/keys/id_ed25519");

        let n = inv.args.len();
        assert_eq!(&inv.args[n - 3..], &["ops@10.0.0.7", "--", "nvidia-smi -L"]);
    }

    #[test]
    fn test_password_uses_sshpass_env() {
        let target = ExecTarget {
            password: Some("hunter2".into()),
            key_path: None,
            port: None,
            ..ssh_target()
        };
        let inv = invocation(&target, "true");
        assert_eq!(inv.program, "sshpass");
        assert_eq!(&inv.args[..2], &["-e", "ssh"]);
        assert!(inv.args.contains(&"BatchMode=no".to_string()));
        assert!(!inv.args.iter().any(|a| a.contains("hunter2")));
        assert_eq!(inv.env, vec![("SSHPASS".to_string(), "hunter2".to_string())]);
        assert!(!inv.args.contains(&"-p".to_string()));
        assert!(!inv.args.contains(&"-i".to_string()));
    }
}
