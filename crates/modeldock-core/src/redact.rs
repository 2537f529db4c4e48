//! Secret redaction for display.

use crate::types::RuntimesConfig;

/// Placeholder shown instead of a credential.
pub const REDACTED: &str = "********";

/// Deep-clone `config` with `connection.password` and `connection.key_path`
/// replaced by [`REDACTED`].
///
/// For display only; never persist the result.
pub fn redact(config: &RuntimesConfig) -> RuntimesConfig {
    let mut out = config.clone();
    for host in &mut out.hosts {
        if host.connection.password.is_some() {
            host.connection.password = Some(REDACTED.to_string());
        }
        if host.connection.key_path.is_some() {
            host.connection.key_path = Some(REDACTED.to_string());
        }
    }
    out
}
