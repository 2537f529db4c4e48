//! Catalog validation.
//!
//! Structural problems (wrong types, unknown keys inside a host, backend or
//! model) are caught by serde while parsing. [`validate`] then checks ids,
//! references and command templates. Both paths reject; only unknown
//! top-level keys and `*_ref` connection fields are downgraded to warnings.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::template;
use crate::types::*;

/// Longest id accepted for hosts, backends and models.
pub const MAX_ID_LEN: usize = 64;

/// Upper bound for `launch.probe_timeout_sec` (24 hours).
pub const MAX_PROBE_TIMEOUT_SEC: u64 = 24 * 60 * 60;

/// Upper bound for `launch.probe_interval_ms` (24 hours).
pub const MAX_PROBE_INTERVAL_MS: u64 = MAX_PROBE_TIMEOUT_SEC * 1000;

static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap());
static ENV_KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Parse and validate a catalog document. Returns the config and its warnings.
pub fn parse_config(text: &str) -> Result<(RuntimesConfig, Vec<String>)> {
    let config: RuntimesConfig =
        serde_json::from_str(text).map_err(|e| Error::Validation(vec![e.to_string()]))?;
    let warnings = validate(&config)?;
    Ok((config, warnings))
}

/// Validate a catalog. Pure: no I/O.
///
/// Returns the list of warnings on success, or every error found.
pub fn validate(config: &RuntimesConfig) -> Result<Vec<String>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if config.schema_version != SCHEMA_VERSION {
        errors.push(format!(
            "schema_version must be {}, got {}",
            SCHEMA_VERSION, config.schema_version
        ));
    }

    for key in config.extra.keys() {
        warnings.push(format!("unknown top-level key \"{key}\" ignored"));
    }

    check_ids("host", config.hosts.iter().map(|h| h.id.as_str()), &mut errors);
    check_ids("backend", config.backends.iter().map(|b| b.id.as_str()), &mut errors);
    check_ids("model", config.models.iter().map(|m| m.id.as_str()), &mut errors);

    let host_ids: HashSet<&str> = config.hosts.iter().map(|h| h.id.as_str()).collect();
    let backend_ids: HashSet<&str> = config.backends.iter().map(|b| b.id.as_str()).collect();

    for host in &config.hosts {
        let ctx = format!("host \"{}\"", host.id);
        if host.transport == Transport::Ssh
            && host.connection.host.as_deref().map_or(true, str::is_empty)
        {
            errors.push(format!("{ctx}: ssh transport requires connection.host"));
        }
        for key in host.connection.extra.keys() {
            if key.ends_with("_ref") {
                warnings.push(format!(
                    "{ctx}: connection.{key} secret references are not yet supported; field ignored"
                ));
            } else {
                errors.push(format!("{ctx}: unknown connection key \"{key}\""));
            }
        }
        check_template(&ctx, "health_command", &host.health_command, &mut errors);
        check_template(&ctx, "stop_command", &host.stop_command, &mut errors);
    }

    for backend in &config.backends {
        let ctx = format!("backend \"{}\"", backend.id);
        check_refs(&ctx, "hosts", &backend.hosts, &host_ids, &mut errors);
        for (field, value) in [
            ("apply_command", &backend.apply_command),
            ("verify_command", &backend.verify_command),
            ("rollback_command", &backend.rollback_command),
        ] {
            if let Some(t) = value {
                check_template(&ctx, field, t, &mut errors);
            }
        }
        for key in backend.env.keys() {
            if !ENV_KEY_RE.is_match(key) {
                errors.push(format!("{ctx}: invalid env var name \"{key}\""));
            }
        }
    }

    for model in &config.models {
        let ctx = format!("model \"{}\"", model.id);
        check_refs(&ctx, "host_policy", &model.host_policy, &host_ids, &mut errors);
        check_refs(&ctx, "backend_policy", &model.backend_policy, &backend_ids, &mut errors);
        if model.launch.start_command.trim().is_empty() {
            errors.push(format!("{ctx}: launch.start_command must not be empty"));
        }
        if model.launch.probe_command.trim().is_empty() {
            errors.push(format!("{ctx}: launch.probe_command must not be empty"));
        }
        check_template(&ctx, "launch.start_command", &model.launch.start_command, &mut errors);
        check_template(&ctx, "launch.probe_command", &model.launch.probe_command, &mut errors);
        match model.launch.probe_timeout_sec {
            Some(0) => errors.push(format!("{ctx}: launch.probe_timeout_sec must be positive")),
            Some(sec) if sec > MAX_PROBE_TIMEOUT_SEC => errors.push(format!(
                "{ctx}: launch.probe_timeout_sec must be at most {MAX_PROBE_TIMEOUT_SEC}"
            )),
            _ => {}
        }
        match model.launch.probe_interval_ms {
            Some(0) => errors.push(format!("{ctx}: launch.probe_interval_ms must be positive")),
            Some(ms) if ms > MAX_PROBE_INTERVAL_MS => errors.push(format!(
                "{ctx}: launch.probe_interval_ms must be at most {MAX_PROBE_INTERVAL_MS}"
            )),
            _ => {}
        }
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(Error::Validation(errors))
    }
}

fn check_ids<'a>(kind: &str, ids: impl Iterator<Item = &'a str>, errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for id in ids {
        if id.len() > MAX_ID_LEN || !ID_RE.is_match(id) {
            errors.push(format!(
                "{kind} id \"{id}\" must match [a-z0-9][a-z0-9-]* and be at most {MAX_ID_LEN} chars"
            ));
        }
        if !seen.insert(id) {
            errors.push(format!("duplicate {kind} id \"{id}\""));
        }
    }
}

fn check_refs(
    ctx: &str,
    field: &str,
    policy: &Policy,
    known: &HashSet<&str>,
    errors: &mut Vec<String>,
) {
    for id in policy.ids() {
        if !known.contains(id.as_str()) {
            errors.push(format!("{ctx}: {field} references unknown id \"{id}\""));
        }
    }
}

fn check_template(ctx: &str, field: &str, template: &str, errors: &mut Vec<String>) {
    for var in template::unknown_vars(template) {
        errors.push(format!("{ctx}: {field} uses unknown template variable {{{var}}}"));
    }
}
