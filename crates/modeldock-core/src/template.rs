//! Command template interpolation.
//!
//! Templates reference `{var}` tokens. Only names in [`TEMPLATE_VARS`] are
//! accepted, both when validating the catalog and when rendering a command,
//! and every substituted value is shell-quoted. Shell parameter expansions
//! like `${HOME}` are left untouched.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

/// Every variable a command template may reference.
pub const TEMPLATE_VARS: &[&str] = &[
    "source",
    "port",
    "host",
    "backend_args",
    "backend_env",
    "model_id",
    "host_id",
    "backend_id",
];

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

static SAFE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_@%+=:,./-]+$").unwrap());

/// Quote a value for a POSIX shell. Plain words pass through unchanged.
pub fn shell_quote(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    if SAFE_RE.is_match(value) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Template tokens in order of appearance, skipping `${...}` expansions.
pub fn tokens(template: &str) -> Vec<&str> {
    TOKEN_RE
        .captures_iter(template)
        .filter(|caps| {
            let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
            !template[..start].ends_with('$')
        })
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Tokens in `template` that are not in [`TEMPLATE_VARS`].
pub fn unknown_vars(template: &str) -> Vec<String> {
    tokens(template)
        .into_iter()
        .filter(|t| !TEMPLATE_VARS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Rendered variable values, already shell-safe.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    rendered: BTreeMap<&'static str, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a single value; it is quoted as one shell word.
    pub fn value(mut self, name: &'static str, raw: impl AsRef<str>) -> Self {
        self.rendered.insert(name, shell_quote(raw.as_ref()));
        self
    }

    /// Bind a list of words; each is quoted separately and joined by spaces.
    pub fn words<I, S>(mut self, name: &'static str, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = words
            .into_iter()
            .map(|w| shell_quote(w.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");
        self.rendered.insert(name, joined);
        self
    }

    /// Bind `KEY=value` assignments; values are quoted, keys are emitted as-is.
    pub fn assignments<'a, I>(mut self, name: &'static str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let joined = pairs
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, shell_quote(v)))
            .collect::<Vec<_>>()
            .join(" ");
        self.rendered.insert(name, joined);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.rendered.get(name).map(String::as_str)
    }
}

/// Substitute every `{var}` token in `template`.
///
/// Unknown variables fail with [`Error::UnknownTemplateVar`]. Whitelisted
/// variables with no bound value render as an empty string.
pub fn interpolate(template: &str, vars: &TemplateVars) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in TOKEN_RE.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if template[..whole.start()].ends_with('$') {
            continue;
        }
        let name = name.as_str();
        if !TEMPLATE_VARS.contains(&name) {
            return Err(Error::UnknownTemplateVar(name.to_string()));
        }
        out.push_str(&template[last..whole.start()]);
        out.push_str(vars.get(name).unwrap_or(""));
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-word_1.gguf"), "plain-word_1.gguf");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }

    #[test]
    fn test_interpolate_all_vars() {
        let env = BTreeMap::from([("GGML_VK_DEVICE".to_string(), "0".to_string())]);
        let vars = TemplateVars::new()
            .value("source", "/models/llama 3.gguf")
            .value("port", "8080")
            .value("host", "10.0.0.5")
            .words("backend_args", ["--n-gpu-layers", "99"])
            .assignments("backend_env", &env)
            .value("model_id", "llama3")
            .value("host_id", "gpu-box")
            .value("backend_id", "vulkan");

        let template = "{backend_env} serve -m {source} --port {port} --host {host} \
                        {backend_args} # {model_id}@{host_id}/{backend_id}";
        let out = interpolate(template, &vars).unwrap();
        assert_eq!(
            out,
            "GGML_VK_DEVICE=0 serve -m '/models/llama 3.gguf' --port 8080 --host 10.0.0.5 \
             --n-gpu-layers 99 # llama3@gpu-box/vulkan"
        );
    }

    #[test]
    fn test_interpolate_unknown_var_fails() {
        let err = interpolate("echo {unknown_var}", &TemplateVars::new()).unwrap_err();
        assert!(err.to_string().contains("unknown template variable"));
        assert!(err.to_string().contains("unknown_var"));
    }

    #[test]
    fn test_interpolate_leaves_shell_expansion() {
        let vars = TemplateVars::new().value("model_id", "m");
        let out = interpolate("cd ${HOME} && run {model_id}", &vars).unwrap();
        assert_eq!(out, "cd ${HOME} && run m");
    }

    #[test]
    fn test_unbound_var_renders_empty() {
        let out = interpolate("run {backend_args}", &TemplateVars::new()).unwrap();
        assert_eq!(out, "run ");
    }

    #[test]
    fn test_value_cannot_inject() {
        let vars = TemplateVars::new().value("source", "x; rm -rf ~");
        let out = interpolate("ls {source}", &vars).unwrap();
        assert_eq!(out, "ls 'x; rm -rf ~'");
    }

    #[test]
    fn test_unknown_vars_lists_offenders() {
        assert_eq!(unknown_vars("{source} {gpu} ${PATH} {port}"), vec!["gpu".to_string()]);
    }
}
