//! Runtime catalog types: hosts, backends, models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The only schema version this build understands.
pub const SCHEMA_VERSION: u32 = 1;

/// Port a model listens on when its runtime defaults don't name one.
pub const DEFAULT_MODEL_PORT: u16 = 8080;

fn default_true() -> bool {
    true
}

/// How commands reach a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Local,
    Ssh,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Ssh => write!(f, "ssh"),
        }
    }
}

/// Connection details for a host. Nothing here is required for `local`.
///
/// Keys not listed below are captured in `extra` so validation can tell
/// `*_ref` secret references (warned) apart from typos (rejected).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Hardware and software tags advertised by a host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Capabilities {
    #[serde(default)]
    pub gpus: Vec<String>,
    #[serde(default)]
    pub backends: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vram_gb: Option<f64>,
}

/// A machine capable of running an inference process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeHost {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub transport: Transport,
    #[serde(default)]
    pub connection: Connection,
    #[serde(default)]
    pub capabilities: Capabilities,
    /// Command template that reports host health.
    #[serde(default)]
    pub health_command: String,
    /// Command template that stops whatever model the host is running.
    #[serde(default)]
    pub stop_command: String,
}

impl RuntimeHost {
    /// Address a model served from this host is reachable at.
    pub fn address(&self) -> String {
        match self.transport {
            Transport::Local => "127.0.0.1".to_string(),
            Transport::Ssh => self
                .connection
                .host
                .clone()
                .unwrap_or_else(|| "127.0.0.1".to_string()),
        }
    }
}

/// GPU/compute layer family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Vulkan,
    Rocm,
    Cuda,
    Metal,
    Cpu,
    Custom,
}

/// `"any"` or an explicit, ordered list of ids.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "PolicyRepr", into = "PolicyRepr")]
pub enum Policy {
    #[default]
    Any,
    Only(Vec<String>),
}

impl Policy {
    /// Whether this policy admits `id`.
    pub fn admits(&self, id: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(ids) => ids.iter().any(|i| i == id),
        }
    }

    /// Ids explicitly referenced by this policy.
    pub fn ids(&self) -> &[String] {
        match self {
            Self::Any => &[],
            Self::Only(ids) => ids,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PolicyRepr {
    Keyword(String),
    List(Vec<String>),
}

impl TryFrom<PolicyRepr> for Policy {
    type Error = String;

    fn try_from(repr: PolicyRepr) -> Result<Self, Self::Error> {
        match repr {
            PolicyRepr::Keyword(k) if k == "any" => Ok(Policy::Any),
            PolicyRepr::Keyword(k) => Err(format!("expected \"any\" or a list of ids, got \"{k}\"")),
            PolicyRepr::List(ids) => Ok(Policy::Only(ids)),
        }
    }
}

impl From<Policy> for PolicyRepr {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Any => PolicyRepr::Keyword("any".into()),
            Policy::Only(ids) => PolicyRepr::List(ids),
        }
    }
}

/// A GPU/compute layer applied before a model starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeBackend {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: BackendType,
    /// Hosts this backend may be applied on.
    #[serde(default)]
    pub hosts: Policy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_command: Option<String>,
    /// Environment passed to model launch commands via `{backend_env}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Extra CLI args passed to model launch commands via `{backend_args}`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// How a model is started and probed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchSpec {
    pub start_command: String,
    pub probe_command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_timeout_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_interval_ms: Option<u64>,
    /// Log written by the started model; tailed when the health probe fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

/// Defaults the model server is launched with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A runnable inference artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuntimeModel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path or URL of the model artifact.
    pub source: String,
    #[serde(default)]
    pub host_policy: Policy,
    #[serde(default)]
    pub backend_policy: Policy,
    pub launch: LaunchSpec,
    #[serde(default)]
    pub defaults: RuntimeDefaults,
}

impl RuntimeModel {
    pub fn port(&self) -> u16 {
        self.defaults.port.unwrap_or(DEFAULT_MODEL_PORT)
    }

    /// Log file tailed on probe failure.
    pub fn log_file(&self) -> String {
        self.launch
            .log_file
            .clone()
            .unwrap_or_else(|| format!("/tmp/modeldock-{}.log", self.id))
    }
}

/// The whole declarative catalog persisted to `runtimes.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimesConfig {
    pub schema_version: u32,
    #[serde(default)]
    pub hosts: Vec<RuntimeHost>,
    #[serde(default)]
    pub backends: Vec<RuntimeBackend>,
    #[serde(default)]
    pub models: Vec<RuntimeModel>,
    /// Unknown top-level keys, kept for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for RuntimesConfig {
    fn default() -> Self {
        Self::skeleton()
    }
}

impl RuntimesConfig {
    /// Empty catalog written on first use.
    pub fn skeleton() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            hosts: Vec::new(),
            backends: Vec::new(),
            models: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn host(&self, id: &str) -> Option<&RuntimeHost> {
        self.hosts.iter().find(|h| h.id == id)
    }

    pub fn backend(&self, id: &str) -> Option<&RuntimeBackend> {
        self.backends.iter().find(|b| b.id == id)
    }

    pub fn model(&self, id: &str) -> Option<&RuntimeModel> {
        self.models.iter().find(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_accepts_any_and_list() {
        let any: Policy = serde_json::from_str("\"any\"").unwrap();
        assert_eq!(any, Policy::Any);
        let list: Policy = serde_json::from_str("[\"a\", \"b\"]").unwrap();
        assert_eq!(list, Policy::Only(vec!["a".into(), "b".into()]));
        assert!(serde_json::from_str::<Policy>("\"all\"").is_err());
        assert!(serde_json::from_str::<Policy>("3").is_err());
    }

    #[test]
    fn test_policy_serializes_back() {
        assert_eq!(serde_json::to_string(&Policy::Any).unwrap(), "\"any\"");
        let only = Policy::Only(vec!["gpu-box".into()]);
        assert_eq!(serde_json::to_string(&only).unwrap(), "[\"gpu-box\"]");
    }

    #[test]
    fn test_host_rejects_unknown_key() {
        let json = r#"{"id": "a", "transport": "local", "colour": "red"}"#;
        assert!(serde_json::from_str::<RuntimeHost>(json).is_err());
    }

    #[test]
    fn test_connection_captures_extra_keys() {
        let json = r#"{"host": "10.0.0.2", "password_ref": "vault:x"}"#;
        let conn: Connection = serde_json::from_str(json).unwrap();
        assert_eq!(conn.host.as_deref(), Some("10.0.0.2"));
        assert!(conn.extra.contains_key("password_ref"));
    }

    #[test]
    fn test_model_port_default() {
        let json = r#"{
            "id": "m", "source": "/models/m.gguf",
            "launch": {"start_command": "run", "probe_command": "probe"}
        }"#;
        let model: RuntimeModel = serde_json::from_str(json).unwrap();
        assert!(model.enabled);
        assert_eq!(model.port(), DEFAULT_MODEL_PORT);
        assert_eq!(model.host_policy, Policy::Any);
        assert_eq!(model.log_file(), "/tmp/modeldock-m.log");
    }

    #[test]
    fn test_ssh_host_address() {
        let host = RuntimeHost {
            id: "box".into(),
            name: String::new(),
            enabled: true,
            transport: Transport::Ssh,
            connection: Connection {
                host: Some("192.168.1.40".into()),
                ..Default::default()
            },
            capabilities: Capabilities::default(),
            health_command: String::new(),
            stop_command: String::new(),
        };
        assert_eq!(host.address(), "192.168.1.40");
    }
}
