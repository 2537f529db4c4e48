//! Execution target: a host narrowed to what running commands needs.

use modeldock_core::{RuntimeHost, Transport};
use serde::{Deserialize, Serialize};

/// Where a command runs. Built from a [`RuntimeHost`] by the planner.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecTarget {
    pub id: String,
    pub transport: Transport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    /// Never serialized, so plans can be printed safely.
    #[serde(skip)]
    pub password: Option<String>,
}

impl ExecTarget {
    /// A local target, mostly useful in tests.
    pub fn local(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transport: Transport::Local,
            host: None,
            port: None,
            user: None,
            key_path: None,
            password: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.transport == Transport::Local
    }

    /// Address a model served from this target is reachable at.
    pub fn address(&self) -> &str {
        match self.transport {
            Transport::Local => "127.0.0.1",
            Transport::Ssh => self.host.as_deref().unwrap_or("127.0.0.1"),
        }
    }

    /// `user@host` or `host`.
    pub fn destination(&self) -> String {
        let host = self.host.as_deref().unwrap_or("localhost");
        match &self.user {
            Some(user) if !user.is_empty() => format!("{user}@{host}"),
            _ => host.to_string(),
        }
    }
}

impl From<&RuntimeHost> for ExecTarget {
    fn from(host: &RuntimeHost) -> Self {
        let conn = &host.connection;
        Self {
            id: host.id.clone(),
            transport: host.transport,
            host: conn.host.clone(),
            port: conn.port,
            user: conn.user.clone(),
            key_path: conn.key_path.clone(),
            password: conn.password.clone(),
        }
    }
}

impl std::fmt::Debug for ExecTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecTarget")
            .field("id", &self.id)
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("key_path", &self.key_path)
            .field("password", &self.password.as_ref().map(|_| modeldock_core::REDACTED))
            .finish()
    }
}
