//! Persisted orchestration records: the active runtime and the run lock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What is currently deployed. Absent file = nothing running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRuntime {
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<String>,
    pub host_ids: Vec<String>,
    pub healthy: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ActiveRuntime {
    /// Whether this runtime serves `model_id` with exactly this backend and host set.
    pub fn matches(&self, model_id: &str, backend_id: Option<&str>, host_ids: &[String]) -> bool {
        let mut ours = self.host_ids.clone();
        let mut theirs = host_ids.to_vec();
        ours.sort();
        ours.dedup();
        theirs.sort();
        theirs.dedup();
        self.model_id == model_id && self.backend_id.as_deref() == backend_id && ours == theirs
    }
}

/// Contents of the lock file. Existence = orchestration in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeLock {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub model: String,
}
