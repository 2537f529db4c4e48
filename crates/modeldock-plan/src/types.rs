//! Plan types.

use std::time::Duration;

use modeldock_core::BackendType;
use modeldock_host::ExecTarget;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Timeout for stopping whatever a host is running.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for applying a backend layer.
pub const APPLY_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout for verifying a backend layer.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for the model launch command itself (not readiness).
pub const START_TIMEOUT: Duration = Duration::from_secs(120);
/// Health probe deadline when the model doesn't set one.
pub const DEFAULT_PROBE_TIMEOUT_SEC: u64 = 120;
/// Health probe poll interval when the model doesn't set one.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 2000;

/// Whether a plan is meant to be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlanMode {
    #[default]
    Live,
    DryRun,
}

/// A model-selection request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanRequest {
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_override: Option<String>,
    #[serde(default)]
    pub mode: PlanMode,
    #[serde(default)]
    pub force_restart: bool,
}

impl PlanRequest {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            ..Default::default()
        }
    }

    pub fn on_host(mut self, host_id: impl Into<String>) -> Self {
        self.host_override = Some(host_id.into());
        self
    }

    pub fn with_backend(mut self, backend_id: impl Into<String>) -> Self {
        self.backend_override = Some(backend_id.into());
        self
    }

    pub fn mode(mut self, mode: PlanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn force_restart(mut self, force: bool) -> Self {
        self.force_restart = force;
        self
    }
}

/// What a step does, with the data only that kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    StopModel,
    ApplyBackend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rollback: Option<String>,
    },
    VerifyBackend {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rollback: Option<String>,
    },
    StartModel,
    ProbeHealth {
        interval_ms: u64,
    },
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StopModel => "stop_model",
            Self::ApplyBackend { .. } => "apply_backend",
            Self::VerifyBackend { .. } => "verify_backend",
            Self::StartModel => "start_model",
            Self::ProbeHealth { .. } => "probe_health",
        }
    }

    /// Command to run if this step fails.
    pub fn rollback(&self) -> Option<&str> {
        match self {
            Self::ApplyBackend { rollback } | Self::VerifyBackend { rollback } => rollback.as_deref(),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One fully-rendered shell step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(flatten)]
    pub kind: StepKind,
    pub host_id: String,
    pub command: String,
    pub timeout_ms: u64,
    pub description: String,
}

impl PlanStep {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Poll interval for `probe_health` steps.
    pub fn probe_interval(&self) -> Option<Duration> {
        match self.kind {
            StepKind::ProbeHealth { interval_ms } => Some(Duration::from_millis(interval_ms)),
            _ => None,
        }
    }

    pub fn is_probe(&self) -> bool {
        matches!(self.kind, StepKind::ProbeHealth { .. })
    }
}

/// The resolved model, narrowed to what execution and tuning need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedModel {
    pub id: String,
    pub name: String,
    pub source: String,
    pub port: u16,
    pub log_file: String,
    /// Probe settings the catalog set explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_timeout_sec: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_interval_ms: Option<u64>,
}

/// The resolved backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedBackend {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: BackendType,
}

/// An executable plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanResult {
    pub mode: PlanMode,
    pub model: PlannedModel,
    pub backend: Option<PlannedBackend>,
    pub hosts: Vec<ExecTarget>,
    /// A matching healthy instance is already running; `steps` is just the probe.
    pub reuse: bool,
    pub steps: Vec<PlanStep>,
    /// Full deployment sequence to fall back to when a reuse probe fails.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback_steps: Vec<PlanStep>,
}

impl PlanResult {
    pub fn host(&self, id: &str) -> Option<&ExecTarget> {
        self.hosts.iter().find(|h| h.id == id)
    }

    pub fn host_ids(&self) -> Vec<String> {
        self.hosts.iter().map(|h| h.id.clone()).collect()
    }

    pub fn backend_id(&self) -> Option<&str> {
        self.backend.as_ref().map(|b| b.id.as_str())
    }

    /// OpenAI-compatible endpoint the model will serve on.
    pub fn endpoint(&self) -> Option<String> {
        self.hosts
            .first()
            .map(|h| format!("http://{}:{}/v1", h.address(), self.model.port))
    }
}

/// Machine-readable planning failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanErrorCode {
    ModelNotFound,
    ModelDisabled,
    HostNotFound,
    HostDisabled,
    NoEligibleHost,
    BackendNotFound,
    BackendDisabled,
    NoEligibleBackend,
    BackendHostMismatch,
    TemplateError,
}

impl PlanErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelNotFound => "model_not_found",
            Self::ModelDisabled => "model_disabled",
            Self::HostNotFound => "host_not_found",
            Self::HostDisabled => "host_disabled",
            Self::NoEligibleHost => "no_eligible_host",
            Self::BackendNotFound => "backend_not_found",
            Self::BackendDisabled => "backend_disabled",
            Self::NoEligibleBackend => "no_eligible_backend",
            Self::BackendHostMismatch => "backend_host_mismatch",
            Self::TemplateError => "template_error",
        }
    }
}

/// Planning failure, returned as a value.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason}")]
pub struct PlanError {
    pub code: PlanErrorCode,
    pub reason: String,
}

impl PlanError {
    pub fn new(code: PlanErrorCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_wire_shape() {
        let step = PlanStep {
            kind: StepKind::ProbeHealth { interval_ms: 1500 },
            host_id: "gpu-box".into(),
            command: "curl -sf localhost:8080/health".into(),
            timeout_ms: 60_000,
            description: "Probe qwen-7b".into(),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["kind"], "probe_health");
        assert_eq!(json["interval_ms"], 1500);
        assert_eq!(step.probe_interval(), Some(Duration::from_millis(1500)));

        let back: PlanStep = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_rollback_only_on_backend_steps() {
        let apply = StepKind::ApplyBackend {
            rollback: Some("undo".into()),
        };
        assert_eq!(apply.rollback(), Some("undo"));
        assert_eq!(StepKind::StartModel.rollback(), None);
        assert_eq!(apply.to_string(), "apply_backend");
    }

    #[test]
    fn test_plan_error_code_wire_name() {
        let err = PlanError::new(PlanErrorCode::NoEligibleHost, "no host");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "no_eligible_host");
        assert_eq!(err.code.as_str(), "no_eligible_host");
        assert_eq!(err.to_string(), "no host");
    }
}
