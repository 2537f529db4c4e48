//! Executor options and report types.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use modeldock_plan::PlanStep;
use serde::{Deserialize, Serialize};

/// Asks the operator a yes/no question.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Cooperative cancellation, checked before each step.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Start,
    Done,
    Error,
    Skipped,
}

/// Called as steps start and finish: `(step, status, detail)`.
pub type StepObserver = Arc<dyn Fn(&PlanStep, StepStatus, &str) + Send + Sync>;

/// Knobs for one `execute` call.
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    /// Allow taking over a live lock, subject to `confirmer`.
    pub force: bool,
    pub abort: AbortSignal,
    pub confirmer: Option<Arc<dyn Confirmer>>,
    pub on_step: Option<StepObserver>,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_abort(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = Some(confirmer);
        self
    }

    pub fn on_step(mut self, observer: StepObserver) -> Self {
        self.on_step = Some(observer);
        self
    }

    pub(crate) fn notify(&self, step: &PlanStep, status: StepStatus, detail: &str) {
        if let Some(observer) = &self.on_step {
            observer(step, status, detail);
        }
    }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub kind: String,
    pub host_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Runs of the command; only probes run more than once.
    pub attempts: u32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

/// The step that stopped a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStep {
    pub kind: String,
    pub host_id: String,
    pub message: String,
}

/// Result of `execute`. Failures are reported here, never thrown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteReport {
    pub ok: bool,
    pub reused: bool,
    pub steps: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<FailedStep>,
    /// Hosts stopped after a failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub torn_down: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ExecuteReport {
    pub(crate) fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}
