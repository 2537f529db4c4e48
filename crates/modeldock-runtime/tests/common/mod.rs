//! Shared fixtures for executor tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use modeldock_core::{parse_config, RuntimesConfig, StatePaths};
use modeldock_host::{CommandOutput, ExecTarget, HostRunner};
use modeldock_runtime::Executor;
use parking_lot::Mutex;

/// One recorded `run` call.
#[derive(Debug, Clone)]
pub struct Call {
    pub host_id: String,
    pub command: String,
    pub timeout: Duration,
}

struct Rule {
    pattern: String,
    outputs: VecDeque<CommandOutput>,
}

/// Runner that answers commands by substring and records every call.
///
/// A rule's outputs are consumed in order; the last one repeats. Commands
/// with no matching rule succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, pattern: &str, output: CommandOutput) {
        self.sequence(pattern, vec![output]);
    }

    pub fn sequence(&self, pattern: &str, outputs: Vec<CommandOutput>) {
        self.rules.lock().push(Rule {
            pattern: pattern.to_string(),
            outputs: outputs.into(),
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.command.clone()).collect()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.command.contains(pattern))
            .count()
    }
}

#[async_trait]
impl HostRunner for ScriptedRunner {
    async fn run(&self, target: &ExecTarget, command: &str, timeout: Duration) -> CommandOutput {
        self.calls.lock().push(Call {
            host_id: target.id.clone(),
            command: command.to_string(),
            timeout,
        });
        let mut rules = self.rules.lock();
        match rules.iter_mut().find(|r| command.contains(&r.pattern)) {
            Some(rule) if rule.outputs.len() > 1 => rule.outputs.pop_front().unwrap(),
            Some(rule) => rule.outputs.front().cloned().unwrap_or_else(ok),
            None => ok(),
        }
    }
}

pub fn ok() -> CommandOutput {
    CommandOutput::new(0, "", "")
}

pub fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput::new(code, "", stderr)
}

pub fn catalog() -> RuntimesConfig {
    parse_config(
        r#"{
        "schema_version": 1,
        "hosts": [
            {"id": "host-a", "transport": "local", "stop_command": "stop-model {model_id}"},
            {"id": "gpu-box", "transport": "ssh",
             "connection": {"host": "10.0.0.7", "user": "ops"},
             "stop_command": "stop-model {model_id}"}
        ],
        "backends": [
            {"id": "vulkan", "type": "vulkan", "hosts": "any",
             "apply_command": "apply-vulkan",
             "verify_command": "verify-vulkan",
             "rollback_command": "rollback-vulkan"}
        ],
        "models": [
            {"id": "qwen-7b", "source": "/models/qwen-7b-q4_k_m.gguf",
             "host_policy": ["host-a"], "backend_policy": "any",
             "launch": {"start_command": "start-model {source} --port {port}",
                        "probe_command": "probe-model {port}",
                        "probe_timeout_sec": 10, "probe_interval_ms": 1000}},
            {"id": "llama-70b", "source": "/models/llama-70b-q4_k_m.gguf",
             "host_policy": ["host-a"], "backend_policy": ["vulkan"],
             "defaults": {"port": 9000},
             "launch": {"start_command": "start-model {source} --port {port}",
                        "probe_command": "probe-model {port}",
                        "probe_timeout_sec": 10, "probe_interval_ms": 1000,
                        "log_file": "/tmp/llama.log"}}
        ]
    }"#,
    )
    .unwrap()
    .0
}

pub fn executor(runner: Arc<ScriptedRunner>, dir: &tempfile::TempDir) -> Executor {
    let paths = StatePaths::new(dir.path()).unwrap();
    Executor::new(runner, paths)
}
