//! Executor — runs a plan under the runtime lock.
//!
//! Steps run strictly in order. The first failure stops the run: the step's
//! rollback runs, every host whose model was started in this run is stopped
//! again and the active-runtime record is cleared.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use modeldock_core::{ActiveRuntime, Result, RuntimesConfig, StatePaths, MAX_PROBE_TIMEOUT_SEC};
use modeldock_host::{CommandOutput, ExecTarget, HostRunner};
use modeldock_plan::{stop_step, PlanMode, PlanResult, PlanStep, StepKind, DEFAULT_PROBE_INTERVAL_MS};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::active::ActiveRuntimeStore;
use crate::diagnose::{failure_message, log_tail_command, missing_command_hint, LOG_TAIL_LINES};
use crate::lock;
use crate::types::*;

/// Timeout for a backend rollback command.
pub const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for fetching the model log after a failed probe.
pub const LOG_TAIL_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest a probe step may poll, whatever its plan says.
const MAX_PROBE_WAIT: Duration = Duration::from_secs(MAX_PROBE_TIMEOUT_SEC);

/// Runs plans against hosts and keeps the active-runtime record current.
pub struct Executor {
    runner: Arc<dyn HostRunner>,
    paths: StatePaths,
    active: ActiveRuntimeStore,
}

impl Executor {
    pub fn new(runner: Arc<dyn HostRunner>, paths: StatePaths) -> Self {
        let active = ActiveRuntimeStore::new(&paths.active_file);
        Self {
            runner,
            paths,
            active,
        }
    }

    pub fn paths(&self) -> &StatePaths {
        &self.paths
    }

    /// The persisted active runtime, if any.
    pub fn active(&self) -> Result<Option<ActiveRuntime>> {
        self.active.load()
    }

    /// Execute `plan`. Never fails; problems are reported in the returned report.
    pub async fn execute(&self, plan: &PlanResult, opts: &ExecuteOptions) -> ExecuteReport {
        if plan.mode == PlanMode::DryRun {
            return dry_run(plan, opts);
        }

        let _lock = match lock::acquire(
            &self.paths.lock_file,
            &plan.model.id,
            opts.force,
            opts.confirmer.as_deref(),
        ) {
            Ok(guard) => guard,
            Err(e) => {
                warn!("{}", e);
                return ExecuteReport::failure(e.to_string());
            }
        };

        if plan.reuse {
            match self.reuse(plan, opts).await {
                Some(report) => return report,
                None => return self.run_steps(plan, &plan.fallback_steps, opts).await,
            }
        }

        info!(
            "Deploying {} on {} ({} steps)",
            plan.model.id,
            plan.host_ids().join(","),
            plan.steps.len()
        );
        self.run_steps(plan, &plan.steps, opts).await
    }

    /// Stop what the active-runtime record says is running, then clear it.
    pub async fn stop_active(&self, config: &RuntimesConfig, opts: &ExecuteOptions) -> ExecuteReport {
        let active = match self.active.load() {
            Ok(Some(active)) => active,
            Ok(None) => {
                info!("No active runtime to stop");
                return ExecuteReport {
                    ok: true,
                    ..Default::default()
                };
            }
            Err(e) => return ExecuteReport::failure(e.to_string()),
        };

        let _lock = match lock::acquire(
            &self.paths.lock_file,
            &active.model_id,
            opts.force,
            opts.confirmer.as_deref(),
        ) {
            Ok(guard) => guard,
            Err(e) => return ExecuteReport::failure(e.to_string()),
        };

        let mut report = ExecuteReport::default();
        let mut errors = Vec::new();

        for host_id in &active.host_ids {
            let step = match stop_step(config, &active.model_id, host_id, active.backend_id.as_deref()) {
                Ok(Some(step)) => step,
                Ok(None) => {
                    errors.push(format!("host {host_id} has no stop_command"));
                    continue;
                }
                Err(e) => {
                    errors.push(format!("cannot stop {} on {}: {}", active.model_id, host_id, e));
                    continue;
                }
            };
            let Some(host) = config.host(host_id) else {
                continue;
            };
            let target = ExecTarget::from(host);

            opts.notify(&step, StepStatus::Start, &step.description);
            let started = Instant::now();
            let output = self.runner.run(&target, &step.command, step.timeout()).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            if output.success() {
                opts.notify(&step, StepStatus::Done, output.detail());
                report.steps.push(outcome(&step, StepStatus::Done, &output, 1, duration_ms, ""));
                report.torn_down.push(host_id.clone());
            } else {
                let message = failure_message(step.kind.name(), host_id, &output);
                opts.notify(&step, StepStatus::Error, &message);
                report
                    .steps
                    .push(outcome(&step, StepStatus::Error, &output, 1, duration_ms, &message));
                errors.push(message);
            }
        }

        if errors.is_empty() {
            if let Err(e) = self.active.clear() {
                warn!("Failed to clear active runtime: {}", e);
            }
            info!("Stopped {}", active.model_id);
            report.ok = true;
        } else {
            error!("Stopping {} failed: {}", active.model_id, errors.join("; "));
            report.error = Some(errors.join("; "));
        }
        report
    }

    /// Probe an already-running instance.
    ///
    /// Returns `None` when the caller should fall back to a full deployment.
    async fn reuse(&self, plan: &PlanResult, opts: &ExecuteOptions) -> Option<ExecuteReport> {
        let probe = plan.steps.iter().find(|s| s.is_probe())?;
        let target = plan.host(&probe.host_id)?;

        if opts.abort.is_aborted() {
            return Some(ExecuteReport::failure(format!(
                "aborted before {} on {}",
                probe.kind, probe.host_id
            )));
        }

        opts.notify(probe, StepStatus::Start, &probe.description);
        let (output, attempts) = self.poll(target, probe, opts).await;

        if !output.success() && opts.abort.is_aborted() {
            let message = format!("aborted during {} on {}", probe.kind, probe.host_id);
            opts.notify(probe, StepStatus::Error, &message);
            warn!("{}", message);
            return Some(ExecuteReport {
                ok: false,
                error: Some(message.clone()),
                failed: Some(FailedStep {
                    kind: probe.kind.name().to_string(),
                    host_id: probe.host_id.clone(),
                    message,
                }),
                ..Default::default()
            });
        }

        if output.success() {
            opts.notify(probe, StepStatus::Done, output.detail());
            let previous = self.active.load().ok().flatten();
            let record = ActiveRuntime {
                model_id: plan.model.id.clone(),
                backend_id: plan.backend_id().map(str::to_string),
                host_ids: plan.host_ids(),
                healthy: true,
                started_at: previous.as_ref().map_or_else(Utc::now, |p| p.started_at),
                pid: previous.and_then(|p| p.pid).or_else(|| Some(std::process::id())),
                endpoint: plan.endpoint(),
            };
            if let Err(e) = self.active.save(&record) {
                warn!("Failed to refresh active runtime: {}", e);
            }
            info!("Reusing {} on {}", plan.model.id, probe.host_id);
            return Some(ExecuteReport {
                ok: true,
                reused: true,
                endpoint: plan.endpoint(),
                ..Default::default()
            });
        }

        let message = format!(
            "{} (after {} attempts)",
            failure_message(probe.kind.name(), &probe.host_id, &output),
            attempts
        );
        opts.notify(probe, StepStatus::Error, &message);
        warn!("Running instance of {} is unhealthy: {}", plan.model.id, message);
        if let Err(e) = self.active.clear() {
            warn!("Failed to clear active runtime: {}", e);
        }

        if plan.fallback_steps.is_empty() {
            return Some(ExecuteReport {
                ok: false,
                error: Some(message.clone()),
                failed: Some(FailedStep {
                    kind: probe.kind.name().to_string(),
                    host_id: probe.host_id.clone(),
                    message,
                }),
                ..Default::default()
            });
        }
        info!("Redeploying {} from scratch", plan.model.id);
        None
    }

    async fn run_steps(
        &self,
        plan: &PlanResult,
        steps: &[PlanStep],
        opts: &ExecuteOptions,
    ) -> ExecuteReport {
        let mut report = ExecuteReport::default();
        let mut started_hosts: Vec<String> = Vec::new();

        for step in steps {
            if opts.abort.is_aborted() {
                let message = format!("aborted before {} on {}", step.kind, step.host_id);
                return self.fail(plan, steps, &started_hosts, report, step, message).await;
            }
            let Some(target) = plan.host(&step.host_id) else {
                let message = format!("{} targets unknown host {}", step.kind, step.host_id);
                return self.fail(plan, steps, &started_hosts, report, step, message).await;
            };

            info!("[{}] {}", step.host_id, step.description);
            opts.notify(step, StepStatus::Start, &step.description);
            let started = Instant::now();
            let (output, attempts) = if step.is_probe() {
                self.poll(target, step, opts).await
            } else {
                (self.runner.run(target, &step.command, step.timeout()).await, 1)
            };
            let duration_ms = started.elapsed().as_millis() as u64;

            if output.success() {
                opts.notify(step, StepStatus::Done, output.detail());
                report
                    .steps
                    .push(outcome(step, StepStatus::Done, &output, attempts, duration_ms, ""));
                if step.kind == StepKind::StartModel && !started_hosts.contains(&step.host_id) {
                    started_hosts.push(step.host_id.clone());
                }
                continue;
            }

            let message = if step.is_probe() && opts.abort.is_aborted() {
                format!("aborted during {} on {}", step.kind, step.host_id)
            } else {
                self.explain(plan, step, target, &output, attempts).await
            };
            opts.notify(step, StepStatus::Error, &message);
            report
                .steps
                .push(outcome(step, StepStatus::Error, &output, attempts, duration_ms, &message));
            return self.fail(plan, steps, &started_hosts, report, step, message).await;
        }

        let record = ActiveRuntime {
            model_id: plan.model.id.clone(),
            backend_id: plan.backend_id().map(str::to_string),
            host_ids: plan.host_ids(),
            healthy: true,
            started_at: Utc::now(),
            pid: Some(std::process::id()),
            endpoint: plan.endpoint(),
        };
        if let Err(e) = self.active.save(&record) {
            warn!("Deployed {} but could not record it: {}", plan.model.id, e);
        }

        info!(
            "{} is healthy at {}",
            plan.model.id,
            record.endpoint.as_deref().unwrap_or("-")
        );
        report.ok = true;
        report.endpoint = record.endpoint;
        report
    }

    /// Poll a probe step until it succeeds or its deadline passes.
    ///
    /// Each attempt is capped at the time left, and no attempt starts once
    /// fewer than one interval remains. Stops early when the run is aborted.
    async fn poll(
        &self,
        target: &ExecTarget,
        step: &PlanStep,
        opts: &ExecuteOptions,
    ) -> (CommandOutput, u32) {
        let interval = step
            .probe_interval()
            .unwrap_or(Duration::from_millis(DEFAULT_PROBE_INTERVAL_MS));
        let interval = interval.min(MAX_PROBE_WAIT);
        let deadline = Instant::now() + step.timeout().min(MAX_PROBE_WAIT);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let output = self.runner.run(target, &step.command, remaining).await;
            if output.success() {
                debug!("[{}] probe succeeded after {} attempts", step.host_id, attempts);
                return (output, attempts);
            }
            if opts.abort.is_aborted() || Instant::now() + interval >= deadline {
                return (output, attempts);
            }
            debug!(
                "[{}] probe attempt {} failed (exit {}); retrying in {}ms",
                step.host_id,
                attempts,
                output.exit_code,
                interval.as_millis()
            );
            tokio::time::sleep(interval).await;
            if opts.abort.is_aborted() {
                return (output, attempts);
            }
        }
    }

    /// Build the failure message for `step`, running its rollback on the way.
    async fn explain(
        &self,
        plan: &PlanResult,
        step: &PlanStep,
        target: &ExecTarget,
        output: &CommandOutput,
        attempts: u32,
    ) -> String {
        let mut message = failure_message(step.kind.name(), &step.host_id, output);

        if let Some(hint) = missing_command_hint(target, output) {
            message.push('\n');
            message.push_str(&hint);
        }

        if step.is_probe() {
            message.push_str(&format!(" (gave up after {attempts} attempts)"));
            let log_file = &plan.model.log_file;
            let tail = self
                .runner
                .run(target, &log_tail_command(log_file), LOG_TAIL_TIMEOUT)
                .await;
            let text = tail.stdout.trim_end();
            if tail.success() && !text.is_empty() {
                message.push_str(&format!(
                    "\n--- last {LOG_TAIL_LINES} lines of {log_file} on {} ---\n{text}",
                    step.host_id
                ));
            }
        }

        if let Some(rollback) = step.kind.rollback() {
            warn!("Rolling back {} on {}", step.kind, step.host_id);
            let undo = self.runner.run(target, rollback, ROLLBACK_TIMEOUT).await;
            if undo.success() {
                message.push_str("\nrollback succeeded");
            } else {
                message.push_str(&format!(
                    "\nrollback failed (exit {}): {}",
                    undo.exit_code,
                    undo.detail()
                ));
            }
        }

        message
    }

    async fn fail(
        &self,
        plan: &PlanResult,
        steps: &[PlanStep],
        started_hosts: &[String],
        mut report: ExecuteReport,
        step: &PlanStep,
        message: String,
    ) -> ExecuteReport {
        error!("{}", message);
        report.torn_down = self.teardown(plan, steps, started_hosts).await;
        if let Err(e) = self.active.clear() {
            warn!("Failed to clear active runtime: {}", e);
        }
        report.ok = false;
        report.failed = Some(FailedStep {
            kind: step.kind.name().to_string(),
            host_id: step.host_id.clone(),
            message: message.clone(),
        });
        report.error = Some(message);
        report
    }

    /// Stop every host in `started_hosts` with its `stop_model` step.
    async fn teardown(&self, plan: &PlanResult, steps: &[PlanStep], started_hosts: &[String]) -> Vec<String> {
        let mut torn_down = Vec::new();
        for host_id in started_hosts {
            let Some(target) = plan.host(host_id) else {
                continue;
            };
            let stop = steps
                .iter()
                .chain(&plan.fallback_steps)
                .find(|s| s.kind == StepKind::StopModel && &s.host_id == host_id);
            let Some(stop) = stop else {
                warn!("{} has no stop command; {} may still be running", host_id, plan.model.id);
                continue;
            };

            info!("Tearing down {} on {}", plan.model.id, host_id);
            let output = self.runner.run(target, &stop.command, stop.timeout()).await;
            if !output.success() {
                warn!(
                    "Teardown on {} failed (exit {}): {}",
                    host_id,
                    output.exit_code,
                    output.detail()
                );
            }
            torn_down.push(host_id.clone());
        }
        torn_down
    }
}

fn dry_run(plan: &PlanResult, opts: &ExecuteOptions) -> ExecuteReport {
    let steps = plan
        .steps
        .iter()
        .map(|step| {
            opts.notify(step, StepStatus::Skipped, &step.command);
            StepOutcome {
                kind: step.kind.name().to_string(),
                host_id: step.host_id.clone(),
                status: StepStatus::Skipped,
                exit_code: None,
                attempts: 0,
                duration_ms: 0,
                detail: step.command.clone(),
            }
        })
        .collect();
    ExecuteReport {
        ok: true,
        reused: plan.reuse,
        steps,
        endpoint: plan.endpoint(),
        ..Default::default()
    }
}

fn outcome(
    step: &PlanStep,
    status: StepStatus,
    output: &CommandOutput,
    attempts: u32,
    duration_ms: u64,
    detail: &str,
) -> StepOutcome {
    StepOutcome {
        kind: step.kind.name().to_string(),
        host_id: step.host_id.clone(),
        status,
        exit_code: Some(output.exit_code),
        attempts,
        duration_ms,
        detail: detail.to_string(),
    }
}
