//! Subcommand handlers.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use modeldock_core::{redact, ConfigStore, RuntimesConfig, StatePaths};
use modeldock_host::ShellRunner;
use modeldock_plan::{plan, tune_probe, PlanMode, PlanRequest, PlanResult, PlanStep};
use modeldock_runtime::{
    AbortSignal, Confirmer, ExecuteOptions, ExecuteReport, Executor, StepObserver, StepStatus,
};
use tracing::{info, warn};

use crate::cli::{PlanArgs, UpArgs};

/// Timeout for `status --probe`.
const STATUS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Asks on the terminal; answers "no" when stdin is not a terminal.
struct PromptConfirmer;

impl Confirmer for PromptConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        if !std::io::stdin().is_terminal() {
            return false;
        }
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

fn load_config(paths: &StatePaths) -> Result<RuntimesConfig> {
    ConfigStore::new(&paths.config_file)
        .load()
        .with_context(|| format!("loading {}", paths.config_file.display()))
}

fn executor(paths: &StatePaths) -> Executor {
    Executor::new(Arc::new(ShellRunner::new()), paths.clone())
}

pub fn validate(paths: &StatePaths) -> Result<()> {
    let store = ConfigStore::new(&paths.config_file);
    let (config, warnings) = store.load_with_warnings()?;
    for warning in &warnings {
        println!("warning: {warning}");
    }
    println!(
        "{}: {} hosts, {} backends, {} models",
        paths.config_file.display(),
        config.hosts.len(),
        config.backends.len(),
        config.models.len()
    );
    Ok(())
}

pub fn show(paths: &StatePaths) -> Result<()> {
    let config = load_config(paths)?;
    println!("{}", serde_json::to_string_pretty(&redact(&config))?);
    Ok(())
}

fn build_plan(paths: &StatePaths, args: &PlanArgs, mode: PlanMode) -> Result<PlanResult> {
    let config = load_config(paths)?;
    let active = executor(paths).active()?;

    let mut request = PlanRequest::new(&args.model)
        .mode(mode)
        .force_restart(args.force_restart);
    if let Some(host) = &args.host {
        request = request.on_host(host);
    }
    if let Some(backend) = &args.backend {
        request = request.with_backend(backend);
    }

    let mut plan = match plan(&request, &config, active.as_ref()) {
        Ok(plan) => plan,
        Err(e) => bail!("cannot plan {}: {} [{}]", args.model, e.reason, e.code.as_str()),
    };
    if !args.no_tune {
        if let Some(tuning) = tune_probe(&mut plan) {
            info!(
                "Probe tuned for ~{:.1} GiB: {}s timeout, {}ms interval",
                tuning.size_gib, tuning.timeout_sec, tuning.interval_ms
            );
        }
    }
    Ok(plan)
}

pub fn plan_cmd(paths: &StatePaths, args: &PlanArgs) -> Result<()> {
    let plan = build_plan(paths, args, PlanMode::DryRun)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }
    print_plan(&plan);
    Ok(())
}

fn print_plan(plan: &PlanResult) {
    println!(
        "model:   {} ({})",
        plan.model.id, plan.model.source
    );
    println!("host:    {}", plan.host_ids().join(", "));
    println!("backend: {}", plan.backend_id().unwrap_or("none"));
    if let Some(endpoint) = plan.endpoint() {
        println!("serves:  {endpoint}");
    }
    if plan.reuse {
        println!("reuse:   a matching healthy instance is running; only the probe runs");
    }
    println!();
    for (i, step) in plan.steps.iter().enumerate() {
        println!(
            "{:>2}. {:<15} [{}] {}s",
            i + 1,
            step.kind.name(),
            step.host_id,
            step.timeout().as_secs()
        );
        println!("    {}", step.command);
        if let Some(rollback) = step.kind.rollback() {
            println!("    rollback: {rollback}");
        }
    }
}

fn step_printer() -> StepObserver {
    Arc::new(|step: &PlanStep, status: StepStatus, detail: &str| match status {
        StepStatus::Start => eprintln!("-> {} [{}]", step.description, step.host_id),
        StepStatus::Done => eprintln!("   ok"),
        StepStatus::Error => eprintln!("   FAILED: {}", detail.lines().next().unwrap_or("")),
        StepStatus::Skipped => eprintln!("-- {} [{}]: {}", step.kind.name(), step.host_id, detail),
    })
}

/// Abort after the current step on Ctrl-C.
fn abort_on_interrupt() -> AbortSignal {
    let abort = AbortSignal::new();
    let signal = abort.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current step");
            signal.abort();
        }
    });
    abort
}

fn options(force: bool) -> ExecuteOptions {
    ExecuteOptions::new()
        .force(force)
        .with_abort(abort_on_interrupt())
        .with_confirmer(Arc::new(PromptConfirmer))
        .on_step(step_printer())
}

fn finish(report: &ExecuteReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if report.ok {
        if report.reused {
            println!("Already running and healthy.");
        }
        if let Some(endpoint) = &report.endpoint {
            println!("Ready: {endpoint}");
        }
        if !report.torn_down.is_empty() {
            println!("Stopped: {}", report.torn_down.join(", "));
        }
    } else if let Some(error) = &report.error {
        eprintln!("{error}");
        if !report.torn_down.is_empty() {
            eprintln!("Torn down: {}", report.torn_down.join(", "));
        }
    }
    if !report.ok {
        std::process::exit(1);
    }
    Ok(())
}

pub async fn up(paths: &StatePaths, args: &UpArgs) -> Result<()> {
    let mode = if args.dry_run {
        PlanMode::DryRun
    } else {
        PlanMode::Live
    };
    let plan = build_plan(paths, &args.plan, mode)?;
    let report = executor(paths).execute(&plan, &options(args.force)).await;
    finish(&report, args.plan.json)
}

pub async fn down(paths: &StatePaths, force: bool) -> Result<()> {
    let config = load_config(paths)?;
    let report = executor(paths).stop_active(&config, &options(force)).await;
    if report.ok && report.torn_down.is_empty() {
        println!("Nothing is running.");
    }
    finish(&report, false)
}

pub async fn status(paths: &StatePaths, probe: bool) -> Result<()> {
    let Some(active) = executor(paths).active()? else {
        println!("Nothing is running.");
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&active)?);

    if !probe {
        return Ok(());
    }
    let Some(endpoint) = &active.endpoint else {
        bail!("active runtime has no endpoint to probe");
    };
    let client = reqwest::Client::builder()
        .timeout(STATUS_PROBE_TIMEOUT)
        .build()?;
    let url = format!("{}/models", endpoint.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body: serde_json::Value = resp.json().await.unwrap_or_default();
            let models: Vec<&str> = body["data"]
                .as_array()
                .map(|data| data.iter().filter_map(|m| m["id"].as_str()).collect())
                .unwrap_or_default();
            println!("healthy: {url} serves [{}]", models.join(", "));
            Ok(())
        }
        Ok(resp) => bail!("unhealthy: {url} returned HTTP {}", resp.status()),
        Err(e) => bail!("unreachable: {url}: {e}"),
    }
}
