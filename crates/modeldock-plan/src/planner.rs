//! Resolves host and backend for a model and emits ordered steps.

use modeldock_core::{
    interpolate, ActiveRuntime, Policy, RuntimeBackend, RuntimeHost, RuntimeModel,
    RuntimesConfig, TemplateVars,
};
use modeldock_host::ExecTarget;
use tracing::{debug, info};

use crate::types::*;

/// Build a plan for `request` against `config`.
///
/// `active` is the persisted active runtime, if any; a healthy match turns
/// the plan into a single reuse probe unless `force_restart` is set.
pub fn plan(
    request: &PlanRequest,
    config: &RuntimesConfig,
    active: Option<&ActiveRuntime>,
) -> Result<PlanResult, PlanError> {
    let model = resolve_model(config, &request.model_id)?;
    let host = resolve_host(config, model, request.host_override.as_deref())?;
    let backend = resolve_backend(config, model, host, request.backend_override.as_deref())?;

    debug!(
        "Resolved {} -> host={} backend={}",
        model.id,
        host.id,
        backend.map_or("none", |b| b.id.as_str())
    );

    let vars = template_vars(model, host, backend);
    let steps = build_steps(model, host, backend, &vars)?;

    let target = ExecTarget::from(host);
    let host_ids = vec![host.id.clone()];
    let backend_id = backend.map(|b| b.id.as_str());

    let reusable = !request.force_restart
        && active.map_or(false, |a| a.healthy && a.matches(&model.id, backend_id, &host_ids));

    let (steps, fallback_steps) = if reusable {
        info!("{} already running on {}; planning a reuse probe", model.id, host.id);
        let probe: Vec<PlanStep> = steps.iter().filter(|s| s.is_probe()).cloned().collect();
        (probe, steps)
    } else {
        (steps, Vec::new())
    };

    Ok(PlanResult {
        mode: request.mode,
        model: PlannedModel {
            id: model.id.clone(),
            name: display_name(&model.name, &model.id),
            source: model.source.clone(),
            port: model.port(),
            log_file: model.log_file(),
            probe_timeout_sec: model.launch.probe_timeout_sec,
            probe_interval_ms: model.launch.probe_interval_ms,
        },
        backend: backend.map(|b| PlannedBackend {
            id: b.id.clone(),
            name: display_name(&b.name, &b.id),
            kind: b.kind,
        }),
        hosts: vec![target],
        reuse: reusable,
        steps,
        fallback_steps,
    })
}

/// The `stop_model` step for a host, rendered for a given model/backend.
///
/// Returns `None` when the host defines no stop command.
pub fn stop_step(
    config: &RuntimesConfig,
    model_id: &str,
    host_id: &str,
    backend_id: Option<&str>,
) -> Result<Option<PlanStep>, PlanError> {
    let model = config.model(model_id).ok_or_else(|| {
        PlanError::new(PlanErrorCode::ModelNotFound, format!("model \"{model_id}\" not found"))
    })?;
    let host = config.host(host_id).ok_or_else(|| {
        PlanError::new(PlanErrorCode::HostNotFound, format!("host \"{host_id}\" not found"))
    })?;
    let backend = match backend_id {
        Some(id) => Some(config.backend(id).ok_or_else(|| {
            PlanError::new(PlanErrorCode::BackendNotFound, format!("backend \"{id}\" not found"))
        })?),
        None => None,
    };
    let vars = template_vars(model, host, backend);
    build_stop(model, host, &vars)
}

fn resolve_model<'a>(config: &'a RuntimesConfig, id: &str) -> Result<&'a RuntimeModel, PlanError> {
    let model = config.model(id).ok_or_else(|| {
        PlanError::new(PlanErrorCode::ModelNotFound, format!("model \"{id}\" not found"))
    })?;
    if !model.enabled {
        return Err(PlanError::new(
            PlanErrorCode::ModelDisabled,
            format!("model \"{id}\" is not enabled"),
        ));
    }
    Ok(model)
}

fn resolve_host<'a>(
    config: &'a RuntimesConfig,
    model: &RuntimeModel,
    host_override: Option<&str>,
) -> Result<&'a RuntimeHost, PlanError> {
    if let Some(id) = host_override {
        let host = config.host(id).ok_or_else(|| {
            PlanError::new(PlanErrorCode::HostNotFound, format!("host \"{id}\" not found"))
        })?;
        if !host.enabled {
            return Err(PlanError::new(
                PlanErrorCode::HostDisabled,
                format!("host \"{id}\" is not enabled"),
            ));
        }
        return Ok(host);
    }

    let found = match &model.host_policy {
        Policy::Any => config.hosts.iter().find(|h| h.enabled),
        Policy::Only(ids) => ids
            .iter()
            .filter_map(|id| config.host(id))
            .find(|h| h.enabled),
    };
    found.ok_or_else(|| {
        PlanError::new(
            PlanErrorCode::NoEligibleHost,
            format!("no enabled host satisfies the host policy of model \"{}\"", model.id),
        )
    })
}

fn resolve_backend<'a>(
    config: &'a RuntimesConfig,
    model: &RuntimeModel,
    host: &RuntimeHost,
    backend_override: Option<&str>,
) -> Result<Option<&'a RuntimeBackend>, PlanError> {
    if let Some(id) = backend_override {
        let backend = config.backend(id).ok_or_else(|| {
            PlanError::new(PlanErrorCode::BackendNotFound, format!("backend \"{id}\" not found"))
        })?;
        if !backend.enabled {
            return Err(PlanError::new(
                PlanErrorCode::BackendDisabled,
                format!("backend \"{id}\" is not enabled"),
            ));
        }
        if !backend.hosts.admits(&host.id) {
            return Err(PlanError::new(
                PlanErrorCode::BackendHostMismatch,
                format!("backend \"{id}\" cannot run on host \"{}\"", host.id),
            ));
        }
        return Ok(Some(backend));
    }

    match &model.backend_policy {
        Policy::Any => Ok(None),
        Policy::Only(ids) => ids
            .iter()
            .filter_map(|id| config.backend(id))
            .find(|b| b.enabled && b.hosts.admits(&host.id))
            .map(Some)
            .ok_or_else(|| {
                PlanError::new(
                    PlanErrorCode::NoEligibleBackend,
                    format!(
                        "no enabled backend for model \"{}\" can run on host \"{}\"",
                        model.id, host.id
                    ),
                )
            }),
    }
}

fn template_vars(
    model: &RuntimeModel,
    host: &RuntimeHost,
    backend: Option<&RuntimeBackend>,
) -> TemplateVars {
    let vars = TemplateVars::new()
        .value("source", &model.source)
        .value("port", model.port().to_string())
        .value("host", host.address())
        .value("model_id", &model.id)
        .value("host_id", &host.id);

    match backend {
        Some(b) => vars
            .value("backend_id", &b.id)
            .words("backend_args", &b.args)
            .assignments("backend_env", &b.env),
        None => vars,
    }
}

fn build_steps(
    model: &RuntimeModel,
    host: &RuntimeHost,
    backend: Option<&RuntimeBackend>,
    vars: &TemplateVars,
) -> Result<Vec<PlanStep>, PlanError> {
    let mut steps = Vec::with_capacity(5);

    if let Some(stop) = build_stop(model, host, vars)? {
        steps.push(stop);
    }

    if let Some(backend) = backend {
        let rollback = non_empty(backend.rollback_command.as_deref())
            .map(|t| render(t, vars))
            .transpose()?;

        if let Some(apply) = non_empty(backend.apply_command.as_deref()) {
            steps.push(PlanStep {
                kind: StepKind::ApplyBackend {
                    rollback: rollback.clone(),
                },
                host_id: host.id.clone(),
                command: render(apply, vars)?,
                timeout_ms: millis(APPLY_TIMEOUT),
                description: format!("Apply backend {} on {}", backend.id, host.id),
            });
        }
        if let Some(verify) = non_empty(backend.verify_command.as_deref()) {
            steps.push(PlanStep {
                kind: StepKind::VerifyBackend { rollback },
                host_id: host.id.clone(),
                command: render(verify, vars)?,
                timeout_ms: millis(VERIFY_TIMEOUT),
                description: format!("Verify backend {} on {}", backend.id, host.id),
            });
        }
    }

    steps.push(PlanStep {
        kind: StepKind::StartModel,
        host_id: host.id.clone(),
        command: render(&model.launch.start_command, vars)?,
        timeout_ms: millis(START_TIMEOUT),
        description: format!("Start {} on {}", model.id, host.id),
    });

    let probe_timeout_sec = model
        .launch
        .probe_timeout_sec
        .unwrap_or(DEFAULT_PROBE_TIMEOUT_SEC);
    steps.push(PlanStep {
        kind: StepKind::ProbeHealth {
            interval_ms: model
                .launch
                .probe_interval_ms
                .unwrap_or(DEFAULT_PROBE_INTERVAL_MS),
        },
        host_id: host.id.clone(),
        command: render(&model.launch.probe_command, vars)?,
        timeout_ms: probe_timeout_sec.saturating_mul(1000),
        description: format!("Wait for {} to become healthy on {}", model.id, host.id),
    });

    Ok(steps)
}

fn build_stop(
    model: &RuntimeModel,
    host: &RuntimeHost,
    vars: &TemplateVars,
) -> Result<Option<PlanStep>, PlanError> {
    let Some(template) = non_empty(Some(host.stop_command.as_str())) else {
        return Ok(None);
    };
    Ok(Some(PlanStep {
        kind: StepKind::StopModel,
        host_id: host.id.clone(),
        command: render(template, vars)?,
        timeout_ms: millis(STOP_TIMEOUT),
        description: format!("Stop {} on {}", model.id, host.id),
    }))
}

fn render(template: &str, vars: &TemplateVars) -> Result<String, PlanError> {
    interpolate(template, vars).map_err(|e| PlanError::new(PlanErrorCode::TemplateError, e.to_string()))
}

fn non_empty(template: Option<&str>) -> Option<&str> {
    template.filter(|t| !t.trim().is_empty())
}

fn display_name(name: &str, id: &str) -> String {
    if name.is_empty() {
        id.to_string()
    } else {
        name.to_string()
    }
}

fn millis(d: std::time::Duration) -> u64 {
    d.as_millis() as u64
}
