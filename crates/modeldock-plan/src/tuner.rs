//! Dynamic probe tuning.
//!
//! Large models take minutes to load, so a fixed probe deadline is either too
//! short for a 70B model or too long for a 1B one. The tuner guesses the
//! on-disk size from the artifact name and widens the probe accordingly.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::types::{PlanResult, PlanStep, StepKind};

/// Parameter count: `70b`, `1.5b`, `8x7b`.
static PARAMS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^a-z0-9.])(?:(\d+)x)?(\d+(?:\.\d+)?)b(?:[^a-z0-9]|$)").unwrap()
});

/// GGUF quant tag: `q4_k_m`, `q8_0`, `iq3_xs`.
static QUANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^a-z0-9])i?q([2-8])(?:[^0-9]|$)").unwrap());

/// Container and runtime overhead on top of raw weights.
const OVERHEAD: f64 = 1.08;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// (upper bound in GiB, probe timeout sec, probe interval ms)
const TIERS: &[(f64, u64, u64)] = &[
    (8.0, 180, 2_000),
    (24.0, 300, 3_000),
    (48.0, 600, 5_000),
    (96.0, 900, 5_000),
    (f64::INFINITY, 1_800, 10_000),
];

/// Probe settings the tuner applied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProbeTuning {
    pub size_gib: f64,
    pub timeout_sec: u64,
    pub interval_ms: u64,
}

/// Estimate an artifact's size in GiB from its name.
pub fn estimate_size_gib(source: &str) -> Option<f64> {
    let name = source.to_lowercase();
    let caps = PARAMS_RE.captures(&name)?;

    let experts = match caps.get(1) {
        Some(m) => m.as_str().parse::<f64>().ok()?,
        None => 1.0,
    };
    let billions = caps.get(2)?.as_str().parse::<f64>().ok()?;
    if billions <= 0.0 {
        return None;
    }

    let bytes = experts * billions * 1e9 * bits_per_weight(&name) / 8.0 * OVERHEAD;
    Some(bytes / GIB)
}

fn bits_per_weight(name: &str) -> f64 {
    if name.contains("mxfp4") || name.contains("fp4") {
        return 4.0;
    }
    QUANT_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(16.0)
}

/// Widen the probe steps of `plan` to fit the model's estimated size.
///
/// Probe settings the catalog sets explicitly are kept. Returns `None` and
/// leaves the plan untouched when both are set or the size is unknown.
pub fn tune_probe(plan: &mut PlanResult) -> Option<ProbeTuning> {
    let model = &plan.model;
    if model.probe_timeout_sec.is_some() && model.probe_interval_ms.is_some() {
        return None;
    }
    let size_gib = estimate_size_gib(&model.source)?;
    let (_, tier_timeout, tier_interval) = TIERS
        .iter()
        .copied()
        .find(|(limit, _, _)| size_gib < *limit)?;

    let tuning = ProbeTuning {
        size_gib,
        timeout_sec: model.probe_timeout_sec.unwrap_or(tier_timeout),
        interval_ms: model.probe_interval_ms.unwrap_or(tier_interval),
    };
    debug!(
        "Tuned probe for {} (~{:.1} GiB): {}s / {}ms",
        model.id, size_gib, tuning.timeout_sec, tuning.interval_ms
    );

    for step in plan.steps.iter_mut().chain(plan.fallback_steps.iter_mut()) {
        apply(step, &tuning);
    }
    Some(tuning)
}

fn apply(step: &mut PlanStep, tuning: &ProbeTuning) {
    if let StepKind::ProbeHealth { interval_ms } = &mut step.kind {
        *interval_ms = tuning.interval_ms;
        step.timeout_ms = tuning.timeout_sec.saturating_mul(1000);
    }
}
