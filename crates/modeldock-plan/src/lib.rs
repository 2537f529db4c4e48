//! modeldock plan — turn a model-selection request into an ordered step list.
//!
//! `plan` resolves the host and backend for a model according to its
//! policies, decides whether an already-running instance can be reused, and
//! renders every command template. `tune_probe` optionally scales the health
//! probe to the model's estimated size.

pub mod planner;
pub mod tuner;
pub mod types;

pub use planner::{plan, stop_step};
pub use tuner::{estimate_size_gib, tune_probe, ProbeTuning};
pub use types::*;
