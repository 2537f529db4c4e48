//! modeldock core — runtime catalog schema, validation, template
//! interpolation, secret redaction and the on-disk config store.

pub mod config;
pub mod error;
pub mod fsutil;
pub mod redact;
pub mod state;
pub mod store;
pub mod template;
pub mod types;
pub mod validate;

pub use config::StatePaths;
pub use error::{Error, Result};
pub use redact::{redact, REDACTED};
pub use state::{ActiveRuntime, RuntimeLock};
pub use store::ConfigStore;
pub use template::{interpolate, shell_quote, TemplateVars, TEMPLATE_VARS};
pub use types::*;
pub use validate::{parse_config, validate, MAX_PROBE_INTERVAL_MS, MAX_PROBE_TIMEOUT_SEC};
