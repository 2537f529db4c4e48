//! modeldock runtime — executes plans.
//!
//! The [`Executor`] takes the runtime lock, runs plan steps through a
//! [`HostRunner`](modeldock_host::HostRunner), rolls back and tears down on
//! failure, and records what ended up running in `active-runtime.json`.

pub mod active;
pub mod diagnose;
pub mod executor;
pub mod lock;
pub mod types;

pub use active::ActiveRuntimeStore;
pub use executor::Executor;
pub use lock::{acquire as acquire_lock, is_pid_alive, RuntimeLockGuard, STALE_AFTER};
pub use types::*;
