//! modeldock host — run a command on a host, locally or over SSH.
//!
//! `HostRunner` is the seam every other crate executes through; it is the
//! only place transport differences exist. `ShellRunner` is the production
//! implementation. Both transports return the same [`CommandOutput`] and
//! enforce a hard timeout reported as exit code 124.

pub mod output;
pub mod runner;
pub mod ssh;
pub mod target;

pub use output::{CommandOutput, SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE};
pub use runner::{privileged, HostRunner, ShellRunner};
pub use target::ExecTarget;
