//! Runtime lock, one orchestration run per state directory.
//!
//! The lock body is written to a private temp file and then hard-linked into
//! place, so the lock never appears half-written. It only serialises runs on
//! this machine that share the same state directory; two machines pointing at
//! the same hosts are not coordinated.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use modeldock_core::fsutil::remove_if_exists;
use modeldock_core::{Error, Result, RuntimeLock};
use tracing::{debug, info, warn};

use crate::types::Confirmer;

/// A lock older than this is reclaimed without asking.
pub const STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// An unreadable lock younger than this is left alone.
pub const UNREADABLE_GRACE: Duration = Duration::from_secs(10);

const MAX_ATTEMPTS: usize = 3;

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Holds the lock file; removes it when dropped.
#[derive(Debug)]
pub struct RuntimeLockGuard {
    path: PathBuf,
    record: RuntimeLock,
}

impl RuntimeLockGuard {
    pub fn record(&self) -> &RuntimeLock {
        &self.record
    }
}

impl Drop for RuntimeLockGuard {
    fn drop(&mut self) {
        match remove_if_exists(&self.path) {
            Ok(()) => debug!("Released runtime lock {}", self.path.display()),
            Err(e) => warn!("Failed to remove runtime lock {}: {}", self.path.display(), e),
        }
    }
}

/// Take the lock at `path` for `model`.
///
/// Stale locks and locks whose owner is gone are reclaimed. A live lock is
/// only taken over when `force` is set and `confirmer` agrees.
pub fn acquire(
    path: &Path,
    model: &str,
    force: bool,
    confirmer: Option<&dyn Confirmer>,
) -> Result<RuntimeLockGuard> {
    let record = RuntimeLock {
        pid: std::process::id(),
        started_at: Utc::now(),
        model: model.to_string(),
    };
    let body = serde_json::to_vec_pretty(&record)?;

    for _ in 0..MAX_ATTEMPTS {
        match create_exclusive(path, &body) {
            Ok(()) => {
                debug!("Acquired runtime lock {} for {}", path.display(), model);
                return Ok(RuntimeLockGuard {
                    path: path.to_path_buf(),
                    record,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        match read_holder(path) {
            None if !is_old(path, UNREADABLE_GRACE) => {
                return Err(Error::Lock(format!(
                    "runtime lock {} is unreadable and was modified less than {}s ago",
                    path.display(),
                    UNREADABLE_GRACE.as_secs()
                )));
            }
            None => {
                warn!("Runtime lock {} is unreadable; reclaiming", path.display());
            }
            Some(holder) if is_stale(&holder) => {
                info!(
                    "Reclaiming stale runtime lock held by PID {} since {} ({})",
                    holder.pid, holder.started_at, holder.model
                );
            }
            Some(holder) if !is_pid_alive(holder.pid) => {
                info!(
                    "Reclaiming runtime lock from dead PID {} ({})",
                    holder.pid, holder.model
                );
            }
            Some(holder) => {
                let prompt = format!("Runtime lock held by PID {} — force takeover?", holder.pid);
                let confirmed = force && confirmer.map_or(false, |c| c.confirm(&prompt));
                if !confirmed {
                    return Err(Error::Lock(format!(
                        "runtime lock held by PID {} for {} since {}",
                        holder.pid, holder.model, holder.started_at
                    )));
                }
                warn!("Forcing takeover of runtime lock held by PID {}", holder.pid);
            }
        }
        remove_if_exists(path)?;
    }

    Err(Error::Lock(format!(
        "could not acquire {} after {} attempts",
        path.display(),
        MAX_ATTEMPTS
    )))
}

/// Publish `body` at `path`, failing with `AlreadyExists` if a lock is present.
fn create_exclusive(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let temp = path.with_extension(format!(
        "lock.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let result = write_temp(&temp, body).and_then(|()| std::fs::hard_link(&temp, path));
    if let Err(e) = remove_if_exists(&temp) {
        warn!("Failed to remove {}: {}", temp.display(), e);
    }
    result
}

fn write_temp(temp: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(temp)?;
    file.write_all(body)?;
    file.sync_all()
}

fn is_old(path: &Path, age: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map_or(true, |elapsed| elapsed > age)
}

fn read_holder(path: &Path) -> Option<RuntimeLock> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

fn is_stale(holder: &RuntimeLock) -> bool {
    let age = Utc::now().signed_duration_since(holder.started_at);
    age.to_std().map_or(false, |age| age > STALE_AFTER)
}

/// Whether a process with `pid` exists on this machine.
pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    #[cfg(unix)]
    {
        let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
        ret == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }
    #[cfg(not(unix))]
    {
        true
    }
}
