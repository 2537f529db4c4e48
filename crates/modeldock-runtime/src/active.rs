//! Persisted record of the currently deployed runtime.

use std::path::{Path, PathBuf};

use modeldock_core::fsutil::{remove_if_exists, write_atomic};
use modeldock_core::{ActiveRuntime, Result};
use tracing::{debug, warn};

/// Reads and writes `active-runtime.json`.
#[derive(Debug, Clone)]
pub struct ActiveRuntimeStore {
    path: PathBuf,
}

impl ActiveRuntimeStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The active runtime, or `None` if nothing is deployed.
    ///
    /// An unreadable record is treated as absent.
    pub fn load(&self) -> Result<Option<ActiveRuntime>> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&text) {
            Ok(active) => Ok(Some(active)),
            Err(e) => {
                warn!("Ignoring unreadable {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, active: &ActiveRuntime) -> Result<()> {
        let body = serde_json::to_vec_pretty(active)?;
        write_atomic(&self.path, &body)?;
        debug!("Recorded active runtime {} on {:?}", active.model_id, active.host_ids);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        remove_if_exists(&self.path)?;
        Ok(())
    }
}
