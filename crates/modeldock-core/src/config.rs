//! State directory management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable that overrides the state directory.
pub const HOME_ENV: &str = "MODELDOCK_HOME";

/// Paths to every file modeldock reads or writes.
///
/// All three files live in one directory. The runtime lock only protects
/// orchestration runs that share this directory on this machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatePaths {
    /// Root state directory (e.g. `~/.modeldock/`).
    pub root: PathBuf,
    /// Declarative catalog (`runtimes.json`).
    pub config_file: PathBuf,
    /// Orchestration lock (`runtime.lock`).
    pub lock_file: PathBuf,
    /// Currently deployed runtime (`active-runtime.json`).
    pub active_file: PathBuf,
}

impl StatePaths {
    /// Create state paths under a root directory. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self::at(root))
    }

    /// Build paths without touching the filesystem.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_file: root.join("runtimes.json"),
            lock_file: root.join("runtime.lock"),
            active_file: root.join("active-runtime.json"),
            root,
        }
    }

    /// Resolve the state directory: `$MODELDOCK_HOME`, else `~/.modeldock`.
    pub fn resolve_root() -> PathBuf {
        if let Ok(dir) = std::env::var(HOME_ENV) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs::home_dir()
            .map(|home| home.join(".modeldock"))
            .unwrap_or_else(|| PathBuf::from(".modeldock"))
    }

    /// Create state paths from the environment and defaults.
    pub fn from_env() -> std::io::Result<Self> {
        Self::new(Self::resolve_root())
    }
}
