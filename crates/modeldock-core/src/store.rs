//! Loads, validates and persists `runtimes.json`.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::fsutil;
use crate::types::RuntimesConfig;
use crate::validate::{parse_config, validate};

/// Persists the runtime catalog.
///
/// Every write goes through validation first and then an atomic, owner-only
/// overwrite, because hosts may carry SSH credentials.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the catalog, writing an empty skeleton first if none exists.
    pub fn load(&self) -> Result<RuntimesConfig> {
        let (config, warnings) = self.load_with_warnings()?;
        for w in &warnings {
            warn!("{}: {}", self.path.display(), w);
        }
        Ok(config)
    }

    /// Like [`ConfigStore::load`] but hands the warnings back instead of logging them.
    pub fn load_with_warnings(&self) -> Result<(RuntimesConfig, Vec<String>)> {
        if !self.path.exists() {
            info!("Creating empty runtime catalog at {}", self.path.display());
            self.write(&RuntimesConfig::skeleton())?;
        }
        let text = std::fs::read_to_string(&self.path)?;
        parse_config(&text)
    }

    /// Validate, then atomically overwrite the catalog.
    ///
    /// On validation failure the file on disk is left untouched.
    pub fn save(&self, config: &RuntimesConfig) -> Result<()> {
        for w in validate(config)? {
            warn!("{}: {}", self.path.display(), w);
        }
        self.write(config)?;
        info!("Saved runtime catalog to {}", self.path.display());
        Ok(())
    }

    fn write(&self, config: &RuntimesConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        fsutil::write_atomic(&self.path, json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::*;

    fn store() -> (ConfigStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("runtimes.json"));
        (store, dir)
    }

    fn host(id: &str) -> RuntimeHost {
        RuntimeHost {
            id: id.into(),
            name: id.to_uppercase(),
            enabled: true,
            transport: Transport::Ssh,
            connection: Connection {
                host: Some("10.0.0.9".into()),
                user: Some("ops".into()),
                password: Some("s3cret".into()),
                ..Default::default()
            },
            capabilities: Capabilities {
                gpus: vec!["rx7900".into()],
                backends: vec!["vulkan".into()],
                vram_gb: Some(24.0),
            },
            health_command: "nvidia-smi".into(),
            stop_command: "pkill -f llama-server".into(),
        }
    }

    #[test]
    fn test_load_bootstraps_skeleton() {
        let (store, _dir) = store();
        let config = store.load().unwrap();
        assert_eq!(config, RuntimesConfig::skeleton());
        assert!(store.path().exists());
    }

    #[test]
    fn test_save_then_load_is_idempotent() {
        let (store, _dir) = store();
        let mut config = RuntimesConfig::skeleton();
        config.hosts.push(host("gpu-box"));

        store.save(&config).unwrap();
        let first = store.load().unwrap();
        store.save(&first).unwrap();
        let second = store.load().unwrap();

        assert_eq!(first, config);
        assert_eq!(second, first);
    }

    #[test]
    fn test_invalid_save_leaves_file_untouched() {
        let (store, _dir) = store();
        let mut config = RuntimesConfig::skeleton();
        config.hosts.push(host("gpu-box"));
        store.save(&config).unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        config.hosts.push(host("gpu-box"));
        assert!(matches!(store.save(&config), Err(Error::Validation(_))));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let (store, _dir) = store();
        store.save(&RuntimesConfig::skeleton()).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_load_reports_corrupt_file() {
        let (store, _dir) = store();
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(Error::Validation(_))));
    }
}
