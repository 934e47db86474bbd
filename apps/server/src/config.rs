//! Server configuration.
//!
//! Stored as TOML at the path given by `--config-path`. Every field has a
//! default, so a partial file is valid and a missing one is created.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use slicevault_server::ServerConfig;
use slicevault_transfer::TransferSettings;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// IP address to bind.
    #[serde(default = "default_address")]
    pub address: String,

    /// WebSocket port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Storage root for files, sidecar records and staging directories.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Tracing filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Let a new transfer replace an `uploading` record whose slices are gone.
    #[serde(default = "default_true")]
    pub replace_stale_uploads: bool,
}

fn default_address() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8080
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("./store")
}

fn default_log_level() -> String {
    "info".into()
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            store_dir: default_store_dir(),
            log_level: default_log_level(),
            replace_stale_uploads: default_true(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or writes and returns the defaults if
    /// the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            address: self.address.clone(),
            port: self.port,
        }
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            replace_stale_uploads: self.replace_stale_uploads,
            ..TransferSettings::new(&self.store_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.address, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.store_dir, PathBuf::from("./store"));
        assert_eq!(config.log_level, "info");
        assert!(config.replace_stale_uploads);
    }

    #[test]
    fn config_partial_toml() {
        let config: Config = toml::from_str("port = 9000\nstore_dir = \"/srv/vault\"").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.store_dir, PathBuf::from("/srv/vault"));
        assert_eq!(config.address, "0.0.0.0");
        assert!(config.replace_stale_uploads);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("etc").join("slicevault.toml");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("slicevault.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn converts_to_engine_settings() {
        let config = Config {
            store_dir: PathBuf::from("/data"),
            replace_stale_uploads: false,
            port: 0,
            ..Config::default()
        };
        let settings = config.transfer_settings();
        assert_eq!(settings.store_dir, PathBuf::from("/data"));
        assert!(!settings.replace_stale_uploads);
        assert_eq!(config.server_config().port, 0);
    }
}
