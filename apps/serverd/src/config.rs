//! Server configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/cargohold/server.toml`
//! - Windows: `%APPDATA%/cargohold/server.toml`
//!
//! The `CARGOHOLD_CONFIG` environment variable overrides the path.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cargohold_registry::RegistryConfig;
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Root directory for session state, chunk data, and artifacts.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Chunk size in bytes; clients must slice files the same way.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Idle seconds before an active session expires.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Seconds between cleanup sweep ticks.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Seconds an expired tombstone keeps answering status queries.
    #[serde(default = "default_expired_grace_secs")]
    pub expired_grace_secs: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3001".into()
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_chunk_size() -> u64 {
    5 * 1024 * 1024
}

fn default_session_ttl_secs() -> u64 {
    30 * 60
}

fn default_cleanup_interval_secs() -> u64 {
    5 * 60
}

fn default_expired_grace_secs() -> u64 {
    10 * 60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            storage_root: default_storage_root(),
            chunk_size: default_chunk_size(),
            session_ttl_secs: default_session_ttl_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            expired_grace_secs: default_expired_grace_secs(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// The registry's view of this configuration.
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            storage_root: self.storage_root.clone(),
            chunk_size: self.chunk_size,
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            expired_grace: Duration::from_secs(self.expired_grace_secs),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var("CARGOHOLD_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")?;
        Ok(PathBuf::from(appdata).join("cargohold").join("server.toml"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("cargohold")
            .join("server.toml"))
    }
}
