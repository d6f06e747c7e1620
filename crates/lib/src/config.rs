//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.adkchat/config.json`) and environment.
//! The only setting most users touch is the backend base URL.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend proxy settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Local persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend proxy URL, identity, and health polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    /// Proxy base URL (default "http://localhost:3001"). Overridden by ADK_API_BASE_URL env.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User id sent with every chat request.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Seconds between health probes (default 30).
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_user_id() -> String {
    "react_user".to_string()
}

fn default_health_interval_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_id: default_user_id(),
            health_interval_secs: default_health_interval_secs(),
        }
    }
}

impl ApiConfig {
    /// Health probe period; a zero value falls back to the default.
    pub fn health_interval(&self) -> Duration {
        let secs = if self.health_interval_secs == 0 {
            default_health_interval_secs()
        } else {
            self.health_interval_secs
        };
        Duration::from_secs(secs)
    }
}

/// Where session id and history are kept between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Storage file. Relative paths are resolved against the config file's parent.
    /// Omit to use `storage.json` beside the config file.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Resolve the backend base URL: env ADK_API_BASE_URL overrides config. Trailing slashes are dropped.
pub fn resolve_base_url(config: &Config) -> String {
    std::env::var("ADK_API_BASE_URL")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .unwrap_or_else(|| config.api.base_url.trim().to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("ADKCHAT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".adkchat").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used (for resolving the storage file).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Resolve the storage file: `storage.path` if set (relative to the config file's parent),
/// otherwise `storage.json` beside the config file.
pub fn resolve_storage_path(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.storage.path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                p.clone()
            } else {
                config_parent.join(p)
            }
        }
        _ => config_parent.join("storage.json"),
    }
}
