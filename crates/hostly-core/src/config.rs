use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HostlyError, Result};

const CONFIG_FILE: &str = "config.toml";
const BASE_DIR_ENV: &str = "HOSTLY_BASE";

/// Default config template with rich comments
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Hostly configuration file
# Location: <data dir>/hostly/config.toml

[hosts]
# System hosts file that composed profiles are written to.
# Default: the platform hosts file (/etc/hosts on Unix)
# path = "/etc/hosts"

[remote]
# Timeout for a single remote profile download, in seconds
timeout_secs = 10

# How often due remote profiles are checked, in seconds
tick_secs = 5

# Delay before the first due-check after start, in seconds
startup_delay_secs = 5

# Largest accepted remote response body, in bytes
max_body_bytes = 16777216

[store]
# Empty profiles created on first run (after the system hosts backup)
default_profiles = ["Dev", "Test", "Prod"]
"#;

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub hosts: HostsSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

/// System hosts target
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HostsSettings {
    /// Overrides the platform hosts path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Remote profile fetching and scheduling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_tick_secs() -> u64 {
    5
}

fn default_startup_delay_secs() -> u64 {
    5
}

fn default_max_body_bytes() -> u64 {
    16 * 1024 * 1024
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            tick_secs: default_tick_secs(),
            startup_delay_secs: default_startup_delay_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

/// Catalog seeding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    #[serde(default = "default_profiles")]
    pub default_profiles: Vec<String>,
}

fn default_profiles() -> Vec<String> {
    ["Dev", "Test", "Prod"].iter().map(|s| s.to_string()).collect()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            default_profiles: default_profiles(),
        }
    }
}

impl Settings {
    /// Load settings from base directory
    pub fn load(base_dir: &Path) -> Result<Self> {
        let path = base_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let settings: Settings =
            toml::from_str(&content).map_err(|e| HostlyError::ConfigParse {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Ok(settings)
    }

    /// Save settings to base directory
    pub fn save(&self, base_dir: &Path) -> Result<()> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        let content = toml::to_string_pretty(self).map_err(|e| HostlyError::ConfigParse {
            path: path.clone(),
            message: e.to_string(),
        })?;

        fs::write(&path, content)?;
        Ok(())
    }

    /// Initialize settings with default template (rich comments)
    pub fn init(base_dir: &Path) -> Result<PathBuf> {
        let path = base_dir.join(CONFIG_FILE);
        fs::create_dir_all(base_dir)?;

        if !path.exists() {
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        }

        Ok(path)
    }

    /// Resolve the base directory: `HOSTLY_BASE`, then the platform data dir
    pub fn default_base_dir() -> Result<PathBuf> {
        if let Ok(base) = std::env::var(BASE_DIR_ENV) {
            return Ok(PathBuf::from(base));
        }

        dirs::data_dir()
            .map(|d| d.join("hostly"))
            .ok_or(HostlyError::HomeNotFound)
    }

    /// Get a setting by dot-notation key
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "hosts.path" => Some(
                self.hosts
                    .path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            ),
            "remote.timeout_secs" => Some(self.remote.timeout_secs.to_string()),
            "remote.tick_secs" => Some(self.remote.tick_secs.to_string()),
            "remote.startup_delay_secs" => Some(self.remote.startup_delay_secs.to_string()),
            "remote.max_body_bytes" => Some(self.remote.max_body_bytes.to_string()),
            "store.default_profiles" => Some(format!("{:?}", self.store.default_profiles)),
            _ => None,
        }
    }

    /// Set a setting by dot-notation key
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "hosts.path" => {
                let trimmed = value.trim();
                self.hosts.path = if trimmed.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(trimmed))
                };
            }
            "remote.timeout_secs" => self.remote.timeout_secs = parse_u64(key, value)?,
            "remote.tick_secs" => self.remote.tick_secs = parse_u64(key, value)?,
            "remote.startup_delay_secs" => {
                self.remote.startup_delay_secs = parse_u64(key, value)?
            }
            "remote.max_body_bytes" => self.remote.max_body_bytes = parse_u64(key, value)?,
            "store.default_profiles" => {
                self.store.default_profiles = parse_string_list(value);
            }
            _ => {
                return Err(HostlyError::ConfigKeyNotFound {
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }

    /// List all setting keys with their current values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "hosts.path",
            "remote.timeout_secs",
            "remote.tick_secs",
            "remote.startup_delay_secs",
            "remote.max_body_bytes",
            "store.default_profiles",
        ]
        .iter()
        .filter_map(|key| self.get(key).map(|v| (key.to_string(), v)))
        .collect()
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value.trim().parse().map_err(|_| HostlyError::ConfigParse {
        path: PathBuf::from(CONFIG_FILE),
        message: format!("{} expects an unsigned integer, got '{}'", key, value),
    })
}

/// Parse a comma-separated or JSON-like list string
fn parse_string_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();

    let inner = if trimmed.starts_with('[') && trimmed.ends_with(']') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    };

    inner
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
