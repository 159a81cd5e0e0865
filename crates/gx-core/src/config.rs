//! Global configuration and the hosts file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gx_host::serde_utils::duration_millis;
use gx_host::{HostConfig, SshOptions};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable overriding the geneos root
pub const ENV_HOME: &str = "GENEOS_HOME";

/// Environment variable overriding the global config file path
pub const ENV_CONFIG: &str = "GENEOS_CONFIG";

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geneos")
}

/// Get the default global configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("geneos.toml")
}

/// Get the default hosts file path
pub fn default_hosts_path() -> PathBuf {
    default_config_dir().join("hosts.toml")
}

/// Settings that apply to every instance on every host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Geneos root directory, used for hosts without their own `root`
    pub root: PathBuf,

    /// Free-form `<type>::<key>` settings, e.g. `gateway::ports`
    pub settings: BTreeMap<String, String>,

    /// SSH client options for remote hosts
    pub ssh: SshOptions,

    /// Polling schedule used to confirm a start
    pub start_confirm: BackoffConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/"))
                .join("geneos"),
            settings: BTreeMap::new(),
            ssh: SshOptions::default(),
            start_confirm: BackoffConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Look up a global setting
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Look up a per-type global setting `<type>::<key>`
    pub fn type_setting(&self, kind: &str, key: &str) -> Option<&str> {
        self.setting(&format!("{}::{}", kind, key))
    }

    /// Load from `path`, falling back to defaults when the file is absent,
    /// then apply the `GENEOS_HOME` override
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match load_config::<GlobalConfig>(path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!("no config at {}, using defaults", path.display());
                GlobalConfig::default()
            }
            Err(e) => return Err(e),
        };
        if let Ok(root) = std::env::var(ENV_HOME) {
            if !root.is_empty() {
                config.root = PathBuf::from(root);
            }
        }
        Ok(config)
    }
}

/// Exponential backoff schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// First delay
    #[serde(with = "duration_millis")]
    pub initial: Duration,

    /// Upper bound on a single delay
    #[serde(with = "duration_millis")]
    pub max: Duration,

    /// Multiplier applied after each attempt
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,

    /// Number of attempts before giving up
    pub attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(250),
            max: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: 0.0,
            attempts: 5,
        }
    }
}

/// Remote host definitions, stored in `hosts.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostsFile {
    pub hosts: Vec<HostConfig>,
}

impl HostsFile {
    /// Load from `path`; a missing file is an empty host list
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match load_config::<HostsFile>(path) {
            Ok(hosts) => Ok(hosts),
            Err(ConfigError::NotFound(_)) => Ok(HostsFile::default()),
            Err(e) => Err(e),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HostConfig> {
        self.hosts.iter().find(|h| h.name == name)
    }
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("failed to read {}: {}", path.display(), e)))?;

    Ok(toml::from_str(&content)?)
}

/// Save configuration to a file, creating its directory if needed
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("failed to write {}: {}", path.display(), e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = load_config::<GlobalConfig>(&dir.path().join("geneos.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_save_and_load_global_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("geneos.toml");

        let mut config = GlobalConfig {
            root: PathBuf::from("/opt/itrs"),
            ..GlobalConfig::default()
        };
        config
            .settings
            .insert("gateway::ports".to_string(), "8000-8010".to_string());
        save_config(&path, &config).unwrap();

        let loaded: GlobalConfig = load_config(&path).unwrap();
        assert_eq!(loaded.root, PathBuf::from("/opt/itrs"));
        assert_eq!(loaded.type_setting("gateway", "ports"), Some("8000-8010"));
        assert_eq!(loaded.start_confirm.attempts, 5);
        assert_eq!(loaded.ssh.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: GlobalConfig = toml::from_str(
            r#"
            root = "/srv/geneos"

            [start_confirm]
            initial = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/geneos"));
        assert_eq!(config.start_confirm.initial, Duration::from_millis(100));
        assert_eq!(config.start_confirm.max, Duration::from_secs(2));
    }

    #[test]
    fn test_hosts_file() {
        let hosts: HostsFile = toml::from_str(
            r#"
            [[hosts]]
            name = "db1"
            hostname = "db1.example.com"
            username = "geneos"
            root = "/opt/geneos"

            [[hosts]]
            name = "web"
            hostname = "10.0.0.7"
            port = 2222
            "#,
        )
        .unwrap();
        assert_eq!(hosts.hosts.len(), 2);
        let db1 = hosts.get("db1").unwrap();
        assert_eq!(db1.port, 22);
        assert_eq!(db1.root, Some(PathBuf::from("/opt/geneos")));
        assert_eq!(hosts.get("web").unwrap().port, 2222);
        assert!(hosts.get("nope").is_none());
    }
}
