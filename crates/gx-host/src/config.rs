//! Host connection configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::serde_utils::duration_secs;

/// Reserved name of the local host
pub const LOCALHOST: &str = "localhost";

/// Private key file names tried, in order, when no agent identity works
pub const DEFAULT_KEY_NAMES: &[&str] = &[
    "id_rsa",
    "id_ecdsa",
    "id_ecdsa_sk",
    "id_ed25519",
    "id_ed25519_sk",
    "id_dsa",
];

/// Connection parameters for one named remote host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Name used in `NAME@HOST` references
    pub name: String,

    /// DNS name or address to dial
    pub hostname: String,

    /// SSH port
    pub port: u16,

    /// Login user
    pub username: String,

    /// Extra private keys tried before the default allow-list
    pub private_keys: Vec<PathBuf>,

    /// Geneos root directory on this host (falls back to the global root)
    pub root: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            hostname: String::new(),
            port: 22,
            username: whoami::username(),
            private_keys: vec![],
            root: None,
        }
    }
}

impl HostConfig {
    /// Create a config for `name`, dialing `hostname` on the default port
    pub fn new(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Cache key of the transport: `user@host:port`
    pub fn key(&self) -> String {
        format!("{}@{}:{}", self.username, self.hostname, self.port)
    }
}

/// SSH client options shared by every remote host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshOptions {
    /// Deadline for dialing and authenticating
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Deadline for a single remote command or SFTP session open
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,

    /// known_hosts file checked against the server key
    pub known_hosts: PathBuf,

    /// Directory holding the default private keys
    pub key_dir: PathBuf,

    /// Private key file names tried from `key_dir`
    pub key_names: Vec<String>,

    /// Try identities from a running SSH agent first
    pub use_agent: bool,
}

impl Default for SshOptions {
    fn default() -> Self {
        let ssh_dir = dirs::home_dir().unwrap_or_default().join(".ssh");
        Self {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(60),
            known_hosts: ssh_dir.join("known_hosts"),
            key_dir: ssh_dir,
            key_names: DEFAULT_KEY_NAMES.iter().map(|s| s.to_string()).collect(),
            use_agent: true,
        }
    }
}

impl SshOptions {
    /// Candidate key files for `host`: its own keys, then the allow-list
    pub fn key_paths(&self, host: &HostConfig) -> Vec<PathBuf> {
        host.private_keys
            .iter()
            .cloned()
            .chain(self.key_names.iter().map(|name| self.key_dir.join(name)))
            .collect()
    }
}
