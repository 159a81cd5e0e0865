//! Remote host configuration commands

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use gx_core::config::{save_config, HostsFile};
use gx_host::{HostConfig, LOCALHOST};

use crate::output::{format_hosts, print_success};

/// Execute the hosts command
pub fn hosts_list_command(hosts: &HostsFile) -> Result<()> {
    println!("{}", format_hosts(&hosts.hosts));
    Ok(())
}

/// Add or replace a remote host in the hosts file
pub fn hosts_add_command(
    path: &Path,
    hosts: &mut HostsFile,
    name: &str,
    hostname: Option<String>,
    port: u16,
    username: Option<String>,
    root: Option<PathBuf>,
) -> Result<()> {
    if name == LOCALHOST {
        anyhow::bail!("{} is reserved for the local host", LOCALHOST);
    }
    if name.is_empty() || name.contains(['@', ':', '*', '?', '[']) {
        anyhow::bail!("invalid host name {:?}", name);
    }

    let mut config = HostConfig::new(name, hostname.unwrap_or_else(|| name.to_string()));
    config.port = port;
    if let Some(username) = username {
        config.username = username;
    }
    config.root = root;

    hosts.hosts.retain(|h| h.name != name);
    hosts.hosts.push(config);
    hosts.hosts.sort_by(|a, b| a.name.cmp(&b.name));
    save_config(path, &*hosts)
        .with_context(|| format!("Failed to write hosts file: {:?}", path))?;

    print_success(&format!("Added host {}", name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_add_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts.toml");
        let mut hosts = HostsFile::default();

        hosts_add_command(&path, &mut hosts, "db1", None, 22, None, None).unwrap();
        hosts_add_command(
            &path,
            &mut hosts,
            "db1",
            Some("db1.example.com".to_string()),
            2222,
            Some("geneos".to_string()),
            None,
        )
        .unwrap();

        let reloaded = HostsFile::load_or_default(&path).unwrap();
        assert_eq!(reloaded.hosts.len(), 1);
        let db1 = reloaded.get("db1").unwrap();
        assert_eq!(db1.hostname, "db1.example.com");
        assert_eq!(db1.port, 2222);
        assert_eq!(db1.username, "geneos");
    }

    #[test]
    fn test_localhost_is_reserved() {
        let dir = TempDir::new().unwrap();
        let mut hosts = HostsFile::default();
        assert!(hosts_add_command(
            &dir.path().join("hosts.toml"),
            &mut hosts,
            "localhost",
            None,
            22,
            None,
            None
        )
        .is_err());
    }
}
