//! Dialing, host key verification and authentication

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Config, Handle};
use russh_keys::key::PublicKey;

use crate::config::{HostConfig, SshOptions};

/// Client handler that checks the server key against known_hosts
pub struct ClientHandler {
    hostname: String,
    port: u16,
    known_hosts: PathBuf,
}

impl ClientHandler {
    fn new(hostname: &str, port: u16, known_hosts: PathBuf) -> Self {
        Self {
            hostname: hostname.to_string(),
            port,
            known_hosts,
        }
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    /// Accept only keys already recorded in known_hosts
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match russh_keys::check_known_hosts_path(
            &self.hostname,
            self.port,
            server_public_key,
            &self.known_hosts,
        ) {
            Ok(true) => {
                tracing::debug!("host key for {} verified", self.hostname);
                Ok(true)
            }
            Ok(false) => {
                tracing::warn!(
                    "host key for {}:{} ({}) is not in {}; add it manually",
                    self.hostname,
                    self.port,
                    server_public_key.fingerprint(),
                    self.known_hosts.display()
                );
                Ok(false)
            }
            Err(e) => {
                tracing::error!("host key check for {} failed: {}", self.hostname, e);
                Ok(false)
            }
        }
    }
}

/// Dial `host` and authenticate. Errors are flattened to a message that
/// becomes the host's sticky transport failure.
pub(crate) async fn dial(
    host: &HostConfig,
    options: &SshOptions,
) -> Result<Handle<ClientHandler>, String> {
    let config = Arc::new(Config::default());
    let handler = ClientHandler::new(&host.hostname, host.port, options.known_hosts.clone());

    let mut session = tokio::time::timeout(
        options.connect_timeout,
        client::connect(config, (host.hostname.as_str(), host.port), handler),
    )
    .await
    .map_err(|_| format!("timed out after {:?}", options.connect_timeout))?
    .map_err(|e| e.to_string())?;

    if authenticate(&mut session, host, options).await? {
        Ok(session)
    } else {
        Err(format!("no accepted identity for user {}", host.username))
    }
}

async fn authenticate(
    session: &mut Handle<ClientHandler>,
    host: &HostConfig,
    options: &SshOptions,
) -> Result<bool, String> {
    #[cfg(unix)]
    if options.use_agent && authenticate_with_agent(session, &host.username).await {
        return Ok(true);
    }

    for path in options.key_paths(host) {
        if !path.exists() {
            continue;
        }
        let key = match russh_keys::load_secret_key(&path, None) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("skipping key {}: {}", path.display(), e);
                continue;
            }
        };
        let accepted = session
            .authenticate_publickey(&host.username, Arc::new(key))
            .await
            .map_err(|e| format!("authentication error: {}", e))?;
        if accepted {
            tracing::debug!("authenticated {} with {}", host.username, path.display());
            return Ok(true);
        }
    }
    Ok(false)
}

/// Offer every identity held by the agent at `SSH_AUTH_SOCK`
#[cfg(unix)]
async fn authenticate_with_agent(session: &mut Handle<ClientHandler>, username: &str) -> bool {
    use russh_keys::agent::client::AgentClient;

    let mut agent = match AgentClient::connect_env().await {
        Ok(agent) => agent,
        Err(e) => {
            tracing::debug!("no ssh agent: {}", e);
            return false;
        }
    };
    let identities = match agent.request_identities().await {
        Ok(identities) => identities,
        Err(e) => {
            tracing::debug!("ssh agent identities: {}", e);
            return false;
        }
    };

    for key in identities {
        let (returned, result) = session.authenticate_future(username, key, agent).await;
        agent = returned;
        match result {
            Ok(true) => {
                tracing::debug!("authenticated {} with agent identity", username);
                return true;
            }
            Ok(false) => {}
            Err(e) => tracing::debug!("agent signing failed: {:?}", e),
        }
    }
    false
}
