//! Cache of SSH transports and their SFTP sub-channels

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use russh::client::Handle;
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use tokio::sync::OnceCell;

use super::connect::{self, ClientHandler};
use crate::config::{HostConfig, SshOptions};
use crate::error::{HostError, Result, TransportFailure};
use crate::host::CommandOutput;

/// An authenticated SSH transport, with a lazily opened SFTP session
pub struct SshConnection {
    key: String,
    handle: Handle<ClientHandler>,
    sftp: OnceCell<Arc<SftpSession>>,
    command_timeout: Duration,
}

impl SshConnection {
    /// `user@host:port` this transport was dialed for
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The SFTP session, opened on first use and shared afterwards
    pub async fn sftp(&self) -> Result<Arc<SftpSession>> {
        self.sftp
            .get_or_try_init(|| async {
                let open = async {
                    let channel = self
                        .handle
                        .channel_open_session()
                        .await
                        .map_err(|e| HostError::Ssh(format!("open sftp channel: {}", e)))?;
                    channel
                        .request_subsystem(true, "sftp")
                        .await
                        .map_err(|e| HostError::Ssh(format!("request sftp subsystem: {}", e)))?;
                    let session = SftpSession::new(channel.into_stream())
                        .await
                        .map_err(|e| HostError::Ssh(format!("start sftp session: {}", e)))?;
                    tracing::debug!("sftp session opened to {}", self.key);
                    Ok::<_, HostError>(Arc::new(session))
                };
                tokio::time::timeout(self.command_timeout, open)
                    .await
                    .map_err(|_| HostError::Timeout(self.command_timeout))?
            })
            .await
            .map(Arc::clone)
    }

    /// Run `command` through an exec channel, collecting stdout and stderr
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let run = async {
            let mut channel = self
                .handle
                .channel_open_session()
                .await
                .map_err(|e| HostError::Ssh(format!("open exec channel: {}", e)))?;
            channel
                .exec(true, command)
                .await
                .map_err(|e| HostError::Ssh(format!("exec {}: {}", command, e)))?;

            let mut result = CommandOutput::default();
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::Data { ref data } => result.output.extend_from_slice(data),
                    ChannelMsg::ExtendedData { ref data, .. } => {
                        result.output.extend_from_slice(data)
                    }
                    ChannelMsg::ExitStatus { exit_status } => {
                        result.exit_status = Some(exit_status)
                    }
                    _ => {}
                }
            }
            Ok::<_, HostError>(result)
        };

        tracing::debug!("{}: exec {}", self.key, command);
        tokio::time::timeout(self.command_timeout, run)
            .await
            .map_err(|_| HostError::Timeout(self.command_timeout))?
    }

    /// Feed `script` to an interactive shell and wait for it to exit.
    ///
    /// Background jobs started by the script keep running after the
    /// channel closes, so the wait is bounded by the command timeout and
    /// a timeout here is not an error.
    pub async fn shell(&self, script: &str) -> Result<()> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| HostError::Ssh(format!("open shell channel: {}", e)))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| HostError::Ssh(format!("request shell: {}", e)))?;
        channel
            .data(script.as_bytes())
            .await
            .map_err(|e| HostError::Ssh(format!("write to shell: {}", e)))?;
        channel
            .eof()
            .await
            .map_err(|e| HostError::Ssh(format!("close shell input: {}", e)))?;

        let drain = async {
            while let Some(msg) = channel.wait().await {
                match msg {
                    ChannelMsg::ExitStatus { exit_status } if exit_status != 0 => {
                        tracing::warn!("{}: shell exited with status {}", self.key, exit_status);
                    }
                    ChannelMsg::Close => break,
                    _ => {}
                }
            }
        };
        if tokio::time::timeout(self.command_timeout, drain).await.is_err() {
            tracing::debug!("{}: shell did not close within {:?}", self.key, self.command_timeout);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(sftp) = self.sftp.get() {
            if let Err(e) = sftp.close().await {
                tracing::debug!("{}: closing sftp: {}", self.key, e);
            }
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "closing", "en")
            .await
        {
            tracing::debug!("{}: disconnect: {}", self.key, e);
        }
    }
}

/// Pool of SSH transports keyed by `user@host:port`.
///
/// Owned by the caller's context and shared by every [`super::Remote`]
/// host; dropping the pool without [`ConnectionPool::close_all`] simply
/// drops the transports.
pub struct ConnectionPool {
    connections: DashMap<String, Arc<SshConnection>>,
    options: SshOptions,
    dials: AtomicUsize,
}

impl ConnectionPool {
    /// Create an empty pool using `options` for every dial
    pub fn new(options: SshOptions) -> Self {
        Self {
            connections: DashMap::new(),
            options,
            dials: AtomicUsize::new(0),
        }
    }

    pub fn options(&self) -> &SshOptions {
        &self.options
    }

    /// Cached transport for `key`, if any
    pub fn get(&self, key: &str) -> Option<Arc<SshConnection>> {
        self.connections.get(key).map(|r| Arc::clone(&r))
    }

    /// Dial and authenticate `host`, caching the result on success
    pub async fn dial(&self, host: &HostConfig) -> std::result::Result<Arc<SshConnection>, TransportFailure> {
        let key = host.key();
        self.dials.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("dialing {}", key);

        let handle = connect::dial(host, &self.options)
            .await
            .map_err(|message| TransportFailure {
                target: key.clone(),
                message,
            })?;

        let connection = Arc::new(SshConnection {
            key: key.clone(),
            handle,
            sftp: OnceCell::new(),
            command_timeout: self.options.command_timeout,
        });
        self.connections.insert(key.clone(), Arc::clone(&connection));
        tracing::info!("connected to {}", key);
        Ok(connection)
    }

    /// Close and evict the transport and SFTP session for `key`
    pub async fn close(&self, key: &str) {
        if let Some((_, connection)) = self.connections.remove(key) {
            connection.disconnect().await;
            tracing::debug!("closed {}", key);
        }
    }

    /// Close every cached transport
    pub async fn close_all(&self) {
        let keys: Vec<String> = self.connections.iter().map(|r| r.key().clone()).collect();
        for key in keys {
            self.close(&key).await;
        }
    }

    /// Number of dial attempts made through this pool
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Number of cached transports
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(SshOptions::default())
    }
}
